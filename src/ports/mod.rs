//! Trait definitions decoupling the pipeline from its infrastructure.

pub mod media;
pub mod repository;
