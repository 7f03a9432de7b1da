//! Pure business logic: naming, playlist repair, record types.

pub mod layout;
pub mod manifest;
pub mod video;
