pub mod ffmpeg;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod probe;
