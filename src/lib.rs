pub mod dialect;
pub mod sample;
pub mod source;
