#![warn(clippy::unwrap_used)]

pub use error::Error;
pub type Result<T = ()> = std::result::Result<T, Error>;

mod error;
pub mod fs;
pub mod progressinfo;
