//! Common utilities and types shared across courier crates.

pub mod env_type;
pub mod error;
pub mod hash;
pub mod timestamp;

pub use env_type::EnvType;
pub use error::Error;
pub use timestamp::Timestamp;
