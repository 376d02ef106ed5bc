//! Common error types for courier.

use thiserror::Error;

/// Common error type for courier operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid env-type {0}. See help for the list of valid types.")]
    InvalidEnvType(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
