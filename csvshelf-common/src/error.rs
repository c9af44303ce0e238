//! Error type shared by the csvshelf crates
//!
//! Raised by config loading, database bootstrap and timestamp conversion.

use thiserror::Error;

/// Common result type for csvshelf operations
pub type Result<T> = std::result::Result<T, Error>;

/// csvshelf-common error
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unparsable config file or root folder that cannot be created
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored value could not be converted (e.g. a malformed timestamp)
    #[error("Internal error: {0}")]
    Internal(String),
}
