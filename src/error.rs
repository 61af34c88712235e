//! Error type shared by the stores, the intake threads and the command line operations.
use std::io;

use thiserror::Error;

use crate::access::Capability;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading files or writing exports.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration file could not be deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Any failure reported by the database server or the connection.
    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),

    /// The TLS connector for the database connection could not be built.
    #[error("TLS error: {0}")]
    Tls(#[from] openssl::error::ErrorStack),

    /// A submission or argument failed validation.
    #[error("Validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    /// The acting user lacks the capability for the operation.
    #[error("Not authorized: missing capability '{0}'")]
    Forbidden(Capability),

    #[error("{resource} with id '{id}' not found")]
    NotFound { resource: String, id: String },

    /// The actor could not be resolved to a user profile.
    #[error("Unknown actor: {0}")]
    UnknownActor(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn validation(field: &str, message: &str) -> Self {
        Error::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        Error::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}
