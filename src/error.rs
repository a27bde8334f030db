use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A required field was missing or malformed at encode time.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("unsupported event kind {0}")]
    UnsupportedKind(u32),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("signature check failed: {0}")]
    Signature(String),

    #[error("relay error: {0}")]
    Relay(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to marshal json data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn missing(field: &'static str) -> Self {
        Error::Validation {
            field,
            reason: "required field is missing".into(),
        }
    }
}

pub type Result<A> = std::result::Result<A, Error>;
