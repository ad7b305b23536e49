//! PBX integration errors

use thiserror::Error;
use yeastar_core::AppError;

/// Errors raised while talking to the Yeastar OpenAPI
#[derive(Debug, Error)]
pub enum PbxError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error: status {0}")]
    HttpError(u16),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Timeout: request took longer than {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<PbxError> for AppError {
    fn from(err: PbxError) -> Self {
        match err {
            PbxError::Auth(msg) => AppError::PbxAuth(msg),
            PbxError::Config(msg) => AppError::Config(msg),
            other => AppError::Pbx(other.to_string()),
        }
    }
}
