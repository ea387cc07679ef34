//! Error types for the mock server.
//!
//! Every failure a management or dispatch request can hit maps onto one
//! variant of [`MockError`], and each variant onto one HTTP status.

use axum::http::StatusCode;
use thiserror::Error;

/// Message shown to clients in place of any storage failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Something went horribly wrong :(";

/// Errors raised by the registry and the dispatcher.
#[derive(Debug, Error)]
pub enum MockError {
    /// Malformed or out-of-range input, including undecodable request bodies.
    #[error("{0}")]
    Validation(String),

    /// An endpoint with the same verb and path is already registered.
    #[error("Endpoint {verb} {path} already exists")]
    Conflict { verb: String, path: String },

    /// Unknown endpoint id, unknown mock path.
    #[error("{0}")]
    NotFound(String),

    /// The storage engine failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations could not be applied.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored headers column could not be encoded or decoded.
    #[error("headers serialization error: {0}")]
    Headers(#[from] serde_json::Error),
}

impl MockError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            MockError::Validation(_) => StatusCode::BAD_REQUEST,
            MockError::Conflict { .. } => StatusCode::CONFLICT,
            MockError::NotFound(_) => StatusCode::NOT_FOUND,
            MockError::Database(_) | MockError::Migration(_) | MockError::Headers(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this is a storage failure whose details must stay server-side.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Message safe to hand to a client.
    pub fn external_message(&self) -> String {
        if self.is_internal() {
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MockError>;
