//! Error types for the hosted chat store.

use conversation_sync_core::StoreError;
use thiserror::Error;

/// Errors from REST calls against the hosted backend.
#[derive(Debug, Error)]
pub enum SupabaseStoreError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend returned a non-success HTTP status.
    #[error("Supabase error: {status} - {message}")]
    Supabase {
        /// The HTTP status code returned by the backend.
        status: u16,
        /// The response body, typically containing error details.
        message: String,
    },

    /// Response body did not match the expected rows.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid project URL or missing credentials.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Insert returned no row.
    #[error("backend returned no row for {0}")]
    EmptyResponse(&'static str),
}

impl From<url::ParseError> for SupabaseStoreError {
    fn from(err: url::ParseError) -> Self {
        SupabaseStoreError::Config(format!("invalid URL: {err}"))
    }
}

impl From<SupabaseStoreError> for StoreError {
    fn from(err: SupabaseStoreError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Result alias for hosted store operations.
pub type SupabaseResult<T> = Result<T, SupabaseStoreError>;
