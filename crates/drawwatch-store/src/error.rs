use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("stored row is unreadable: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Other(String),
}
