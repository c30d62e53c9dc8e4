//! Error types for the sensor store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}

pub type Result<T> = std::result::Result<T, Error>;
