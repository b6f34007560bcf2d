//! Error types for moksha-karma

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KarmaError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Positive claim denied: life {life_id} has net karma {net}")]
    PositiveClaimDenied { life_id: String, net: i64 },

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KarmaError {
    /// Whether the error comes from the record store (retry on next tick)
    pub fn is_store_error(&self) -> bool {
        matches!(self, KarmaError::Database(_) | KarmaError::Pool(_))
    }
}
