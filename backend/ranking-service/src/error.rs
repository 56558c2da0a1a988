use thiserror::Error;

use crate::services::features::FeatureStoreError;
use crate::services::inference::InferenceError;
use crate::services::session_log::SessionLogError;

pub type Result<T> = std::result::Result<T, RankingError>;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Feature store error: {0}")]
    FeatureStore(#[from] FeatureStoreError),

    #[error("Session log error: {0}")]
    SessionLog(#[from] SessionLogError),

    #[error("Model inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Artwork already exists: {0}")]
    AlreadyExists(String),

    #[error("Wall matching is not configured")]
    WallMatchingDisabled,

    #[error("Artwork ingestion is not configured")]
    IngestionDisabled,
}

impl RankingError {
    /// Store outages are worth retrying; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RankingError::FeatureStore(e) => e.is_retryable(),
            RankingError::SessionLog(e) => e.is_retryable(),
            RankingError::Inference(InferenceError::Unavailable(_)) => true,
            _ => false,
        }
    }
}
