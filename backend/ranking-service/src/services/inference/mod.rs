/// External Model Interfaces
///
/// The visual embedding model, the scalar attribute classifiers, the color
/// histogram extractor and the wall compatibility model all live outside this
/// service. They are consumed through the traits below so the ranking code
/// only ever sees their outputs.
use async_trait::async_trait;
use thiserror::Error;

use crate::models::Attribute;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid model input: {0}")]
    InvalidInput(String),

    #[error("Image not readable: {0}")]
    Image(String),
}

pub type Result<T> = std::result::Result<T, InferenceError>;

/// Pretrained image encoder producing fixed-length vectors.
/// Deterministic per input; may be slow (remote or local inference).
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, image_ref: &str) -> Result<Vec<f32>>;
}

/// Per-attribute regressor applied to an embedding
pub trait ScalarClassifier: Send + Sync {
    fn classify(&self, embedding: &[f32], attribute: Attribute) -> Result<f32>;
}

/// Fixed-bin, L2-normalized color histogram of an image
#[async_trait]
pub trait ColorHistogramExtractor: Send + Sync {
    async fn histogram(&self, image_ref: &str) -> Result<Vec<f32>>;
}

/// Learned pairwise scorer of (scene, item) embeddings
pub trait CompatibilityModel: Send + Sync {
    fn score(&self, scene_embedding: &[f32], item_embedding: &[f32]) -> Result<f32>;
}
