//! Builds feature bundles for newly ingested artworks.
//!
//! An artwork may come with several images. Embeddings and color histograms
//! are computed per image and averaged; the scalar attributes are classified
//! from the averaged embedding.

use crate::error::{RankingError, Result};
use crate::models::{Attribute, FeatureBundle, ItemId, ScalarAttributes};
use crate::services::inference::{ColorHistogramExtractor, EmbeddingModel, ScalarClassifier};
use futures::future::try_join_all;
use ndarray::{Array2, Axis};
use std::sync::Arc;
use tracing::debug;

pub struct FeatureExtractor {
    embedder: Arc<dyn EmbeddingModel>,
    colors: Arc<dyn ColorHistogramExtractor>,
    classifier: Arc<dyn ScalarClassifier>,
}

impl FeatureExtractor {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        colors: Arc<dyn ColorHistogramExtractor>,
        classifier: Arc<dyn ScalarClassifier>,
    ) -> Self {
        Self {
            embedder,
            colors,
            classifier,
        }
    }

    pub async fn extract(&self, id: ItemId, image_refs: &[String]) -> Result<FeatureBundle> {
        if image_refs.is_empty() {
            return Err(RankingError::InvalidInput(format!(
                "artwork {} has no images",
                id
            )));
        }

        let embeddings = try_join_all(image_refs.iter().map(|r| self.embedder.embed(r))).await?;
        let histograms = try_join_all(image_refs.iter().map(|r| self.colors.histogram(r))).await?;

        let embedding = mean_rows(&embeddings, "embedding")?;
        let color_histogram = mean_rows(&histograms, "color histogram")?;

        let mut scores = [0.0f32; 3];
        for attribute in Attribute::ALL {
            scores[attribute.index()] = self.classifier.classify(&embedding, attribute)?;
        }

        debug!(
            item_id = %id,
            image_count = image_refs.len(),
            embedding_dim = embedding.len(),
            "Extracted artwork features"
        );

        Ok(FeatureBundle {
            id,
            embedding,
            color_histogram,
            scalar_attributes: ScalarAttributes::new(scores[0], scores[1], scores[2]),
        })
    }
}

/// Element-wise mean of equally sized rows
fn mean_rows(rows: &[Vec<f32>], what: &str) -> Result<Vec<f32>> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != width) {
        return Err(RankingError::DimensionMismatch(format!(
            "{} sizes differ across images of one artwork",
            what
        )));
    }

    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    let matrix = Array2::from_shape_vec((rows.len(), width), flat)
        .map_err(|e| RankingError::DimensionMismatch(e.to_string()))?;

    Ok(matrix
        .mean_axis(Axis(0))
        .map(|m| m.to_vec())
        .unwrap_or_else(|| vec![0.0; width]))
}
