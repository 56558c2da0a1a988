// ============================================
// Wall Matching
// ============================================
//
// Scores every catalog artwork against a reference scene (a wall photo)
// with the learned compatibility model, then returns either the plain
// top-k or a cluster-diversified selection.

use crate::error::{RankingError, Result};
use crate::models::ModelScoredItem;
use crate::services::diversity::DiversityLayer;
use crate::services::features::FeatureStore;
use crate::services::inference::{CompatibilityModel, EmbeddingModel};
use crate::utils::compare_scores_desc;
use std::sync::Arc;
use tracing::{debug, info};

/// How the wall matcher picks its results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallSelection {
    TopK(usize),
    Diversified,
}

pub struct WallMatcher {
    feature_store: Arc<dyn FeatureStore>,
    embedder: Arc<dyn EmbeddingModel>,
    model: Arc<dyn CompatibilityModel>,
    diversity: DiversityLayer,
}

impl WallMatcher {
    pub fn new(
        feature_store: Arc<dyn FeatureStore>,
        embedder: Arc<dyn EmbeddingModel>,
        model: Arc<dyn CompatibilityModel>,
        diversity: DiversityLayer,
    ) -> Self {
        Self {
            feature_store,
            embedder,
            model,
            diversity,
        }
    }

    /// Score the whole catalog against a scene embedding, best first
    pub async fn score_catalog(&self, scene_embedding: &[f32]) -> Result<Vec<ModelScoredItem>> {
        let catalog = self.feature_store.fetch_complement(&[]).await?;
        if catalog.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(bundle) = catalog
            .bundles
            .iter()
            .find(|b| b.embedding.len() != scene_embedding.len())
        {
            return Err(RankingError::DimensionMismatch(format!(
                "scene embedding has {} values, item {} has {}",
                scene_embedding.len(),
                bundle.id,
                bundle.embedding.len()
            )));
        }

        let mut scored = catalog
            .bundles
            .into_iter()
            .map(|bundle| {
                let score = self.model.score(scene_embedding, &bundle.embedding)?;
                Ok(ModelScoredItem {
                    item_id: bundle.id,
                    score,
                    embedding: bundle.embedding,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        scored.sort_by(|a, b| {
            compare_scores_desc(a.score, b.score).then_with(|| a.item_id.cmp(&b.item_id))
        });

        debug!(
            candidate_count = scored.len(),
            top_score = scored.first().map(|c| c.score),
            "Catalog scored against wall"
        );

        Ok(scored)
    }

    pub async fn match_embedding(
        &self,
        scene_embedding: &[f32],
        selection: WallSelection,
    ) -> Result<Vec<ModelScoredItem>> {
        let scored = self.score_catalog(scene_embedding).await?;

        let matches = match selection {
            WallSelection::TopK(k) => scored.into_iter().take(k).collect(),
            WallSelection::Diversified => self.diversity.select(scored),
        };

        Ok(matches)
    }

    /// Embed the wall image, then match
    pub async fn match_wall(
        &self,
        wall_image_ref: &str,
        selection: WallSelection,
    ) -> Result<Vec<ModelScoredItem>> {
        let scene_embedding = self.embedder.embed(wall_image_ref).await?;
        let matches = self.match_embedding(&scene_embedding, selection).await?;

        info!(
            wall = wall_image_ref,
            selection = ?selection,
            result_count = matches.len(),
            "Wall matched"
        );

        Ok(matches)
    }
}
