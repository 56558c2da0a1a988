// ============================================
// Preference Scoring Engine
// ============================================
//
// Scores every candidate against the liked and disliked summaries.
//
// Criteria:
// - Embedding: cos(c, liked centroid) - cos(c, disliked centroid)
// - Color: same formula on the color histograms
// - Abstract / noisy / paint: distance policy selected by which sides
//   carry a signal (see ScalarPolicy)
//
// Overall = weighted sum of the five criteria, no renormalization.

use crate::error::{RankingError, Result};
use crate::models::{Attribute, CriterionScores, CriterionWeights, FeatureBundle, ScoreRecord};
use crate::services::preference::PreferenceSummary;
use crate::utils::{cosine_similarity, min_max_signed};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How scalar attribute scores are scaled before weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Raw distance differences
    #[default]
    Raw,
    /// Min-max scaled to [-1, 1] across the candidate set, putting scalar
    /// scores on the same footing as the cosine differences in [-2, 2]
    MinMax,
}

/// What to do with caller weights before scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightPolicy {
    /// Use weights as given, NaN included
    Accept,
    /// Reject NaN and infinite weights; negative weights are allowed
    #[default]
    RejectNonFinite,
    /// Reject non-finite weights and raise negative ones to zero
    ClampNonNegative,
}

impl WeightPolicy {
    pub fn apply(self, weights: CriterionWeights) -> Result<CriterionWeights> {
        match self {
            WeightPolicy::Accept => Ok(weights),
            _ if !weights.is_finite() => Err(RankingError::InvalidInput(format!(
                "criterion weights must be finite: {:?}",
                weights
            ))),
            WeightPolicy::RejectNonFinite => Ok(weights),
            WeightPolicy::ClampNonNegative => Ok(weights.clamped_non_negative()),
        }
    }
}

/// Which preference sides carry a mean for one attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarPolicy {
    BothPresent { liked: f32, disliked: f32 },
    OnlyLiked { liked: f32 },
    OnlyDisliked { disliked: f32 },
    Neither,
}

impl ScalarPolicy {
    pub fn from_means(liked: Option<f32>, disliked: Option<f32>) -> Self {
        match (liked, disliked) {
            (Some(liked), Some(disliked)) => ScalarPolicy::BothPresent { liked, disliked },
            (Some(liked), None) => ScalarPolicy::OnlyLiked { liked },
            (None, Some(disliked)) => ScalarPolicy::OnlyDisliked { disliked },
            (None, None) => ScalarPolicy::Neither,
        }
    }

    pub fn score(&self, value: f32) -> f32 {
        match *self {
            ScalarPolicy::BothPresent { liked, disliked } => {
                score_both_present(value, liked, disliked)
            }
            ScalarPolicy::OnlyLiked { liked } => score_only_liked(value, liked),
            ScalarPolicy::OnlyDisliked { disliked } => score_only_disliked(value, disliked),
            ScalarPolicy::Neither => score_neither(value),
        }
    }
}

/// Closer to liked and farther from disliked is better
pub fn score_both_present(value: f32, liked: f32, disliked: f32) -> f32 {
    (value - disliked).abs() - (value - liked).abs()
}

pub fn score_only_liked(value: f32, liked: f32) -> f32 {
    -(value - liked).abs()
}

pub fn score_only_disliked(value: f32, disliked: f32) -> f32 {
    (value - disliked).abs()
}

pub fn score_neither(_value: f32) -> f32 {
    0.0
}

/// Stateless scorer; one instance per request configuration
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    weights: CriterionWeights,
    normalization: NormalizationMode,
}

impl ScoringEngine {
    pub fn new(weights: CriterionWeights, normalization: NormalizationMode) -> Self {
        Self {
            weights,
            normalization,
        }
    }

    pub fn weights(&self) -> &CriterionWeights {
        &self.weights
    }

    /// Score candidates in input order.
    ///
    /// Zero candidates yield an empty result. A candidate whose dimensions do
    /// not match the summaries aborts the whole scoring pass.
    pub fn score(
        &self,
        candidates: &[FeatureBundle],
        liked: &PreferenceSummary,
        disliked: &PreferenceSummary,
    ) -> Result<Vec<ScoreRecord>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let liked_embedding = liked.embedding_centroid.as_slice_memory_order();
        let disliked_embedding = disliked.embedding_centroid.as_slice_memory_order();
        let liked_color = liked.color_centroid.as_slice_memory_order();
        let disliked_color = disliked.color_centroid.as_slice_memory_order();
        let (
            Some(liked_embedding),
            Some(disliked_embedding),
            Some(liked_color),
            Some(disliked_color),
        ) = (liked_embedding, disliked_embedding, liked_color, disliked_color)
        else {
            return Err(RankingError::InvalidInput(
                "preference centroids are not contiguous".to_string(),
            ));
        };

        let policies = Attribute::ALL.map(|attribute| {
            (
                attribute,
                ScalarPolicy::from_means(
                    liked.scalar_means.get(attribute),
                    disliked.scalar_means.get(attribute),
                ),
            )
        });

        let mut criteria = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            check_dims(candidate, liked_embedding.len(), liked_color.len())?;

            let mut scores = CriterionScores {
                embedding: cosine_similarity(&candidate.embedding, liked_embedding)
                    - cosine_similarity(&candidate.embedding, disliked_embedding),
                color: cosine_similarity(&candidate.color_histogram, liked_color)
                    - cosine_similarity(&candidate.color_histogram, disliked_color),
                ..Default::default()
            };
            for (attribute, policy) in &policies {
                let value = candidate.scalar_attributes.get(*attribute);
                scores.set_attribute(*attribute, policy.score(value));
            }
            criteria.push(scores);
        }

        if self.normalization == NormalizationMode::MinMax {
            for attribute in Attribute::ALL {
                let mut column: Vec<f32> = criteria.iter().map(|s| s.attribute(attribute)).collect();
                min_max_signed(&mut column);
                for (scores, value) in criteria.iter_mut().zip(column) {
                    scores.set_attribute(attribute, value);
                }
            }
        }

        let records: Vec<ScoreRecord> = candidates
            .iter()
            .zip(criteria)
            .map(|(candidate, criteria)| ScoreRecord {
                item_id: candidate.id.clone(),
                overall: criteria.weighted(&self.weights),
                criteria,
            })
            .collect();

        debug!(
            candidate_count = records.len(),
            liked_count = liked.item_count,
            disliked_count = disliked.item_count,
            normalization = ?self.normalization,
            "Candidates scored"
        );

        Ok(records)
    }
}

fn check_dims(candidate: &FeatureBundle, embedding_dim: usize, color_dim: usize) -> Result<()> {
    if candidate.embedding.len() != embedding_dim || candidate.color_histogram.len() != color_dim {
        return Err(RankingError::DimensionMismatch(format!(
            "candidate {} has dimensions ({}, {}), expected ({}, {})",
            candidate.id,
            candidate.embedding.len(),
            candidate.color_histogram.len(),
            embedding_dim,
            color_dim
        )));
    }
    Ok(())
}
