/// Preference Aggregation
///
/// Reduces the liked or disliked bundle set of one request to a summary:
/// centroid embedding, centroid color histogram and per-attribute means.
///
/// An empty set produces zero centroids of the catalog's dimensionality and
/// *absent* attribute means. Absent is not 0.0: 0.0 is a legal attribute
/// value, while absent tells the scorer there is no signal on that side.
use crate::error::{RankingError, Result};
use crate::models::{Attribute, FeatureBundle};
use ndarray::{Array1, Array2, Axis};

/// Per-attribute means; `None` when the set was empty
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScalarMeans([Option<f32>; 3]);

impl ScalarMeans {
    pub fn get(&self, attribute: Attribute) -> Option<f32> {
        self.0[attribute.index()]
    }

    pub fn is_absent(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceSummary {
    pub embedding_centroid: Array1<f32>,
    pub color_centroid: Array1<f32>,
    pub scalar_means: ScalarMeans,
    pub item_count: usize,
}

impl PreferenceSummary {
    pub fn empty(embedding_dim: usize, color_dim: usize) -> Self {
        Self {
            embedding_centroid: Array1::zeros(embedding_dim),
            color_centroid: Array1::zeros(color_dim),
            scalar_means: ScalarMeans::default(),
            item_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }
}

/// Summarizes bundle sets for one catalog dimensionality
#[derive(Debug, Clone, Copy)]
pub struct PreferenceAggregator {
    embedding_dim: usize,
    color_dim: usize,
}

impl PreferenceAggregator {
    pub fn new(embedding_dim: usize, color_dim: usize) -> Self {
        Self {
            embedding_dim,
            color_dim,
        }
    }

    pub fn summarize(&self, bundles: &[FeatureBundle]) -> Result<PreferenceSummary> {
        if bundles.is_empty() {
            return Ok(PreferenceSummary::empty(self.embedding_dim, self.color_dim));
        }

        let embeddings = stack(bundles, self.embedding_dim, "embedding", |b| &b.embedding)?;
        let colors = stack(bundles, self.color_dim, "color histogram", |b| {
            &b.color_histogram
        })?;

        let mut means = [None; 3];
        let count = bundles.len() as f32;
        for attribute in Attribute::ALL {
            let sum: f32 = bundles
                .iter()
                .map(|b| b.scalar_attributes.get(attribute))
                .sum();
            means[attribute.index()] = Some(sum / count);
        }

        Ok(PreferenceSummary {
            embedding_centroid: centroid(&embeddings, self.embedding_dim),
            color_centroid: centroid(&colors, self.color_dim),
            scalar_means: ScalarMeans(means),
            item_count: bundles.len(),
        })
    }
}

fn stack<F>(bundles: &[FeatureBundle], dim: usize, what: &str, column: F) -> Result<Array2<f32>>
where
    F: Fn(&FeatureBundle) -> &Vec<f32>,
{
    if let Some(bad) = bundles.iter().find(|b| column(b).len() != dim) {
        return Err(RankingError::DimensionMismatch(format!(
            "{} of {} has {} values, expected {}",
            what,
            bad.id,
            column(bad).len(),
            dim
        )));
    }

    let flat: Vec<f32> = bundles.iter().flat_map(|b| column(b).iter().copied()).collect();
    Array2::from_shape_vec((bundles.len(), dim), flat)
        .map_err(|e| RankingError::DimensionMismatch(e.to_string()))
}

fn centroid(rows: &Array2<f32>, dim: usize) -> Array1<f32> {
    rows.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(dim))
}
