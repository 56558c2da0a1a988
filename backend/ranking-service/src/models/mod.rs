mod float_repr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::utils::round_score;

/// Opaque catalog identifier. The ranker breaks score ties by this order.
///
/// All-digit ids compare by numeric value ("9" < "10") and sort before any
/// other id; everything else compares as text. Numerically equal ids such
/// as "7" and "007" fall back to text so the order stays consistent with
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Scalar attributes produced by the per-attribute classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Abstract,
    Noisy,
    Paint,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Abstract, Attribute::Noisy, Attribute::Paint];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Abstract => "abstract",
            Attribute::Noisy => "noisy",
            Attribute::Paint => "paint",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Attribute::Abstract => 0,
            Attribute::Noisy => 1,
            Attribute::Paint => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScalarAttributes {
    pub r#abstract: f32,
    pub noisy: f32,
    pub paint: f32,
}

impl ScalarAttributes {
    pub fn new(r#abstract: f32, noisy: f32, paint: f32) -> Self {
        Self {
            r#abstract,
            noisy,
            paint,
        }
    }

    pub fn get(&self, attribute: Attribute) -> f32 {
        match attribute {
            Attribute::Abstract => self.r#abstract,
            Attribute::Noisy => self.noisy,
            Attribute::Paint => self.paint,
        }
    }
}

/// Precomputed features of one catalog item. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub id: ItemId,
    /// L2-normalized visual embedding
    pub embedding: Vec<f32>,
    /// L2-normalized hue histogram
    pub color_histogram: Vec<f32>,
    pub scalar_attributes: ScalarAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Liked,
    Disliked,
}

impl Label {
    /// Numeric target convention of the prediction API: 1 = liked,
    /// 0 = disliked, anything else carries no label.
    pub fn from_target(target: i64) -> Option<Label> {
        match target {
            1 => Some(Label::Liked),
            0 => Some(Label::Disliked),
            _ => None,
        }
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" | "liked" => Ok(Label::Liked),
            "dislike" | "disliked" => Ok(Label::Disliked),
            other => Err(format!("unknown interaction label: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interaction {
    pub item_id: ItemId,
    pub label: Label,
}

impl Interaction {
    pub fn new(item_id: impl Into<ItemId>, label: Label) -> Self {
        Self {
            item_id: item_id.into(),
            label,
        }
    }

    pub fn liked(item_id: impl Into<ItemId>) -> Self {
        Self::new(item_id, Label::Liked)
    }

    pub fn disliked(item_id: impl Into<ItemId>) -> Self {
        Self::new(item_id, Label::Disliked)
    }
}

/// Caller-supplied weights of the five scoring criteria.
///
/// Not renormalized: callers control the absolute scale of the overall score.
/// Non-finite weights serialize as strings so logged sessions keep them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionWeights {
    #[serde(with = "float_repr")]
    pub embedding: f32,
    #[serde(with = "float_repr")]
    pub color: f32,
    #[serde(with = "float_repr")]
    pub r#abstract: f32,
    #[serde(with = "float_repr")]
    pub paint: f32,
    #[serde(with = "float_repr")]
    pub noisy: f32,
}

impl Default for CriterionWeights {
    fn default() -> Self {
        Self {
            embedding: 0.4,
            color: 0.4,
            r#abstract: 0.3,
            paint: 0.1,
            noisy: 0.1,
        }
    }
}

impl CriterionWeights {
    /// Ranks by embedding similarity alone
    pub fn embedding_only(weight: f32) -> Self {
        Self {
            embedding: weight,
            color: 0.0,
            r#abstract: 0.0,
            paint: 0.0,
            noisy: 0.0,
        }
    }

    pub fn with_embedding(mut self, weight: f32) -> Self {
        self.embedding = weight;
        self
    }

    pub fn attribute(&self, attribute: Attribute) -> f32 {
        match attribute {
            Attribute::Abstract => self.r#abstract,
            Attribute::Noisy => self.noisy,
            Attribute::Paint => self.paint,
        }
    }

    fn values(&self) -> [f32; 5] {
        [
            self.embedding,
            self.color,
            self.r#abstract,
            self.paint,
            self.noisy,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.values().iter().all(|w| w.is_finite())
    }

    pub fn clamped_non_negative(&self) -> Self {
        Self {
            embedding: self.embedding.max(0.0),
            color: self.color.max(0.0),
            r#abstract: self.r#abstract.max(0.0),
            paint: self.paint.max(0.0),
            noisy: self.noisy.max(0.0),
        }
    }
}

/// Per-criterion scores of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CriterionScores {
    pub embedding: f32,
    pub color: f32,
    pub r#abstract: f32,
    pub paint: f32,
    pub noisy: f32,
}

impl CriterionScores {
    pub fn attribute(&self, attribute: Attribute) -> f32 {
        match attribute {
            Attribute::Abstract => self.r#abstract,
            Attribute::Noisy => self.noisy,
            Attribute::Paint => self.paint,
        }
    }

    pub fn set_attribute(&mut self, attribute: Attribute, score: f32) {
        match attribute {
            Attribute::Abstract => self.r#abstract = score,
            Attribute::Noisy => self.noisy = score,
            Attribute::Paint => self.paint = score,
        }
    }

    pub fn weighted(&self, weights: &CriterionWeights) -> f32 {
        weights.embedding * self.embedding
            + weights.color * self.color
            + weights.r#abstract * self.r#abstract
            + weights.paint * self.paint
            + weights.noisy * self.noisy
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub item_id: ItemId,
    pub criteria: CriterionScores,
    pub overall: f32,
}

/// Candidate scored by the wall compatibility model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScoredItem {
    pub item_id: ItemId,
    pub score: f32,
    pub embedding: Vec<f32>,
}

/// Compact summary of a top-ranked candidate kept in the session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPrediction {
    pub id: ItemId,
    #[serde(with = "float_repr")]
    pub overall: f32,
    #[serde(with = "float_repr")]
    pub embedding: f32,
    #[serde(with = "float_repr")]
    pub color: f32,
    #[serde(with = "float_repr")]
    pub r#abstract: f32,
    #[serde(with = "float_repr")]
    pub paint: f32,
    #[serde(with = "float_repr")]
    pub noisy: f32,
}

impl From<&ScoreRecord> for TopPrediction {
    fn from(record: &ScoreRecord) -> Self {
        Self {
            id: record.item_id.clone(),
            overall: round_score(record.overall),
            embedding: round_score(record.criteria.embedding),
            color: round_score(record.criteria.color),
            r#abstract: round_score(record.criteria.r#abstract),
            paint: round_score(record.criteria.paint),
            noisy: round_score(record.criteria.noisy),
        }
    }
}

/// One row of the session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub session_id: String,
    pub weights: CriterionWeights,
    pub liked_ids: Vec<ItemId>,
    pub disliked_ids: Vec<ItemId>,
    pub top_predictions: Vec<TopPrediction>,
    pub feedback_liked: Vec<ItemId>,
    pub feedback_disliked: Vec<ItemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
