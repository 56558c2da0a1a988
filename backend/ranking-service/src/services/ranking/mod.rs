use crate::models::{ItemId, ScoreRecord};
use crate::utils::compare_scores_desc;

/// Ranked candidates with parallel id and score columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingOutput {
    pub ids: Vec<ItemId>,
    pub scores: Vec<f32>,
    pub records: Vec<ScoreRecord>,
}

impl RankingOutput {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn top(&self, k: usize) -> &[ScoreRecord] {
        &self.records[..k.min(self.records.len())]
    }
}

/// Ranking Layer - 按總分排序
/// Orders by overall score descending; equal scores fall back to id
/// ascending so identical inputs always rank identically.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankingLayer;

impl RankingLayer {
    pub fn new() -> Self {
        Self
    }

    pub fn rank(&self, mut records: Vec<ScoreRecord>) -> RankingOutput {
        // NaN scores sort after every valid score
        records.sort_by(|a, b| {
            compare_scores_desc(a.overall, b.overall).then_with(|| a.item_id.cmp(&b.item_id))
        });

        RankingOutput {
            ids: records.iter().map(|r| r.item_id.clone()).collect(),
            scores: records.iter().map(|r| r.overall).collect(),
            records,
        }
    }
}
