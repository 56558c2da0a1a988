pub mod clustering;

pub use clustering::{AffinityKMeans, Clusterer};

use crate::models::ModelScoredItem;
use crate::utils::compare_scores_desc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DiversityConfig {
    /// Top candidates considered for clustering
    pub candidate_pool: usize,
    pub max_clusters: usize,
    /// Members kept per cluster
    pub per_cluster: usize,
    /// Result size after backfilling
    pub target_size: usize,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            candidate_pool: 30,
            max_clusters: 5,
            per_cluster: 2,
            target_size: 10,
        }
    }
}

/// Diversity Layer - 多樣性重排
/// Cluster-then-cap selection: at most `per_cluster` items survive from each
/// cluster of the top candidates; remaining slots are backfilled by score.
pub struct DiversityLayer {
    config: DiversityConfig,
    clusterer: Arc<dyn Clusterer>,
}

impl DiversityLayer {
    pub fn new(config: DiversityConfig) -> Self {
        Self::with_clusterer(config, Arc::new(AffinityKMeans::default()))
    }

    pub fn with_clusterer(config: DiversityConfig, clusterer: Arc<dyn Clusterer>) -> Self {
        Self { config, clusterer }
    }

    pub fn config(&self) -> &DiversityConfig {
        &self.config
    }

    /// Select a diverse subset ordered by model score descending.
    ///
    /// Output holds at most `target_size` unique items, all drawn from the
    /// top `candidate_pool` once duplicates are removed.
    pub fn select(&self, candidates: Vec<ModelScoredItem>) -> Vec<ModelScoredItem> {
        let mut sorted = dedup_by_id(candidates);
        sorted.sort_by(|a, b| {
            compare_scores_desc(a.score, b.score).then_with(|| a.item_id.cmp(&b.item_id))
        });
        if sorted.is_empty() {
            return Vec::new();
        }

        let pool_len = sorted.len().min(self.config.candidate_pool);
        let pool = &sorted[..pool_len];
        let k = self.config.max_clusters.min(pool_len);

        let vectors: Vec<Vec<f32>> = pool.iter().map(|c| c.embedding.clone()).collect();
        let labels = self.clusterer.cluster(&vectors, k);

        // Pool is score-ordered, so the first members seen per cluster are its best
        let mut per_cluster: HashMap<usize, usize> = HashMap::new();
        let mut selected: Vec<usize> = Vec::new();
        for (idx, label) in labels.iter().enumerate().take(pool_len) {
            let taken = per_cluster.entry(*label).or_insert(0);
            if *taken < self.config.per_cluster {
                *taken += 1;
                selected.push(idx);
            }
        }

        let cluster_selected = selected.len();
        selected.truncate(self.config.target_size);

        let chosen: HashSet<usize> = selected.iter().copied().collect();
        let backfill: Vec<usize> = (0..sorted.len())
            .filter(|i| !chosen.contains(i))
            .take(self.config.target_size.saturating_sub(selected.len()))
            .collect();
        selected.extend(backfill);
        selected.sort_unstable();

        debug!(
            pool_size = pool_len,
            clusters = k,
            cluster_selected = cluster_selected,
            final_count = selected.len(),
            "Diversified selection complete"
        );

        // Indices into the score-sorted list, so ascending index = descending score
        let selected: HashSet<usize> = selected.into_iter().collect();
        sorted
            .into_iter()
            .enumerate()
            .filter(|(i, _)| selected.contains(i))
            .map(|(_, c)| c)
            .collect()
    }
}

/// Keep the highest-scored entry per item id
fn dedup_by_id(candidates: Vec<ModelScoredItem>) -> Vec<ModelScoredItem> {
    let mut best: HashMap<_, ModelScoredItem> = HashMap::new();
    for candidate in candidates {
        match best.get(&candidate.item_id) {
            Some(existing) if compare_scores_desc(existing.score, candidate.score).is_le() => {}
            _ => {
                best.insert(candidate.item_id.clone(), candidate);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemId;

    fn item(id: u64, score: f32, embedding: Vec<f32>) -> ModelScoredItem {
        ModelScoredItem {
            item_id: ItemId::from(id),
            score,
            embedding,
        }
    }

    /// Four tight visual styles, 10 items each, style 0 scored highest
    fn styled_catalog() -> Vec<ModelScoredItem> {
        let styles = [
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
        ];
        let mut items = Vec::new();
        for (s, base) in styles.iter().enumerate() {
            for i in 0..10u64 {
                let mut embedding = base.clone();
                embedding[(s + 1) % 4] += 0.01 * i as f32;
                let id = s as u64 * 100 + i;
                let score = 1.0 - s as f32 * 0.1 - i as f32 * 0.001;
                items.push(item(id, score, embedding));
            }
        }
        items
    }

    #[test]
    fn test_select_caps_per_cluster() {
        let layer = DiversityLayer::new(DiversityConfig::default());
        let catalog = styled_catalog();

        let selected = layer.select(catalog.clone());

        assert_eq!(selected.len(), 10);

        // Every returned id is unique and drawn from the top 30
        let mut sorted = catalog;
        sorted.sort_by(|a, b| compare_scores_desc(a.score, b.score));
        let top30: HashSet<ItemId> = sorted.iter().take(30).map(|c| c.item_id.clone()).collect();
        let ids: HashSet<ItemId> = selected.iter().map(|c| c.item_id.clone()).collect();
        assert_eq!(ids.len(), selected.len());
        assert!(ids.is_subset(&top30));

        // Output is ordered by score
        for pair in selected.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        // Style 0 dominates pure top-10 but is capped by clustering
        let style0 = selected.iter().filter(|c| c.item_id.as_str().len() == 1).count();
        assert!(style0 < 10);
    }

    #[test]
    fn test_fewer_candidates_than_target() {
        let layer = DiversityLayer::new(DiversityConfig::default());
        let candidates = vec![
            item(1, 0.9, vec![1.0, 0.0]),
            item(2, 0.8, vec![0.0, 1.0]),
            item(3, 0.7, vec![1.0, 0.1]),
        ];

        let selected = layer.select(candidates);

        let ids: Vec<_> = selected.iter().map(|c| c.item_id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_backfill_when_clusters_are_few() {
        struct OneCluster;
        impl Clusterer for OneCluster {
            fn cluster(&self, vectors: &[Vec<f32>], _k: usize) -> Vec<usize> {
                vec![0; vectors.len()]
            }
        }

        let layer = DiversityLayer::with_clusterer(DiversityConfig::default(), Arc::new(OneCluster));
        let candidates: Vec<_> = (0..20u64)
            .map(|i| item(i, 1.0 - i as f32 * 0.01, vec![1.0, 0.0]))
            .collect();

        let selected = layer.select(candidates);

        // 2 from the single cluster, then backfilled by score
        let ids: Vec<u64> = selected
            .iter()
            .map(|c| c.item_id.as_str().parse().unwrap())
            .collect();
        assert_eq!(ids, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn test_duplicate_ids_are_collapsed() {
        let layer = DiversityLayer::new(DiversityConfig::default());
        let candidates = vec![
            item(1, 0.2, vec![1.0, 0.0]),
            item(1, 0.9, vec![1.0, 0.0]),
            item(2, 0.5, vec![0.0, 1.0]),
        ];

        let selected = layer.select(candidates);

        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].item_id, ItemId::from(1u64));
        assert_eq!(selected[0].score, 0.9);
    }

    #[test]
    fn test_mixed_embedding_lengths_do_not_panic() {
        let layer = DiversityLayer::new(DiversityConfig::default());
        let mut candidates: Vec<_> = (0..11u64)
            .map(|i| item(i, 1.0 - i as f32 * 0.01, vec![1.0, i as f32 * 0.1]))
            .collect();
        candidates.push(item(99, 0.5, vec![0.0, 0.0, 1.0]));

        let selected = layer.select(candidates);

        assert_eq!(selected.len(), 10);
        let ids: HashSet<ItemId> = selected.iter().map(|c| c.item_id.clone()).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn test_empty() {
        assert!(DiversityLayer::new(DiversityConfig::default())
            .select(Vec::new())
            .is_empty());
    }
}
