// ============================================
// Feature Store Adapter
// ============================================
// Serves precomputed artwork feature bundles to the ranking pipeline
// from an in-process catalog or Redis.
//
// Unknown ids are silently dropped: callers may hold stale identifiers.
// A store failure is fatal to the request and surfaced as retryable.

pub mod extractor;
pub mod redis_store;

pub use extractor::FeatureExtractor;
pub use redis_store::RedisFeatureStore;

use crate::models::{FeatureBundle, ItemId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FeatureStoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid feature bundle: {0}")]
    InvalidBundle(String),
}

impl FeatureStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeatureStoreError::Unavailable(_) | FeatureStoreError::Redis(_)
        )
    }
}

impl From<redis::RedisError> for FeatureStoreError {
    fn from(err: redis::RedisError) -> Self {
        FeatureStoreError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for FeatureStoreError {
    fn from(err: serde_json::Error) -> Self {
        FeatureStoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeatureStoreError>;

/// Candidate bundles with their ids in matching order.
///
/// The position of an item in `ids` is the index the ranker refers to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    pub ids: Vec<ItemId>,
    pub bundles: Vec<FeatureBundle>,
}

impl CandidateSet {
    pub fn new(bundles: Vec<FeatureBundle>) -> Self {
        let ids = bundles.iter().map(|b| b.id.clone()).collect();
        Self { ids, bundles }
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// (embedding dim, color bins) of the first bundle
    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.bundles
            .first()
            .map(|b| (b.embedding.len(), b.color_histogram.len()))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Bundles for the ids that exist. Order is not guaranteed.
    async fn fetch(&self, ids: &[ItemId]) -> Result<Vec<FeatureBundle>>;

    /// Every catalog bundle whose id is not in `ids`
    async fn fetch_complement(&self, ids: &[ItemId]) -> Result<CandidateSet>;

    async fn all_ids(&self) -> Result<Vec<ItemId>>;

    /// Add a new bundle. Returns false if the id is already present.
    async fn insert(&self, bundle: FeatureBundle) -> Result<bool>;
}

#[derive(Default)]
struct Catalog {
    order: Vec<ItemId>,
    bundles: HashMap<ItemId, FeatureBundle>,
    dimensions: Option<(usize, usize)>,
}

impl Catalog {
    fn insert(&mut self, bundle: FeatureBundle) -> Result<bool> {
        if self.bundles.contains_key(&bundle.id) {
            return Ok(false);
        }

        let dims = (bundle.embedding.len(), bundle.color_histogram.len());
        match self.dimensions {
            Some(expected) if expected != dims => {
                return Err(FeatureStoreError::InvalidBundle(format!(
                    "bundle {} has dimensions {:?}, catalog uses {:?}",
                    bundle.id, dims, expected
                )));
            }
            None => self.dimensions = Some(dims),
            _ => {}
        }

        self.order.push(bundle.id.clone());
        self.bundles.insert(bundle.id.clone(), bundle);
        Ok(true)
    }
}

/// In-process catalog. Complement queries return items in ingestion order.
#[derive(Default)]
pub struct InMemoryFeatureStore {
    catalog: RwLock<Catalog>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from bundles; duplicates after the first are ignored
    pub fn with_bundles(bundles: impl IntoIterator<Item = FeatureBundle>) -> Result<Self> {
        let mut catalog = Catalog::default();
        for bundle in bundles {
            catalog.insert(bundle)?;
        }

        info!(item_count = catalog.order.len(), "In-memory feature catalog loaded");

        Ok(Self {
            catalog: RwLock::new(catalog),
        })
    }

    pub async fn len(&self) -> usize {
        self.catalog.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn fetch(&self, ids: &[ItemId]) -> Result<Vec<FeatureBundle>> {
        let catalog = self.catalog.read().await;
        let mut seen = HashSet::new();

        let bundles: Vec<FeatureBundle> = ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| catalog.bundles.get(id).cloned())
            .collect();

        if bundles.len() < seen.len() {
            debug!(
                requested = seen.len(),
                found = bundles.len(),
                "Dropped ids without stored features"
            );
        }

        Ok(bundles)
    }

    async fn fetch_complement(&self, ids: &[ItemId]) -> Result<CandidateSet> {
        let excluded: HashSet<&ItemId> = ids.iter().collect();
        let catalog = self.catalog.read().await;

        let bundles = catalog
            .order
            .iter()
            .filter(|id| !excluded.contains(id))
            .filter_map(|id| catalog.bundles.get(id).cloned())
            .collect();

        Ok(CandidateSet::new(bundles))
    }

    async fn all_ids(&self) -> Result<Vec<ItemId>> {
        Ok(self.catalog.read().await.order.clone())
    }

    async fn insert(&self, bundle: FeatureBundle) -> Result<bool> {
        self.catalog.write().await.insert(bundle)
    }
}
