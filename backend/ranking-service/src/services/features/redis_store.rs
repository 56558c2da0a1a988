// ============================================
// Redis Feature Store
// ============================================
//
// Redis keys:
// - {prefix}:features:{item_id} - JSON feature bundle
// - {prefix}:ids - Set of catalog item ids
// - {prefix}:dimensions - "{embedding_dim}x{color_bins}" of the catalog
//
// Complement queries return candidates ordered by id so that rankings are
// reproducible across calls.

use super::{CandidateSet, FeatureStore, FeatureStoreError, Result};
use crate::models::{FeatureBundle, ItemId};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Maximum keys per MGET round trip
const DEFAULT_BATCH_SIZE: usize = 500;

// KEYS[1] dimensions, KEYS[2] bundle, KEYS[3] id set
// ARGV[1] dimensions, ARGV[2] bundle json, ARGV[3] item id
// Returns {status, catalog dimensions}: 1 stored, 0 already present, -1 mismatch
const INSERT_SCRIPT: &str = r#"
local stored = redis.call('GET', KEYS[1])
if stored and stored ~= ARGV[1] then
    return {-1, stored}
end
if redis.call('EXISTS', KEYS[2]) == 1 then
    return {0, stored or ARGV[1]}
end
if not stored then
    redis.call('SET', KEYS[1], ARGV[1])
end
redis.call('SET', KEYS[2], ARGV[2])
redis.call('SADD', KEYS[3], ARGV[3])
return {1, ARGV[1]}
"#;

pub struct RedisFeatureStore {
    redis: redis::Client,
    key_prefix: String,
    batch_size: usize,
}

impl RedisFeatureStore {
    pub fn new(redis: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn feature_key(&self, id: &ItemId) -> String {
        format!("{}:features:{}", self.key_prefix, id)
    }

    fn ids_key(&self) -> String {
        format!("{}:ids", self.key_prefix)
    }

    fn dimensions_key(&self) -> String {
        format!("{}:dimensions", self.key_prefix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| FeatureStoreError::Unavailable(e.to_string()))
    }

    /// MGET bundles in batches; missing keys are skipped
    async fn load_bundles(&self, ids: &[ItemId]) -> Result<Vec<FeatureBundle>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        let mut bundles = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(self.batch_size) {
            let keys: Vec<String> = chunk.iter().map(|id| self.feature_key(id)).collect();
            let values: Vec<Option<String>> =
                redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

            for (id, value) in chunk.iter().zip(values) {
                match value {
                    Some(json) => bundles.push(serde_json::from_str(&json)?),
                    None => debug!(item_id = %id, "Feature bundle not found in Redis"),
                }
            }
        }

        Ok(bundles)
    }
}

fn format_dimensions(dims: (usize, usize)) -> String {
    format!("{}x{}", dims.0, dims.1)
}

fn parse_dimensions(raw: &str) -> Option<(usize, usize)> {
    let (embedding, color) = raw.split_once('x')?;
    Some((embedding.parse().ok()?, color.parse().ok()?))
}

#[async_trait]
impl FeatureStore for RedisFeatureStore {
    async fn fetch(&self, ids: &[ItemId]) -> Result<Vec<FeatureBundle>> {
        let mut seen = HashSet::new();
        let unique: Vec<ItemId> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();
        self.load_bundles(&unique).await
    }

    async fn fetch_complement(&self, ids: &[ItemId]) -> Result<CandidateSet> {
        let excluded: HashSet<&ItemId> = ids.iter().collect();
        let candidates: Vec<ItemId> = self
            .all_ids()
            .await?
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect();

        let bundles = self.load_bundles(&candidates).await?;
        if bundles.len() < candidates.len() {
            warn!(
                listed = candidates.len(),
                loaded = bundles.len(),
                "Catalog id set references missing feature bundles"
            );
        }

        Ok(CandidateSet::new(bundles))
    }

    async fn all_ids(&self) -> Result<Vec<ItemId>> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn.smembers(self.ids_key()).await?;

        let mut ids: Vec<ItemId> = raw.into_iter().map(ItemId::from).collect();
        ids.sort();
        Ok(ids)
    }

    async fn insert(&self, bundle: FeatureBundle) -> Result<bool> {
        let mut conn = self.connection().await?;
        let dims = (bundle.embedding.len(), bundle.color_histogram.len());

        let json = serde_json::to_string(&bundle)?;
        let reply: (i64, String) = redis::Script::new(INSERT_SCRIPT)
            .key(self.dimensions_key())
            .key(self.feature_key(&bundle.id))
            .key(self.ids_key())
            .arg(format_dimensions(dims))
            .arg(json)
            .arg(bundle.id.as_str())
            .invoke_async(&mut conn)
            .await?;

        let created = insert_outcome(&bundle.id, dims, reply)?;
        if created {
            debug!(item_id = %bundle.id, "Feature bundle stored in Redis");
        }
        Ok(created)
    }
}

/// Interpret the insert script reply; the catalog dimensions are fixed by
/// whichever bundle wins the first write.
fn insert_outcome(id: &ItemId, dims: (usize, usize), reply: (i64, String)) -> Result<bool> {
    match reply {
        (1, _) => Ok(true),
        (0, _) => Ok(false),
        (_, stored) => {
            let expected = parse_dimensions(&stored)
                .map(|d| format!("{:?}", d))
                .unwrap_or(stored);
            Err(FeatureStoreError::InvalidBundle(format!(
                "bundle {} has dimensions {:?}, catalog uses {}",
                id, dims, expected
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RedisFeatureStore {
        let client = redis::Client::open("redis://localhost:6379").unwrap();
        RedisFeatureStore::new(client, "artwork")
    }

    #[test]
    fn test_key_layout() {
        let store = store();
        assert_eq!(store.feature_key(&ItemId::from(42u64)), "artwork:features:42");
        assert_eq!(store.ids_key(), "artwork:ids");
        assert_eq!(store.dimensions_key(), "artwork:dimensions");
    }

    #[test]
    fn test_dimensions_round_trip() {
        assert_eq!(parse_dimensions(&format_dimensions((768, 30))), Some((768, 30)));
        assert_eq!(parse_dimensions("garbage"), None);
    }

    #[test]
    fn test_insert_outcome() {
        let id = ItemId::from(3u64);
        assert!(insert_outcome(&id, (4, 2), (1, "4x2".to_string())).unwrap());
        assert!(!insert_outcome(&id, (4, 2), (0, "4x2".to_string())).unwrap());

        let err = insert_outcome(&id, (3, 2), (-1, "4x2".to_string())).unwrap_err();
        assert!(matches!(err, FeatureStoreError::InvalidBundle(_)));
        assert!(err.to_string().contains("(4, 2)"));
    }

    #[test]
    fn test_insert_script_checks_dimensions_before_writing() {
        let mismatch = INSERT_SCRIPT.find("return {-1").unwrap();
        let first_write = INSERT_SCRIPT.find("redis.call('SET'").unwrap();
        assert!(mismatch < first_write);
    }

    #[test]
    fn test_batch_size_floor() {
        assert_eq!(store().with_batch_size(0).batch_size, 1);
    }
}
