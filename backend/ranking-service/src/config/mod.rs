//! Service configuration.
//!
//! Loading order: built-in defaults, then `.env` (local development), then
//! environment variables prefixed with `ARTWORK_`. Nested keys use a double
//! underscore, e.g. `ARTWORK_RANKING__TOP_K=20` or
//! `ARTWORK_REDIS__KEY_PREFIX=gallery`.

use crate::models::CriterionWeights;
use crate::services::diversity::{AffinityKMeans, DiversityConfig, DiversityLayer};
use crate::services::scoring::{NormalizationMode, WeightPolicy};
use anyhow::{ensure, Context, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};
use serde::Deserialize;
use std::sync::Arc;

const ENV_PREFIX: &str = "ARTWORK";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub ranking: RankingConfig,
    pub diversity: DiversitySettings,
    pub walls: WallConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
    /// Session hash expiry; 0 keeps sessions forever
    pub session_ttl_seconds: i64,
    /// Keys per MGET when loading feature bundles
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    /// Ids returned by `rank` and predictions kept in the session log
    pub top_k: usize,
    pub default_weights: CriterionWeights,
    pub normalization: NormalizationMode,
    pub weight_policy: WeightPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiversitySettings {
    pub candidate_pool: usize,
    pub max_clusters: usize,
    pub per_cluster: usize,
    pub target_size: usize,
    /// Neighbours blended in by the affinity smoothing step
    pub neighbors: usize,
    pub max_iterations: usize,
}

impl DiversitySettings {
    pub fn selection(&self) -> DiversityConfig {
        DiversityConfig {
            candidate_pool: self.candidate_pool,
            max_clusters: self.max_clusters,
            per_cluster: self.per_cluster,
            target_size: self.target_size,
        }
    }

    /// Selector with the configured affinity clusterer
    pub fn layer(&self) -> DiversityLayer {
        let clusterer = AffinityKMeans::new(self.neighbors, self.max_iterations);
        DiversityLayer::with_clusterer(self.selection(), Arc::new(clusterer))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WallConfig {
    /// Result size of plain (non-diversified) wall matching
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    /// Builder pre-loaded with every default; callers layer sources on top
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let weights = CriterionWeights::default();

        let builder = config::Config::builder()
            .set_default("service.service_name", "artwork-ranking-service")?
            .set_default("storage.backend", "memory")?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.key_prefix", "artwork")?
            .set_default("redis.session_ttl_seconds", 0)?
            .set_default("redis.batch_size", 500)?
            .set_default("ranking.top_k", 10)?
            .set_default("ranking.default_weights.embedding", weights.embedding as f64)?
            .set_default("ranking.default_weights.color", weights.color as f64)?
            .set_default("ranking.default_weights.abstract", weights.r#abstract as f64)?
            .set_default("ranking.default_weights.paint", weights.paint as f64)?
            .set_default("ranking.default_weights.noisy", weights.noisy as f64)?
            .set_default("ranking.normalization", "raw")?
            .set_default("ranking.weight_policy", "reject_non_finite")?
            .set_default("diversity.candidate_pool", 30)?
            .set_default("diversity.max_clusters", 5)?
            .set_default("diversity.per_cluster", 2)?
            .set_default("diversity.target_size", 10)?
            .set_default("diversity.neighbors", 3)?
            .set_default("diversity.max_iterations", 20)?
            .set_default("walls.top_k", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        Ok(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.ranking.top_k > 0, "ranking.top_k must be positive");
        ensure!(
            self.ranking.default_weights.is_finite(),
            "ranking.default_weights must be finite"
        );

        let d = &self.diversity;
        ensure!(d.candidate_pool > 0, "diversity.candidate_pool must be positive");
        ensure!(d.max_clusters > 0, "diversity.max_clusters must be positive");
        ensure!(d.per_cluster > 0, "diversity.per_cluster must be positive");
        ensure!(d.target_size > 0, "diversity.target_size must be positive");

        ensure!(self.walls.top_k > 0, "walls.top_k must be positive");

        if self.storage.backend == StorageBackend::Redis {
            ensure!(!self.redis.url.is_empty(), "redis.url is required");
            ensure!(
                !self.redis.key_prefix.is_empty(),
                "redis.key_prefix must not be empty"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_builder(Config::defaults().unwrap()).unwrap();

        assert_eq!(config.service.service_name, "artwork-ranking-service");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.ranking.top_k, 10);
        assert_eq!(config.ranking.normalization, NormalizationMode::Raw);
        assert_eq!(config.ranking.weight_policy, WeightPolicy::RejectNonFinite);
        assert!((config.ranking.default_weights.r#abstract - 0.3).abs() < 1e-6);
        assert_eq!(config.diversity.selection(), DiversityConfig::default());
        assert_eq!(config.diversity.layer().config().candidate_pool, 30);
        assert_eq!(config.walls.top_k, 30);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_overrides() {
        let builder = Config::defaults()
            .unwrap()
            .set_override("ranking.top_k", 25)
            .unwrap()
            .set_override("ranking.normalization", "min_max")
            .unwrap()
            .set_override("ranking.weight_policy", "clamp_non_negative")
            .unwrap()
            .set_override("storage.backend", "redis")
            .unwrap();

        let config = Config::from_builder(builder).unwrap();

        assert_eq!(config.ranking.top_k, 25);
        assert_eq!(config.ranking.normalization, NormalizationMode::MinMax);
        assert_eq!(config.ranking.weight_policy, WeightPolicy::ClampNonNegative);
        assert_eq!(config.storage.backend, StorageBackend::Redis);
    }

    #[test]
    fn test_validation_rejects_zero_top_k() {
        let builder = Config::defaults()
            .unwrap()
            .set_override("ranking.top_k", 0)
            .unwrap();

        let err = Config::from_builder(builder).unwrap_err();
        assert!(format!("{:#}", err).contains("ranking.top_k"));
    }

    #[test]
    fn test_validation_requires_redis_prefix() {
        let builder = Config::defaults()
            .unwrap()
            .set_override("storage.backend", "redis")
            .unwrap()
            .set_override("redis.key_prefix", "")
            .unwrap();

        assert!(Config::from_builder(builder).is_err());
    }
}
