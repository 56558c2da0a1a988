// ============================================
// Artwork Ranking Service
// ============================================
//
// Request flow for `rank`:
// 1. Split interactions into liked / disliked / input ids
// 2. Fetch liked and disliked bundles, plus every other catalog bundle
// 3. Summarize preferences, score candidates, sort
// 4. Log the session (best effort) and return the top-k ids
//
// Store failures abort the request. Session log failures only warn.

use crate::config::{Config, RankingConfig, StorageBackend};
use crate::error::{RankingError, Result};
use crate::models::{
    CriterionWeights, Interaction, ItemId, Label, ModelScoredItem, SessionLogEntry, TopPrediction,
};
use crate::services::diversity::DiversityLayer;
use crate::services::features::{
    FeatureExtractor, FeatureStore, InMemoryFeatureStore, RedisFeatureStore,
};
use crate::services::inference::{CompatibilityModel, EmbeddingModel};
use crate::services::interactions::{split_labels, InteractionTracker};
use crate::services::preference::PreferenceAggregator;
use crate::services::ranking::{RankingLayer, RankingOutput};
use crate::services::scoring::{NormalizationMode, ScoringEngine};
use crate::services::session_log::{
    InMemorySessionLog, RedisSessionLog, SessionLog, SessionRecord,
};
use crate::services::walls::{WallMatcher, WallSelection};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct RankRequest {
    pub interactions: Vec<Interaction>,
    /// Falls back to the configured default weights
    pub weights: Option<CriterionWeights>,
    /// Generated when absent
    pub session_id: Option<String>,
    pub normalization: Option<NormalizationMode>,
}

impl RankRequest {
    pub fn new(interactions: Vec<Interaction>) -> Self {
        Self {
            interactions,
            ..Default::default()
        }
    }

    pub fn with_weights(mut self, weights: CriterionWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_normalization(mut self, normalization: NormalizationMode) -> Self {
        self.normalization = Some(normalization);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RankResponse {
    pub session_id: String,
    /// Best `top_k` candidate ids
    pub ranked_ids: Vec<ItemId>,
    /// Overall scores parallel to `ranked_ids`
    pub scores: Vec<f32>,
    /// Full ranking over every candidate
    pub ranking: RankingOutput,
}

pub struct ArtworkRankingService {
    feature_store: Arc<dyn FeatureStore>,
    session_log: Arc<dyn SessionLog>,
    interactions: InteractionTracker,
    ranking_layer: RankingLayer,
    config: RankingConfig,
    wall_top_k: usize,
    wall_matcher: Option<WallMatcher>,
    extractor: Option<FeatureExtractor>,
}

impl ArtworkRankingService {
    pub fn new(
        feature_store: Arc<dyn FeatureStore>,
        session_log: Arc<dyn SessionLog>,
        config: RankingConfig,
    ) -> Self {
        Self {
            feature_store,
            session_log,
            interactions: InteractionTracker::new(),
            ranking_layer: RankingLayer::new(),
            config,
            wall_top_k: 30,
            wall_matcher: None,
            extractor: None,
        }
    }

    /// Build the stores named by the configuration.
    ///
    /// Redis clients connect lazily, so this does not touch the network.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let (feature_store, session_log): (Arc<dyn FeatureStore>, Arc<dyn SessionLog>) =
            match config.storage.backend {
                StorageBackend::Memory => (
                    Arc::new(InMemoryFeatureStore::new()),
                    Arc::new(InMemorySessionLog::new()),
                ),
                StorageBackend::Redis => {
                    let client = redis::Client::open(config.redis.url.as_str())
                        .context("Failed to create Redis client")?;
                    let prefix = config.redis.key_prefix.clone();
                    (
                        Arc::new(
                            RedisFeatureStore::new(client.clone(), prefix.clone())
                                .with_batch_size(config.redis.batch_size),
                        ),
                        Arc::new(
                            RedisSessionLog::new(client, prefix)
                                .with_ttl(config.redis.session_ttl_seconds),
                        ),
                    )
                }
            };

        info!(
            service = %config.service.service_name,
            backend = ?config.storage.backend,
            top_k = config.ranking.top_k,
            "Artwork ranking service configured"
        );

        let mut service = Self::new(feature_store, session_log, config.ranking.clone());
        service.wall_top_k = config.walls.top_k;
        Ok(service)
    }

    pub fn with_wall_matcher(mut self, matcher: WallMatcher) -> Self {
        self.wall_matcher = Some(matcher);
        self
    }

    /// Wire wall matching over this service's feature store
    pub fn with_wall_models(
        self,
        embedder: Arc<dyn EmbeddingModel>,
        model: Arc<dyn CompatibilityModel>,
        diversity: DiversityLayer,
    ) -> Self {
        let matcher = WallMatcher::new(self.feature_store.clone(), embedder, model, diversity);
        self.with_wall_matcher(matcher)
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_wall_top_k(mut self, top_k: usize) -> Self {
        self.wall_top_k = top_k;
        self
    }

    pub fn feature_store(&self) -> &Arc<dyn FeatureStore> {
        &self.feature_store
    }

    /// Rank every catalog item the request did not mention
    pub async fn rank(&self, request: RankRequest) -> Result<RankResponse> {
        let weights = self
            .config
            .weight_policy
            .apply(request.weights.unwrap_or(self.config.default_weights))?;
        let normalization = request.normalization.unwrap_or(self.config.normalization);
        let session_id = request
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let split = split_labels(&request.interactions);

        let (liked, disliked, candidates) = tokio::try_join!(
            self.feature_store.fetch(&split.liked),
            self.feature_store.fetch(&split.disliked),
            self.feature_store.fetch_complement(&split.input_ids),
        )?;

        debug!(
            session_id = %session_id,
            liked_count = liked.len(),
            disliked_count = disliked.len(),
            candidate_count = candidates.len(),
            "Features loaded"
        );

        let ranking = match candidates.dimensions() {
            None => RankingOutput::default(),
            Some((embedding_dim, color_dim)) => {
                let aggregator = PreferenceAggregator::new(embedding_dim, color_dim);
                let liked_summary = aggregator.summarize(&liked)?;
                let disliked_summary = aggregator.summarize(&disliked)?;

                let records = ScoringEngine::new(weights, normalization).score(
                    &candidates.bundles,
                    &liked_summary,
                    &disliked_summary,
                )?;
                self.ranking_layer.rank(records)
            }
        };

        let top_predictions: Vec<TopPrediction> = ranking
            .top(self.config.top_k)
            .iter()
            .map(TopPrediction::from)
            .collect();

        let record = SessionRecord {
            session_id: session_id.clone(),
            weights,
            liked_ids: split.liked,
            disliked_ids: split.disliked,
            top_predictions,
            feedback_liked: Vec::new(),
            feedback_disliked: Vec::new(),
        };
        if let Err(e) = self.session_log.log(record).await {
            warn!(session_id = %session_id, error = %e, "Failed to log session");
        }

        let top = ranking.len().min(self.config.top_k);
        let ranked_ids = ranking.ids[..top].to_vec();
        let scores = ranking.scores[..top].to_vec();

        info!(
            session_id = %session_id,
            candidate_count = ranking.len(),
            returned = ranked_ids.len(),
            top_score = scores.first().copied(),
            "Ranking complete"
        );

        Ok(RankResponse {
            session_id,
            ranked_ids,
            scores,
            ranking,
        })
    }

    /// Rank with the full recorded history of a user
    pub async fn rank_for_user(
        &self,
        user_id: &str,
        weights: Option<CriterionWeights>,
        session_id: Option<String>,
    ) -> Result<RankResponse> {
        let request = RankRequest {
            interactions: self.interactions.interactions(user_id),
            weights,
            session_id,
            normalization: None,
        };
        self.rank(request).await
    }

    /// Returns false when the interaction was already recorded
    pub fn record_interaction(&self, user_id: &str, item_id: ItemId, label: Label) -> bool {
        self.interactions.record(user_id, item_id, label)
    }

    pub fn interactions(&self, user_id: &str) -> Vec<Interaction> {
        self.interactions.interactions(user_id)
    }

    /// Replace the feedback of a logged session
    pub async fn record_feedback(
        &self,
        session_id: &str,
        feedback: HashMap<ItemId, Label>,
    ) -> Result<()> {
        let mut liked = Vec::new();
        let mut disliked = Vec::new();
        for (id, label) in feedback {
            match label {
                Label::Liked => liked.push(id),
                Label::Disliked => disliked.push(id),
            }
        }
        liked.sort();
        disliked.sort();

        let (liked_count, disliked_count) = (liked.len(), disliked.len());
        if !self
            .session_log
            .update_feedback(session_id, liked, disliked)
            .await?
        {
            return Err(RankingError::SessionNotFound(session_id.to_string()));
        }

        info!(
            session_id = session_id,
            liked = liked_count,
            disliked = disliked_count,
            "Feedback recorded"
        );
        Ok(())
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<SessionLogEntry>> {
        Ok(self.session_log.get(session_id).await?)
    }

    /// Artworks that fit a wall photo, diversified or plain top-k
    pub async fn match_wall(
        &self,
        wall_image_ref: &str,
        diversify: bool,
    ) -> Result<Vec<ModelScoredItem>> {
        let matcher = self
            .wall_matcher
            .as_ref()
            .ok_or(RankingError::WallMatchingDisabled)?;

        let selection = if diversify {
            WallSelection::Diversified
        } else {
            WallSelection::TopK(self.wall_top_k)
        };
        matcher.match_wall(wall_image_ref, selection).await
    }

    /// Extract features for a new artwork and add it to the catalog
    pub async fn add_artwork(&self, id: ItemId, image_refs: &[String]) -> Result<()> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or(RankingError::IngestionDisabled)?;

        if !self
            .feature_store
            .fetch(std::slice::from_ref(&id))
            .await?
            .is_empty()
        {
            return Err(RankingError::AlreadyExists(id.to_string()));
        }

        let bundle = extractor.extract(id.clone(), image_refs).await?;
        // A concurrent ingest of the same id may still win the insert
        if !self.feature_store.insert(bundle).await? {
            return Err(RankingError::AlreadyExists(id.to_string()));
        }

        info!(item_id = %id, image_count = image_refs.len(), "Artwork added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureBundle, ScalarAttributes};
    use crate::services::features::{CandidateSet, FeatureStoreError, MockFeatureStore};
    use crate::services::session_log::{LogOutcome, MockSessionLog, SessionLogError};

    fn ranking_config() -> RankingConfig {
        RankingConfig {
            top_k: 10,
            default_weights: CriterionWeights::default(),
            normalization: NormalizationMode::Raw,
            weight_policy: Default::default(),
        }
    }

    fn bundle(id: u64, embedding: Vec<f32>) -> FeatureBundle {
        FeatureBundle {
            id: ItemId::from(id),
            color_histogram: embedding.clone(),
            embedding,
            scalar_attributes: ScalarAttributes::default(),
        }
    }

    fn healthy_store() -> MockFeatureStore {
        let mut store = MockFeatureStore::new();
        store
            .expect_fetch()
            .returning(|ids| Ok(ids.iter().map(|_| bundle(1, vec![1.0, 0.0])).collect()));
        store.expect_fetch_complement().returning(|_| {
            Ok(CandidateSet::new(vec![
                bundle(2, vec![0.0, 1.0]),
                bundle(3, vec![1.0, 0.0]),
            ]))
        });
        store
    }

    #[tokio::test]
    async fn test_store_failure_fails_request() {
        let mut store = MockFeatureStore::new();
        store
            .expect_fetch()
            .returning(|_| Err(FeatureStoreError::Unavailable("timeout".to_string())));
        store
            .expect_fetch_complement()
            .returning(|_| Ok(CandidateSet::default()));
        let mut log = MockSessionLog::new();
        log.expect_log().never();

        let service = ArtworkRankingService::new(Arc::new(store), Arc::new(log), ranking_config());
        let err = service
            .rank(RankRequest::new(vec![Interaction::liked("1")]))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_session_log_failure_still_ranks() {
        let mut log = MockSessionLog::new();
        log.expect_log()
            .times(1)
            .returning(|_| Err(SessionLogError::RedisError("connection reset".to_string())));

        let service =
            ArtworkRankingService::new(Arc::new(healthy_store()), Arc::new(log), ranking_config());
        let response = service
            .rank(RankRequest::new(vec![Interaction::liked("1")]).with_session_id("s1"))
            .await
            .unwrap();

        assert_eq!(response.session_id, "s1");
        assert_eq!(response.ranked_ids, vec![ItemId::from("3"), ItemId::from("2")]);
    }

    #[tokio::test]
    async fn test_logged_record_carries_request() {
        let mut log = MockSessionLog::new();
        log.expect_log()
            .withf(|record: &SessionRecord| {
                record.liked_ids == vec![ItemId::from("1")]
                    && record.top_predictions.len() == 2
                    && record.feedback_liked.is_empty()
            })
            .times(1)
            .returning(|_| Ok(LogOutcome::Created));

        let service =
            ArtworkRankingService::new(Arc::new(healthy_store()), Arc::new(log), ranking_config());
        let response = service
            .rank(RankRequest::new(vec![Interaction::liked("1")]))
            .await
            .unwrap();

        assert!(Uuid::parse_str(&response.session_id).is_ok());
    }

    #[tokio::test]
    async fn test_non_finite_weights_rejected() {
        let service = ArtworkRankingService::new(
            Arc::new(MockFeatureStore::new()),
            Arc::new(MockSessionLog::new()),
            ranking_config(),
        );

        let err = service
            .rank(
                RankRequest::new(Vec::new())
                    .with_weights(CriterionWeights::default().with_embedding(f32::INFINITY)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RankingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_feedback_for_unknown_session() {
        let mut log = MockSessionLog::new();
        log.expect_update_feedback().returning(|_, _, _| Ok(false));

        let service = ArtworkRankingService::new(
            Arc::new(MockFeatureStore::new()),
            Arc::new(log),
            ranking_config(),
        );
        let mut feedback = HashMap::new();
        feedback.insert(ItemId::from("4"), Label::Liked);

        let err = service.record_feedback("ghost", feedback).await.unwrap_err();
        assert!(matches!(err, RankingError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_optional_features_disabled() {
        let service = ArtworkRankingService::new(
            Arc::new(MockFeatureStore::new()),
            Arc::new(MockSessionLog::new()),
            ranking_config(),
        );

        assert!(matches!(
            service.match_wall("wall.jpg", true).await,
            Err(RankingError::WallMatchingDisabled)
        ));
        assert!(matches!(
            service.add_artwork(ItemId::from("9"), &["a.jpg".to_string()]).await,
            Err(RankingError::IngestionDisabled)
        ));
    }

    #[test]
    fn test_from_config_memory_backend() {
        let config = Config::from_builder(Config::defaults().unwrap()).unwrap();
        let service = ArtworkRankingService::from_config(&config).unwrap();

        assert_eq!(service.wall_top_k, 30);
        assert!(service.wall_matcher.is_none());
    }
}
