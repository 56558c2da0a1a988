// ============================================
// Redis Session Log
// ============================================
//
// One hash per session:
// - {prefix}:session:{session_id}
//     meta              - JSON, written once (HSETNX)
//     feedback_liked    - JSON id array
//     feedback_disliked - JSON id array
//     updated_at        - RFC 3339 timestamp
//
// Both writes run as Lua scripts so the existence check and the feedback
// overwrite are a single atomic step per session key.

use super::{LogOutcome, Result, SessionLog, SessionLogError, SessionRecord};
use crate::models::{CriterionWeights, ItemId, SessionLogEntry, TopPrediction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

const FIELD_META: &str = "meta";
const FIELD_FEEDBACK_LIKED: &str = "feedback_liked";
const FIELD_FEEDBACK_DISLIKED: &str = "feedback_disliked";
const FIELD_UPDATED_AT: &str = "updated_at";

/// Returns 1 when the meta field was created, 0 when it already existed
const LOG_SCRIPT: &str = r#"
local created = redis.call('HSETNX', KEYS[1], 'meta', ARGV[1])
redis.call('HSET', KEYS[1], 'feedback_liked', ARGV[2], 'feedback_disliked', ARGV[3], 'updated_at', ARGV[4])
return created
"#;

/// Returns 0 without writing when the session was never logged
const UPDATE_FEEDBACK_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[1], 'meta') == 0 then
    return 0
end
redis.call('HSET', KEYS[1], 'feedback_liked', ARGV[1], 'feedback_disliked', ARGV[2], 'updated_at', ARGV[3])
return 1
"#;

/// Write-once part of a session row
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMeta {
    session_id: String,
    weights: CriterionWeights,
    liked_ids: Vec<ItemId>,
    disliked_ids: Vec<ItemId>,
    top_predictions: Vec<TopPrediction>,
    created_at: DateTime<Utc>,
}

pub struct RedisSessionLog {
    redis: redis::Client,
    key_prefix: String,
    /// Expiry applied on every write; None keeps sessions forever
    ttl_seconds: Option<i64>,
}

impl RedisSessionLog {
    pub fn new(redis: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
            ttl_seconds: None,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = (ttl_seconds > 0).then_some(ttl_seconds);
        self
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}:session:{}", self.key_prefix, session_id)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.redis.get_multiplexed_async_connection().await?)
    }

    async fn touch_ttl(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
    ) -> Result<()> {
        if let Some(ttl) = self.ttl_seconds {
            let _: bool = conn.expire(key, ttl).await?;
        }
        Ok(())
    }
}

fn parse_entry(fields: HashMap<String, String>) -> Result<SessionLogEntry> {
    let meta_json = fields
        .get(FIELD_META)
        .ok_or_else(|| SessionLogError::InvalidData("session hash has no meta field".to_string()))?;
    let meta: SessionMeta = serde_json::from_str(meta_json)?;

    let ids = |field: &str| -> Result<Vec<ItemId>> {
        match fields.get(field) {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(Vec::new()),
        }
    };

    let updated_at = match fields.get(FIELD_UPDATED_AT) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| SessionLogError::InvalidData(e.to_string()))?
            .with_timezone(&Utc),
        None => meta.created_at,
    };

    Ok(SessionLogEntry {
        session_id: meta.session_id,
        weights: meta.weights,
        liked_ids: meta.liked_ids,
        disliked_ids: meta.disliked_ids,
        top_predictions: meta.top_predictions,
        feedback_liked: ids(FIELD_FEEDBACK_LIKED)?,
        feedback_disliked: ids(FIELD_FEEDBACK_DISLIKED)?,
        created_at: meta.created_at,
        updated_at,
    })
}

#[async_trait]
impl SessionLog for RedisSessionLog {
    async fn log(&self, record: SessionRecord) -> Result<LogOutcome> {
        let mut conn = self.connection().await?;
        let key = self.session_key(&record.session_id);
        let now = Utc::now();

        let meta = SessionMeta {
            session_id: record.session_id.clone(),
            weights: record.weights,
            liked_ids: record.liked_ids,
            disliked_ids: record.disliked_ids,
            top_predictions: record.top_predictions,
            created_at: now,
        };

        let created: i64 = redis::Script::new(LOG_SCRIPT)
            .key(&key)
            .arg(serde_json::to_string(&meta)?)
            .arg(serde_json::to_string(&record.feedback_liked)?)
            .arg(serde_json::to_string(&record.feedback_disliked)?)
            .arg(now.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;
        self.touch_ttl(&mut conn, &key).await?;

        if created == 1 {
            info!(
                session_id = %record.session_id,
                predictions = meta.top_predictions.len(),
                "Session logged"
            );
            Ok(LogOutcome::Created)
        } else {
            debug!(session_id = %record.session_id, "Session feedback updated");
            Ok(LogOutcome::FeedbackUpdated)
        }
    }

    async fn update_feedback(
        &self,
        session_id: &str,
        feedback_liked: Vec<ItemId>,
        feedback_disliked: Vec<ItemId>,
    ) -> Result<bool> {
        let mut conn = self.connection().await?;
        let key = self.session_key(session_id);

        let updated: i64 = redis::Script::new(UPDATE_FEEDBACK_SCRIPT)
            .key(&key)
            .arg(serde_json::to_string(&feedback_liked)?)
            .arg(serde_json::to_string(&feedback_disliked)?)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        if updated == 1 {
            self.touch_ttl(&mut conn, &key).await?;
            debug!(
                session_id = session_id,
                liked = feedback_liked.len(),
                disliked = feedback_disliked.len(),
                "Session feedback updated"
            );
        }

        Ok(updated == 1)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionLogEntry>> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(self.session_key(session_id)).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        parse_entry(fields).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> RedisSessionLog {
        let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
        RedisSessionLog::new(client, "artwork")
    }

    fn meta_json_with(weights: CriterionWeights, top_predictions: Vec<TopPrediction>) -> String {
        serde_json::to_string(&SessionMeta {
            session_id: "s1".to_string(),
            weights,
            liked_ids: vec![ItemId::from("3")],
            disliked_ids: vec![ItemId::from("4")],
            top_predictions,
            created_at: Utc::now(),
        })
        .unwrap()
    }

    fn meta_json() -> String {
        meta_json_with(CriterionWeights::default(), Vec::new())
    }

    #[test]
    fn test_session_key_layout() {
        assert_eq!(log().session_key("abc"), "artwork:session:abc");
    }

    #[test]
    fn test_ttl_ignores_non_positive() {
        assert_eq!(log().with_ttl(0).ttl_seconds, None);
        assert_eq!(log().with_ttl(3600).ttl_seconds, Some(3600));
    }

    #[test]
    fn test_parse_entry_with_feedback() {
        let mut fields = HashMap::new();
        fields.insert(FIELD_META.to_string(), meta_json());
        fields.insert(FIELD_FEEDBACK_LIKED.to_string(), r#"["7","8"]"#.to_string());
        fields.insert(FIELD_FEEDBACK_DISLIKED.to_string(), "[]".to_string());
        fields.insert(
            FIELD_UPDATED_AT.to_string(),
            "2026-01-02T03:04:05+00:00".to_string(),
        );

        let entry = parse_entry(fields).unwrap();

        assert_eq!(entry.session_id, "s1");
        assert_eq!(entry.liked_ids, vec![ItemId::from("3")]);
        assert_eq!(entry.feedback_liked, vec![ItemId::from("7"), ItemId::from("8")]);
        assert!(entry.feedback_disliked.is_empty());
        assert_eq!(entry.updated_at.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_non_finite_weights_survive_storage() {
        let weights = CriterionWeights {
            embedding: f32::NAN,
            color: f32::INFINITY,
            ..CriterionWeights::embedding_only(0.0)
        };
        let prediction = TopPrediction {
            id: ItemId::from("9"),
            overall: f32::NAN,
            embedding: 0.25,
            color: f32::NEG_INFINITY,
            r#abstract: 0.0,
            paint: 0.0,
            noisy: 0.0,
        };

        let mut fields = HashMap::new();
        fields.insert(FIELD_META.to_string(), meta_json_with(weights, vec![prediction]));

        let entry = parse_entry(fields).unwrap();

        assert!(entry.weights.embedding.is_nan());
        assert_eq!(entry.weights.color, f32::INFINITY);
        assert_eq!(entry.weights.r#abstract, 0.0);
        let top = &entry.top_predictions[0];
        assert!(top.overall.is_nan());
        assert_eq!(top.color, f32::NEG_INFINITY);
        assert_eq!(top.embedding, 0.25);
    }

    #[test]
    fn test_parse_entry_requires_meta() {
        let mut fields = HashMap::new();
        fields.insert(FIELD_FEEDBACK_LIKED.to_string(), "[]".to_string());

        assert!(matches!(
            parse_entry(fields),
            Err(SessionLogError::InvalidData(_))
        ));
    }
}
