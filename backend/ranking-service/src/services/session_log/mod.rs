// ============================================
// Session Log
// ============================================
//
// One row per prediction session. The first write for a session creates the
// row; later writes only replace the feedback columns. Both backends perform
// this as a keyed upsert that is atomic per session id.

pub mod redis_log;

pub use redis_log::RedisSessionLog;

use crate::models::{CriterionWeights, ItemId, SessionLogEntry, TopPrediction};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SessionLogError {
    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl SessionLogError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionLogError::RedisError(_))
    }
}

impl From<redis::RedisError> for SessionLogError {
    fn from(err: redis::RedisError) -> Self {
        SessionLogError::RedisError(err.to_string())
    }
}

impl From<serde_json::Error> for SessionLogError {
    fn from(err: serde_json::Error) -> Self {
        SessionLogError::InvalidData(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionLogError>;

/// Arguments of one `log` call
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub weights: CriterionWeights,
    pub liked_ids: Vec<ItemId>,
    pub disliked_ids: Vec<ItemId>,
    pub top_predictions: Vec<TopPrediction>,
    pub feedback_liked: Vec<ItemId>,
    pub feedback_disliked: Vec<ItemId>,
}

impl SessionRecord {
    fn into_entry(self) -> SessionLogEntry {
        let now = Utc::now();
        SessionLogEntry {
            session_id: self.session_id,
            weights: self.weights,
            liked_ids: self.liked_ids,
            disliked_ids: self.disliked_ids,
            top_predictions: self.top_predictions,
            feedback_liked: self.feedback_liked,
            feedback_disliked: self.feedback_disliked,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Created,
    FeedbackUpdated,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionLog: Send + Sync {
    /// Create the session row, or overwrite only its feedback if it exists
    async fn log(&self, record: SessionRecord) -> Result<LogOutcome>;

    /// Replace the feedback of an existing session. Returns false if unknown.
    async fn update_feedback(
        &self,
        session_id: &str,
        feedback_liked: Vec<ItemId>,
        feedback_disliked: Vec<ItemId>,
    ) -> Result<bool>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionLogEntry>>;
}

/// Sharded in-process log. The DashMap entry lock makes each upsert atomic.
#[derive(Default)]
pub struct InMemorySessionLog {
    entries: DashMap<String, SessionLogEntry>,
}

impl InMemorySessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionLog for InMemorySessionLog {
    async fn log(&self, record: SessionRecord) -> Result<LogOutcome> {
        match self.entries.entry(record.session_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.feedback_liked = record.feedback_liked;
                entry.feedback_disliked = record.feedback_disliked;
                entry.updated_at = Utc::now();
                debug!(session_id = %entry.session_id, "Session feedback updated");
                Ok(LogOutcome::FeedbackUpdated)
            }
            Entry::Vacant(vacant) => {
                debug!(session_id = %record.session_id, "Session logged");
                vacant.insert(record.into_entry());
                Ok(LogOutcome::Created)
            }
        }
    }

    async fn update_feedback(
        &self,
        session_id: &str,
        feedback_liked: Vec<ItemId>,
        feedback_disliked: Vec<ItemId>,
    ) -> Result<bool> {
        match self.entries.get_mut(session_id) {
            Some(mut entry) => {
                entry.feedback_liked = feedback_liked;
                entry.feedback_disliked = feedback_disliked;
                entry.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionLogEntry>> {
        Ok(self.entries.get(session_id).map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(session_id: &str) -> SessionRecord {
        SessionRecord {
            session_id: session_id.to_string(),
            weights: CriterionWeights::default(),
            liked_ids: vec![ItemId::from("1")],
            disliked_ids: vec![ItemId::from("2")],
            top_predictions: Vec::new(),
            feedback_liked: Vec::new(),
            feedback_disliked: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_identical_log_calls_keep_one_entry() {
        let log = InMemorySessionLog::new();

        assert_eq!(log.log(record("s1")).await.unwrap(), LogOutcome::Created);
        assert_eq!(
            log.log(record("s1")).await.unwrap(),
            LogOutcome::FeedbackUpdated
        );

        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_leaves_prediction_untouched() {
        let log = InMemorySessionLog::new();
        log.log(record("s1")).await.unwrap();

        let mut later = record("s1");
        later.liked_ids = vec![ItemId::from("99")];
        later.weights = CriterionWeights::embedding_only(1.0);
        later.feedback_liked = vec![ItemId::from("5")];
        later.feedback_disliked = vec![ItemId::from("6")];
        log.log(later).await.unwrap();

        let entry = log.get("s1").await.unwrap().unwrap();
        assert_eq!(entry.liked_ids, vec![ItemId::from("1")]);
        assert_eq!(entry.weights, CriterionWeights::default());
        assert_eq!(entry.feedback_liked, vec![ItemId::from("5")]);
        assert_eq!(entry.feedback_disliked, vec![ItemId::from("6")]);
        assert!(entry.updated_at >= entry.created_at);
    }

    #[tokio::test]
    async fn test_update_feedback_unknown_session() {
        let log = InMemorySessionLog::new();

        let updated = log
            .update_feedback("missing", vec![ItemId::from("1")], Vec::new())
            .await
            .unwrap();

        assert!(!updated);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_single_row() {
        let log = Arc::new(InMemorySessionLog::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut r = record("shared");
                    r.feedback_liked = vec![ItemId::from(i as u64)];
                    log.log(r).await.unwrap()
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() == LogOutcome::Created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(log.len(), 1);
    }
}
