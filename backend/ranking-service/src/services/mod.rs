pub mod diversity;
pub mod features;
pub mod inference;
pub mod interactions;
pub mod preference;
pub mod ranking;
pub mod scoring;
pub mod session_log;
pub mod walls;

pub use diversity::{AffinityKMeans, Clusterer, DiversityConfig, DiversityLayer};
pub use features::{CandidateSet, FeatureExtractor, FeatureStore, InMemoryFeatureStore, RedisFeatureStore};
pub use interactions::InteractionTracker;
pub use preference::{PreferenceAggregator, PreferenceSummary};
pub use ranking::{RankingLayer, RankingOutput};
pub use scoring::{NormalizationMode, ScoringEngine, WeightPolicy};
pub use session_log::{InMemorySessionLog, RedisSessionLog, SessionLog};
pub use walls::{WallMatcher, WallSelection};
