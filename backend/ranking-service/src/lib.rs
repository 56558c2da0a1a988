pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod services;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::{RankingError, Result};
pub use service::{ArtworkRankingService, RankRequest, RankResponse};
pub use services::{DiversityLayer, FeatureStore, RankingLayer, SessionLog};
