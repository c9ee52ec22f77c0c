//! SocialRank library crate
//!
//! Re-exports core modules for integration tests and embedding hosts.

pub mod api;
pub mod config;
pub mod error;
pub mod persistence;
pub mod ranking;
pub mod scheduler;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use persistence::{FileAdapter, LoadOutcome, MemoryAdapter, PersistenceAdapter, SnapshotStore};
pub use ranking::{
    AlgorithmPerformance, ContentMetric, Interaction, InteractionKind, MetricStore,
    RankingEngine, ScoredContent, ScoringWeights, UserBehavior, UserInsights,
};
