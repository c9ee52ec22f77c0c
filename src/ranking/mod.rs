//! Ranking Module
//!
//! Personalized content ranking driven by per-user interaction events.
//!
//! ## Architecture
//!
//! 1. **Store** - Per-user behavior, per-content metrics, interests and bounded history
//! 2. **Recorder** - Applies one interaction and recomputes the touched content's signals
//! 3. **Scoring** - Pure scoring functions (relevance, trending, decay, diversity)
//! 4. **Feed** - Ranks unseen content for a user, or all content globally
//! 5. **Optimizer** - Periodic recompute, staleness cleanup and weight tuning
//! 6. **Engine** - Thread-safe facade tying the pieces together
//!
//! ## Algorithm Overview
//!
//! The personalized feed uses a multi-factor weighted sum:
//! - Watch time (25%): cumulative watch time, saturating at one second
//! - Engagement (20%): likes, shares and comments per view
//! - Recency (15%): half-life decay from creation time
//! - Virality (15%): share rate blended with engagement
//! - Personalization (15%): how engaged the requesting user is overall
//! - Diversity (10%): seeded exploration favoring topics new to the user

pub mod engine;
pub mod feed;
pub mod insights;
pub mod metrics;
pub mod optimizer;
pub mod recorder;
pub mod scoring;
pub mod store;

pub use engine::RankingEngine;
pub use feed::ScoredContent;
pub use insights::{AlgorithmPerformance, UserInsights};
pub use optimizer::{StaticWeights, SweepReport, WeightTuner};
pub use recorder::Interaction;
pub use scoring::ScoringWeights;
pub use store::{ContentMetric, InteractionKind, MetricStore, UserBehavior};
