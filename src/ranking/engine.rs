//! Ranking Engine
//!
//! The public face of the ranking core. Owns the metric store and scoring
//! weights behind one coarse lock each and exposes the synchronous operations
//! collaborators call: `track`, `personalized_feed`, `trending` and the
//! insight getters.
//!
//! Lock order is always store, then weights. Feed composition copies the
//! weights out before taking the store lock.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use super::feed::{FeedComposer, ScoredContent};
use super::insights::{AlgorithmPerformance, UserInsights};
use super::metrics;
use super::optimizer::{Optimizer, SweepReport, WeightTuner};
use super::recorder::{Interaction, InteractionRecorder, TrackOutcome};
use super::scoring::ScoringWeights;
use super::store::{ContentMetric, InteractionKind, MetricStore};
use crate::config::EngineConfig;

pub struct RankingEngine {
    store: RwLock<MetricStore>,
    weights: RwLock<ScoringWeights>,
    recorder: InteractionRecorder,
    composer: FeedComposer,
    optimizer: Optimizer,
    config: EngineConfig,
}

impl RankingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: RwLock::new(MetricStore::new()),
            weights: RwLock::new(ScoringWeights::default()),
            recorder: InteractionRecorder::new(&config),
            composer: FeedComposer::new(config.diversity_seed, config.slow_feed_threshold),
            optimizer: Optimizer::new(&config),
            config,
        }
    }

    /// Replace the weight tuning hook
    pub fn with_tuner(mut self, tuner: Arc<dyn WeightTuner>) -> Self {
        self.optimizer = self.optimizer.with_tuner(tuner);
        self
    }

    /// Start from fixed weights (normalized; invalid weights fall back to defaults)
    pub fn with_weights(self, weights: ScoringWeights) -> Self {
        *self.weights.write() = weights.normalized().unwrap_or_default();
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Record an interaction. Never fails.
    pub fn track(
        &self,
        user_id: &str,
        content_id: &str,
        kind: InteractionKind,
        duration_ms: Option<u64>,
    ) {
        let event = Interaction {
            user_id: user_id.to_string(),
            content_id: content_id.to_string(),
            kind,
            duration_ms,
        };
        self.record_at(&event, Utc::now());
    }

    pub fn record(&self, event: &Interaction) -> TrackOutcome {
        self.record_at(event, Utc::now())
    }

    /// Record an interaction observed at `now` (replay and tests)
    pub fn record_at(&self, event: &Interaction, now: DateTime<Utc>) -> TrackOutcome {
        let outcome = {
            let mut store = self.store.write();
            self.recorder.track(&mut store, event, now)
        };
        metrics::record_interaction(kind_label(event.kind));
        outcome
    }

    /// Register catalog data for a content item. Returns true if it was new.
    pub fn register_content(
        &self,
        content_id: &str,
        tags: &[String],
        created_at: Option<DateTime<Utc>>,
    ) -> bool {
        self.register_content_at(content_id, tags, created_at, Utc::now())
    }

    pub fn register_content_at(
        &self,
        content_id: &str,
        tags: &[String],
        created_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut store = self.store.write();
        self.recorder
            .register_content(&mut store, content_id, tags, created_at, now)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Ids of the top `limit` unseen content items for a user
    pub fn personalized_feed(&self, user_id: &str, limit: usize) -> Vec<String> {
        self.personalized_feed_scored(user_id, limit)
            .into_iter()
            .map(|s| s.content_id)
            .collect()
    }

    pub fn personalized_feed_scored(&self, user_id: &str, limit: usize) -> Vec<ScoredContent> {
        let weights = self.weights();
        let feed = {
            let store = self.store.read();
            self.composer
                .personalized_feed(&store, &weights, user_id, limit)
        };
        metrics::record_feed_request("personalized");
        debug!(user_id, returned = feed.len(), "Composed personalized feed");
        feed
    }

    /// Ids of the top `limit` content items by trending score
    pub fn trending(&self, limit: usize) -> Vec<String> {
        self.trending_scored(limit)
            .into_iter()
            .map(|s| s.content_id)
            .collect()
    }

    pub fn trending_scored(&self, limit: usize) -> Vec<ScoredContent> {
        let feed = self.composer.trending(&self.store.read(), limit);
        metrics::record_feed_request("trending");
        feed
    }

    pub fn user_insights(&self, user_id: &str) -> UserInsights {
        UserInsights::from_store(&self.store.read(), user_id)
    }

    pub fn content_insights(&self, content_id: &str) -> Option<ContentMetric> {
        self.store.read().content(content_id).cloned()
    }

    pub fn algorithm_performance(&self) -> AlgorithmPerformance {
        let weights = self.weights();
        AlgorithmPerformance::from_store(&self.store.read(), &weights)
    }

    pub fn weights(&self) -> ScoringWeights {
        *self.weights.read()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Full optimizer sweep
    pub fn optimize(&self) -> SweepReport {
        self.optimize_at(Utc::now())
    }

    pub fn optimize_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut store = self.store.write();
        let mut weights = self.weights.write();
        let report = self.optimizer.run(&mut store, &mut weights, now);
        metrics::record_sweep(
            report.users_removed + report.content_removed + report.content_evicted,
            report.recompute_failures,
            store.user_count(),
            store.content_count(),
        );
        report
    }

    /// Recompute derived metrics only. Returns `(recomputed, failures)`.
    pub fn refresh_metrics(&self) -> (usize, usize) {
        self.refresh_metrics_at(Utc::now())
    }

    pub fn refresh_metrics_at(&self, now: DateTime<Utc>) -> (usize, usize) {
        self.optimizer.refresh(&mut self.store.write(), now)
    }

    /// Run `f` against a consistent view of the store and weights
    pub fn with_snapshot<T>(&self, f: impl FnOnce(&MetricStore, &ScoringWeights) -> T) -> T {
        let store = self.store.read();
        let weights = self.weights.read();
        f(&store, &weights)
    }

    /// Replace all state, e.g. after loading a persisted snapshot
    pub fn replace_state(&self, store: MetricStore, weights: Option<ScoringWeights>) {
        let mut current = self.store.write();
        let mut current_weights = self.weights.write();
        *current = store;
        if let Some(w) = weights {
            *current_weights = w;
        }
    }
}

fn kind_label(kind: InteractionKind) -> &'static str {
    match kind {
        InteractionKind::View => "view",
        InteractionKind::Like => "like",
        InteractionKind::Share => "share",
        InteractionKind::Comment => "comment",
        InteractionKind::Purchase => "purchase",
        InteractionKind::Skip => "skip",
    }
}
