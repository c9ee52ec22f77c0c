//! Optimizer
//!
//! Periodic maintenance over the whole metric store:
//! 1. **Recompute** every content's derived fields from its counts
//! 2. **Cleanup** users idle past the inactivity window and content whose
//!    recency has decayed below the floor (the only deletion path)
//! 3. **Evict** lowest-recency content while over the content cap
//! 4. **Tune** weights through the pluggable [`WeightTuner`]
//!
//! A record that fails to recompute is logged and skipped; the sweep goes on.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::insights::AlgorithmPerformance;
use super::scoring::{self, ScoringWeights};
use super::store::MetricStore;
use crate::config::EngineConfig;

/// Extension point for adjusting scoring weights between sweeps
pub trait WeightTuner: Send + Sync {
    /// Propose new weights, or `None` to keep the current ones.
    /// Proposals are normalized to sum to 1.0 before use.
    fn tune(
        &self,
        current: &ScoringWeights,
        performance: &AlgorithmPerformance,
    ) -> Option<ScoringWeights>;
}

/// Keeps weights fixed
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticWeights;

impl WeightTuner for StaticWeights {
    fn tune(&self, _: &ScoringWeights, _: &AlgorithmPerformance) -> Option<ScoringWeights> {
        None
    }
}

/// Report from an optimizer sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub users_removed: usize,
    pub content_removed: usize,
    pub content_evicted: usize,
    pub recomputed: usize,
    pub recompute_failures: usize,
    pub weights_changed: bool,
    pub elapsed_ms: u64,
}

#[derive(Clone)]
pub struct Optimizer {
    inactive_after: Duration,
    min_recency: f64,
    max_content: usize,
    half_life: Duration,
    tuner: Arc<dyn WeightTuner>,
}

impl Optimizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            inactive_after: config.inactive_user_after,
            min_recency: config.min_recency,
            max_content: config.max_content,
            half_life: config.recency_half_life,
            tuner: Arc::new(StaticWeights),
        }
    }

    pub fn with_tuner(mut self, tuner: Arc<dyn WeightTuner>) -> Self {
        self.tuner = tuner;
        self
    }

    /// Recompute derived fields for all content.
    /// Returns `(recomputed, failures)`.
    pub fn refresh(&self, store: &mut MetricStore, now: DateTime<Utc>) -> (usize, usize) {
        let mut recomputed = 0;
        let mut failures = 0;

        for metric in store.content_mut() {
            match scoring::refresh_derived(metric, now, self.half_life) {
                Ok(()) => recomputed += 1,
                Err(e) => {
                    failures += 1;
                    warn!(content_id = %metric.content_id, "Recompute failed, skipping: {}", e);
                }
            }
        }

        (recomputed, failures)
    }

    /// Run a full sweep
    pub fn run(
        &self,
        store: &mut MetricStore,
        weights: &mut ScoringWeights,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let start = Instant::now();
        let mut report = SweepReport::default();

        let (recomputed, failures) = self.refresh(store, now);
        report.recomputed = recomputed;
        report.recompute_failures = failures;

        report.users_removed = self.cleanup_users(store, now);
        report.content_removed = self.cleanup_content(store);
        report.content_evicted = self.evict_overflow(store);
        report.weights_changed = self.tune_weights(store, weights);

        report.elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            "Optimizer sweep complete: {} recomputed ({} failed), {} users removed, {} content removed, {} evicted in {}ms",
            report.recomputed,
            report.recompute_failures,
            report.users_removed,
            report.content_removed,
            report.content_evicted,
            report.elapsed_ms
        );

        report
    }

    fn cleanup_users(&self, store: &mut MetricStore, now: DateTime<Utc>) -> usize {
        let stale: Vec<String> = store
            .behaviors()
            .filter(|b| {
                // Activity stamped in the future counts as fresh
                (now - b.last_active_at)
                    .to_std()
                    .map(|idle| idle > self.inactive_after)
                    .unwrap_or(false)
            })
            .map(|b| b.user_id.clone())
            .collect();

        stale.iter().filter(|id| store.remove_user(id)).count()
    }

    fn cleanup_content(&self, store: &mut MetricStore) -> usize {
        let stale: Vec<String> = store
            .contents()
            .filter(|c| c.recency_score < self.min_recency)
            .map(|c| c.content_id.clone())
            .collect();

        stale.iter().filter(|id| store.remove_content(id)).count()
    }

    /// Drop the stalest content until the store is back under the cap
    fn evict_overflow(&self, store: &mut MetricStore) -> usize {
        let overflow = store.content_count().saturating_sub(self.max_content);
        if overflow == 0 {
            return 0;
        }

        let mut by_recency: Vec<(f64, String)> = store
            .contents()
            .map(|c| (c.recency_score, c.content_id.clone()))
            .collect();
        by_recency.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        by_recency
            .into_iter()
            .take(overflow)
            .filter(|(_, id)| store.remove_content(id))
            .count()
    }

    fn tune_weights(&self, store: &MetricStore, weights: &mut ScoringWeights) -> bool {
        let performance = AlgorithmPerformance::from_store(store, weights);
        let Some(proposed) = self.tuner.tune(weights, &performance) else {
            return false;
        };

        match proposed.normalized() {
            Some(normalized) if normalized != *weights => {
                info!(?normalized, "Scoring weights retuned");
                *weights = normalized;
                true
            }
            Some(_) => false,
            None => {
                warn!(?proposed, "Rejected invalid weight proposal");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::recorder::{Interaction, InteractionRecorder};
    use crate::ranking::store::InteractionKind;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_inactive_users_removed() {
        let mut store = MetricStore::new();
        let rec = InteractionRecorder::new(&config());
        let now = Utc::now();

        rec.track(
            &mut store,
            &Interaction::new("old", "c1", InteractionKind::Like),
            now - chrono::Duration::days(31),
        );
        rec.track(&mut store, &Interaction::new("fresh", "c1", InteractionKind::Like), now);

        let mut weights = ScoringWeights::default();
        let report = Optimizer::new(&config()).run(&mut store, &mut weights, now);

        assert_eq!(report.users_removed, 1);
        assert!(store.behavior("old").is_none());
        assert!(store.history("old").is_none());
        assert!(store.behavior("fresh").is_some());
    }

    #[test]
    fn test_decayed_content_removed() {
        let mut store = MetricStore::new();
        let rec = InteractionRecorder::new(&config());
        let now = Utc::now();

        // 72h half-life: 0.1 is crossed after ~10 days
        rec.register_content(&mut store, "ancient", &[], Some(now - chrono::Duration::days(11)), now);
        rec.register_content(&mut store, "recent", &[], Some(now - chrono::Duration::days(9)), now);

        let mut weights = ScoringWeights::default();
        let report = Optimizer::new(&config()).run(&mut store, &mut weights, now);

        assert_eq!(report.content_removed, 1);
        assert!(store.content("ancient").is_none());
        assert!(store.content("recent").is_some());
    }

    #[test]
    fn test_recompute_uses_current_time() {
        let mut store = MetricStore::new();
        let rec = InteractionRecorder::new(&config());
        let then = Utc::now();
        rec.track(&mut store, &Interaction::new("u1", "c1", InteractionKind::View), then);
        assert_eq!(store.content("c1").unwrap().recency_score, 1.0);

        let later = then + chrono::Duration::hours(72);
        let (recomputed, failures) = Optimizer::new(&config()).refresh(&mut store, later);
        assert_eq!((recomputed, failures), (1, 0));
        assert!((store.content("c1").unwrap().recency_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_failed_record_does_not_abort_sweep() {
        let mut store = MetricStore::new();
        let now = Utc::now();
        let mut cfg = config();
        let rec = InteractionRecorder::new(&cfg);

        rec.register_content(&mut store, "brand-new", &[], Some(now), now);
        rec.register_content(&mut store, "older", &[], Some(now - chrono::Duration::hours(1)), now);

        // zero half-life makes zero-age recency undefined
        cfg.recency_half_life = Duration::ZERO;
        let (recomputed, failures) = Optimizer::new(&cfg).refresh(&mut store, now);

        assert_eq!(recomputed, 1);
        assert_eq!(failures, 1);
        assert_eq!(store.content("older").unwrap().recency_score, 0.0);
        assert_eq!(store.content("brand-new").unwrap().recency_score, 1.0);
    }

    #[test]
    fn test_overflow_evicts_stalest() {
        let mut store = MetricStore::new();
        let mut cfg = config();
        cfg.max_content = 2;
        let rec = InteractionRecorder::new(&cfg);
        let now = Utc::now();

        for (id, hours) in [("a", 1), ("b", 5), ("c", 2)] {
            rec.register_content(&mut store, id, &[], Some(now - chrono::Duration::hours(hours)), now);
        }

        let mut weights = ScoringWeights::default();
        let report = Optimizer::new(&cfg).run(&mut store, &mut weights, now);
        assert_eq!(report.content_evicted, 1);
        assert!(store.content("b").is_none());
        assert_eq!(store.content_count(), 2);
    }

    struct FavorRecency;

    impl WeightTuner for FavorRecency {
        fn tune(&self, current: &ScoringWeights, _: &AlgorithmPerformance) -> Option<ScoringWeights> {
            Some(ScoringWeights {
                recency: current.recency * 2.0,
                ..*current
            })
        }
    }

    struct Broken;

    impl WeightTuner for Broken {
        fn tune(&self, current: &ScoringWeights, _: &AlgorithmPerformance) -> Option<ScoringWeights> {
            Some(ScoringWeights {
                engagement: -1.0,
                ..*current
            })
        }
    }

    #[test]
    fn test_static_weights_unchanged() {
        let mut store = MetricStore::new();
        let mut weights = ScoringWeights::default();
        let report = Optimizer::new(&config()).run(&mut store, &mut weights, Utc::now());
        assert!(!report.weights_changed);
        assert_eq!(weights, ScoringWeights::default());
    }

    #[test]
    fn test_tuned_weights_stay_normalized() {
        let mut store = MetricStore::new();
        let mut weights = ScoringWeights::default();
        let optimizer = Optimizer::new(&config()).with_tuner(Arc::new(FavorRecency));

        let report = optimizer.run(&mut store, &mut weights, Utc::now());
        assert!(report.weights_changed);
        assert!(weights.is_normalized());
        assert!(weights.recency > ScoringWeights::default().recency);
    }

    #[test]
    fn test_invalid_tuning_rejected() {
        let mut store = MetricStore::new();
        let mut weights = ScoringWeights::default();
        let optimizer = Optimizer::new(&config()).with_tuner(Arc::new(Broken));

        let report = optimizer.run(&mut store, &mut weights, Utc::now());
        assert!(!report.weights_changed);
        assert_eq!(weights, ScoringWeights::default());
    }
}
