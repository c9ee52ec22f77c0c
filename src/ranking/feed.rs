//! Feed Composer
//!
//! Ranks content for a user (personalized feed) or globally (trending).
//! Candidates already in the user's history are never returned. Ordering is
//! score descending with content id ascending as the tie-break, so identical
//! inputs always produce identical feeds.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

use super::metrics::PerformanceTimer;
use super::scoring::{self, ScoreBreakdown, ScoringContext, ScoringWeights};
use super::store::{ContentMetric, MetricStore};

/// Below this many candidates sequential scoring beats rayon's overhead
const PARALLEL_THRESHOLD: usize = 512;

/// A ranked content item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredContent {
    pub content_id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

#[derive(Debug, Clone)]
pub struct FeedComposer {
    diversity_seed: u64,
    slow_threshold: Duration,
}

impl FeedComposer {
    pub fn new(diversity_seed: u64, slow_threshold: Duration) -> Self {
        Self {
            diversity_seed,
            slow_threshold,
        }
    }

    /// Top `limit` unseen content for a user
    pub fn personalized_feed(
        &self,
        store: &MetricStore,
        weights: &ScoringWeights,
        user_id: &str,
        limit: usize,
    ) -> Vec<ScoredContent> {
        let timer = PerformanceTimer::new("personalized_feed");
        if limit == 0 {
            return Vec::new();
        }

        let seen: HashSet<&str> = store
            .history(user_id)
            .map(|h| h.iter().map(String::as_str).collect())
            .unwrap_or_default();
        let candidates: Vec<&ContentMetric> = store
            .contents()
            .filter(|c| !seen.contains(c.content_id.as_str()))
            .collect();

        let behavior = store.behavior(user_id);
        let interests = store.interests(user_id);
        let score_one = |content: &ContentMetric| {
            let ctx = ScoringContext {
                user_id,
                behavior,
                interests,
                content,
                diversity_seed: self.diversity_seed,
            };
            let breakdown = scoring::relevance_score(&ctx, weights);
            ScoredContent {
                content_id: content.content_id.clone(),
                score: breakdown.total(),
                breakdown: Some(breakdown),
            }
        };

        let scored: Vec<ScoredContent> = if candidates.len() >= PARALLEL_THRESHOLD {
            candidates.into_par_iter().map(score_one).collect()
        } else {
            candidates.into_iter().map(score_one).collect()
        };

        let ranked = rank(scored, limit);
        timer.log_if_slow(self.slow_threshold);
        ranked
    }

    /// Top `limit` content by global trending score
    pub fn trending(&self, store: &MetricStore, limit: usize) -> Vec<ScoredContent> {
        let _timer = PerformanceTimer::new("trending");
        if limit == 0 {
            return Vec::new();
        }

        let scored = store
            .contents()
            .map(|content| ScoredContent {
                content_id: content.content_id.clone(),
                score: scoring::trending_score(content),
                breakdown: None,
            })
            .collect();

        rank(scored, limit)
    }
}

/// Sort by score descending, then id ascending, and keep the top `limit`
fn rank(mut scored: Vec<ScoredContent>, limit: usize) -> Vec<ScoredContent> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.content_id.cmp(&b.content_id))
    });
    scored.truncate(limit);
    scored
}
