//! Read-only diagnostic views over the metric store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::ScoringWeights;
use super::store::MetricStore;

/// Per-user diagnostic summary. Zeroed for unknown users.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInsights {
    pub user_id: String,
    pub watch_time_ms: u64,
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
    pub purchases: u64,
    pub completion_rate: f64,
    pub interests: Vec<String>,
    pub history_length: usize,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl UserInsights {
    pub fn from_store(store: &MetricStore, user_id: &str) -> Self {
        let mut insights = Self {
            user_id: user_id.to_string(),
            interests: store
                .interests(user_id)
                .map(|i| i.iter().cloned().collect())
                .unwrap_or_default(),
            history_length: store.history(user_id).map(|h| h.len()).unwrap_or(0),
            ..Self::default()
        };

        if let Some(b) = store.behavior(user_id) {
            insights.watch_time_ms = b.watch_time_ms;
            insights.likes = b.likes;
            insights.shares = b.shares;
            insights.comments = b.comments;
            insights.purchases = b.purchases;
            insights.completion_rate = b.completion_rate;
            insights.last_active_at = Some(b.last_active_at);
        }

        insights
    }
}

/// Engine-wide summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmPerformance {
    pub total_users: usize,
    pub total_content: usize,
    /// Mean engagement rate across all tracked content
    pub avg_engagement: f64,
    pub weights: ScoringWeights,
}

impl AlgorithmPerformance {
    pub fn from_store(store: &MetricStore, weights: &ScoringWeights) -> Self {
        let total_content = store.content_count();
        let avg_engagement = if total_content == 0 {
            0.0
        } else {
            store.contents().map(|c| c.engagement_rate).sum::<f64>() / total_content as f64
        };

        Self {
            total_users: store.user_count(),
            total_content,
            avg_engagement,
            weights: *weights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ranking::recorder::{Interaction, InteractionRecorder};
    use crate::ranking::store::InteractionKind;

    #[test]
    fn test_unknown_user_is_zeroed() {
        let insights = UserInsights::from_store(&MetricStore::new(), "ghost");
        assert_eq!(insights.user_id, "ghost");
        assert_eq!(insights.likes, 0);
        assert_eq!(insights.history_length, 0);
        assert!(insights.interests.is_empty());
        assert!(insights.last_active_at.is_none());
    }

    #[test]
    fn test_performance_averages_engagement() {
        let mut store = MetricStore::new();
        let rec = InteractionRecorder::new(&EngineConfig::default());
        let now = Utc::now();

        rec.track(&mut store, &Interaction::new("u1", "c1", InteractionKind::View), now);
        rec.track(&mut store, &Interaction::new("u1", "c1", InteractionKind::Like), now);
        rec.track(&mut store, &Interaction::new("u2", "c2", InteractionKind::View), now);

        let perf = AlgorithmPerformance::from_store(&store, &ScoringWeights::default());
        assert_eq!(perf.total_users, 2);
        assert_eq!(perf.total_content, 2);
        assert!((perf.avg_engagement - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_performance() {
        let perf = AlgorithmPerformance::from_store(&MetricStore::new(), &ScoringWeights::default());
        assert_eq!(perf.total_content, 0);
        assert_eq!(perf.avg_engagement, 0.0);
    }
}
