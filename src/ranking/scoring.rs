//! Scoring Engine
//!
//! Pure functions that turn counts and timestamps into bounded ranking
//! signals, and combine them into a per-user relevance score or a global
//! trending score.
//!
//! ## Relevance
//!
//! ```text
//! score = w_watch·min(watch_s, 1) + w_eng·engagement + w_rec·recency
//!       + w_vir·virality + w_pers·personalization + w_div·diversity
//! ```
//!
//! ## Trending
//!
//! ```text
//! trending = views·0.3 + engagement·0.3 + virality·0.2 + recency·0.2
//! ```

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use super::store::{ContentMetric, UserBehavior};
use crate::error::{Error, Result};

/// Personalization used when a user has no behavior record yet
pub const COLD_START_PERSONALIZATION: f64 = 0.5;

/// Lower bound of the diversity term
pub const DIVERSITY_FLOOR: f64 = 0.7;

/// Width of the diversity band above [`DIVERSITY_FLOOR`]
pub const DIVERSITY_SPAN: f64 = 0.3;

/// Relevance weights. Always sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringWeights {
    pub watch_time: f64,
    pub engagement: f64,
    pub recency: f64,
    pub virality: f64,
    pub personalization: f64,
    pub diversity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            watch_time: 0.25,
            engagement: 0.20,
            recency: 0.15,
            virality: 0.15,
            personalization: 0.15,
            diversity: 0.10,
        }
    }
}

impl ScoringWeights {
    fn as_array(&self) -> [f64; 6] {
        [
            self.watch_time,
            self.engagement,
            self.recency,
            self.virality,
            self.personalization,
            self.diversity,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Rescale so the weights sum to 1.0.
    ///
    /// Returns `None` when any weight is negative or non-finite, or when all
    /// weights are zero.
    pub fn normalized(&self) -> Option<Self> {
        let values = self.as_array();
        if values.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(Self {
            watch_time: self.watch_time / total,
            engagement: self.engagement / total,
            recency: self.recency / total,
            virality: self.virality / total,
            personalization: self.personalization / total,
            diversity: self.diversity / total,
        })
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() < 1e-9 && self.as_array().iter().all(|w| *w >= 0.0)
    }
}

// ---- Content signals ----

/// (likes + shares + comments) / max(views, 1)
pub fn engagement_rate(metric: &ContentMetric) -> f64 {
    let engaged = metric
        .likes
        .saturating_add(metric.shares)
        .saturating_add(metric.comments);
    engaged as f64 / metric.views.max(1) as f64
}

/// Share rate and engagement blended, clamped to [0, 1]
pub fn virality_score(metric: &ContentMetric) -> f64 {
    let share_rate = metric.shares as f64 / metric.views.max(1) as f64;
    (share_rate * 0.4 + engagement_rate(metric) * 0.6).clamp(0.0, 1.0)
}

/// Fraction of views that ended in a skip, clamped to [0, 1]
pub fn skip_rate(metric: &ContentMetric) -> f64 {
    (metric.skips as f64 / metric.views.max(1) as f64).min(1.0)
}

/// Exponential half-life decay from creation time.
///
/// 1.0 at creation, 0.5 after one half-life. Content stamped in the future is
/// treated as brand new.
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>, half_life: Duration) -> f64 {
    let age_secs = (now - created_at).num_milliseconds().max(0) as f64 / 1000.0;
    0.5_f64.powf(age_secs / half_life.as_secs_f64())
}

/// Recompute every derived field of a metric from its counts.
///
/// All four values are computed first and written together, so a failure
/// leaves the previous consistent set in place.
pub fn refresh_derived(
    metric: &mut ContentMetric,
    now: DateTime<Utc>,
    half_life: Duration,
) -> Result<()> {
    let engagement = engagement_rate(metric);
    let virality = virality_score(metric);
    let skips = skip_rate(metric);
    let recency = recency_score(metric.created_at, now, half_life);

    for (field, value) in [
        ("engagementRate", engagement),
        ("viralityScore", virality),
        ("skipRate", skips),
        ("recencyScore", recency),
    ] {
        if !value.is_finite() {
            return Err(Error::InvalidMetric {
                content_id: metric.content_id.clone(),
                field,
            });
        }
    }

    metric.engagement_rate = engagement;
    metric.virality_score = virality;
    metric.skip_rate = skips;
    metric.recency_score = recency;
    Ok(())
}

/// Global popularity, independent of any user
pub fn trending_score(metric: &ContentMetric) -> f64 {
    metric.views as f64 * 0.3
        + metric.engagement_rate * 0.3
        + metric.virality_score * 0.2
        + metric.recency_score * 0.2
}

// ---- User signals ----

/// How engaged the user is overall, saturating at 100 interactions
pub fn personalization_score(behavior: Option<&UserBehavior>) -> f64 {
    match behavior {
        Some(b) => (b.total_interactions() as f64 / 100.0).min(1.0),
        None => COLD_START_PERSONALIZATION,
    }
}

/// Exploration term in [0.7, 1.0].
///
/// Half comes from a jitter seeded by `(seed, user, content)`, half from how
/// many of the content's tags are new to the user (0.5 when untagged). It
/// never looks at the relevance score, so it reorders near-ties without
/// collapsing the ranking. Changing `seed` rotates the exploration.
pub fn diversity_score(
    seed: u64,
    user_id: &str,
    content: &ContentMetric,
    interests: Option<&BTreeSet<String>>,
) -> f64 {
    let mut rng = StdRng::seed_from_u64(jitter_seed(seed, user_id, &content.content_id));
    let jitter: f64 = rng.gen();

    let novelty = if content.tags.is_empty() {
        0.5
    } else {
        let unseen = content
            .tags
            .iter()
            .filter(|t| !interests.map(|i| i.contains(*t)).unwrap_or(false))
            .count();
        unseen as f64 / content.tags.len() as f64
    };

    DIVERSITY_FLOOR + DIVERSITY_SPAN * (0.5 * jitter + 0.5 * novelty)
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over `seed`, user and content, stable across builds and platforms.
/// Fields are separated by 0xff, which never occurs in UTF-8.
fn jitter_seed(seed: u64, user_id: &str, content_id: &str) -> u64 {
    let bytes = seed
        .to_le_bytes()
        .into_iter()
        .chain(std::iter::once(0xff))
        .chain(user_id.bytes())
        .chain(std::iter::once(0xff))
        .chain(content_id.bytes());

    bytes.fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Everything needed to score one candidate for one user
pub struct ScoringContext<'a> {
    pub user_id: &'a str,
    pub behavior: Option<&'a UserBehavior>,
    pub interests: Option<&'a BTreeSet<String>>,
    pub content: &'a ContentMetric,
    pub diversity_seed: u64,
}

/// Per-factor contributions, already weighted
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub watch_time: f64,
    pub engagement: f64,
    pub recency: f64,
    pub virality: f64,
    pub personalization: f64,
    pub diversity: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.watch_time
            + self.engagement
            + self.recency
            + self.virality
            + self.personalization
            + self.diversity
    }
}

/// Weighted relevance of a content item for a user
pub fn relevance_score(ctx: &ScoringContext<'_>, weights: &ScoringWeights) -> ScoreBreakdown {
    let content = ctx.content;
    let watch = (content.watch_time_ms as f64 / 1000.0).min(1.0);

    ScoreBreakdown {
        watch_time: weights.watch_time * watch,
        engagement: weights.engagement * content.engagement_rate.clamp(0.0, 1.0),
        recency: weights.recency * content.recency_score,
        virality: weights.virality * content.virality_score,
        personalization: weights.personalization * personalization_score(ctx.behavior),
        diversity: weights.diversity
            * diversity_score(ctx.diversity_seed, ctx.user_id, content, ctx.interests),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(views: u64, likes: u64, shares: u64, comments: u64) -> ContentMetric {
        let mut m = ContentMetric::new("c1", Utc::now());
        m.views = views;
        m.likes = likes;
        m.shares = shares;
        m.comments = comments;
        m
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!(ScoringWeights::default().is_normalized());
    }

    #[test]
    fn test_normalized_rescales_and_rejects_bad_weights() {
        let doubled = ScoringWeights {
            watch_time: 0.5,
            engagement: 0.4,
            recency: 0.3,
            virality: 0.3,
            personalization: 0.3,
            diversity: 0.2,
        };
        let n = doubled.normalized().unwrap();
        assert!(n.is_normalized());
        assert!((n.watch_time - 0.25).abs() < 1e-12);

        let negative = ScoringWeights {
            diversity: -0.1,
            ..ScoringWeights::default()
        };
        assert!(negative.normalized().is_none());

        let nan = ScoringWeights {
            recency: f64::NAN,
            ..ScoringWeights::default()
        };
        assert!(nan.normalized().is_none());
    }

    #[test]
    fn test_virality_formula() {
        let m = metric(10, 1, 2, 1);
        // share rate 0.2, engagement 0.4
        let expected = 0.2 * 0.4 + 0.4 * 0.6;
        assert!((virality_score(&m) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_inputs_are_clamped() {
        let m = metric(1, 50, 100, 30);
        assert_eq!(virality_score(&m), 1.0);

        let mut skipped = metric(2, 0, 0, 0);
        skipped.skips = 9;
        assert_eq!(skip_rate(&skipped), 1.0);

        let ctx = ScoringContext {
            user_id: "u1",
            behavior: None,
            interests: None,
            content: &{
                let mut m = m.clone();
                refresh_derived(&mut m, Utc::now(), Duration::from_secs(3600)).unwrap();
                m
            },
            diversity_seed: 0,
        };
        let weights = ScoringWeights::default();
        let breakdown = relevance_score(&ctx, &weights);
        assert!(breakdown.engagement <= weights.engagement + 1e-12);
        assert!(breakdown.total() <= 1.0 + 1e-9);
    }

    #[test]
    fn test_zero_views_do_not_divide_by_zero() {
        let m = metric(0, 3, 0, 0);
        assert_eq!(engagement_rate(&m), 3.0);
        assert!(virality_score(&m) <= 1.0);
    }

    #[test]
    fn test_recency_decreases_with_age() {
        let now = Utc::now();
        let half_life = Duration::from_secs(72 * 3600);

        let fresh = recency_score(now, now, half_life);
        let day = recency_score(now - chrono::Duration::days(1), now, half_life);
        let week = recency_score(now - chrono::Duration::days(7), now, half_life);
        let half = recency_score(now - chrono::Duration::hours(72), now, half_life);

        assert_eq!(fresh, 1.0);
        assert!(fresh > day && day > week && week > 0.0);
        assert!((half - 0.5).abs() < 1e-9);
        assert_eq!(recency_score(now + chrono::Duration::hours(1), now, half_life), 1.0);
    }

    #[test]
    fn test_refresh_derived_rejects_non_finite() {
        let now = Utc::now();
        let mut m = ContentMetric::new("c1", now);
        m.views = 4;
        m.likes = 2;
        // zero half-life at zero age is 0/0
        let err = refresh_derived(&mut m, now, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::InvalidMetric { field: "recencyScore", .. }));
        // nothing was written
        assert_eq!(m.engagement_rate, 0.0);
    }

    #[test]
    fn test_personalization_cold_start_and_saturation() {
        assert_eq!(personalization_score(None), COLD_START_PERSONALIZATION);

        let mut b = UserBehavior::new("u1", Utc::now());
        b.likes = 10;
        b.shares = 5;
        b.comments = 5;
        assert!((personalization_score(Some(&b)) - 0.2).abs() < 1e-12);

        b.likes = 500;
        assert_eq!(personalization_score(Some(&b)), 1.0);
    }

    #[test]
    fn test_diversity_bounded_and_deterministic() {
        let mut m = ContentMetric::new("c1", Utc::now());
        m.tags = vec!["jazz".to_string(), "live".to_string()];

        for seed in 0..50 {
            let d = diversity_score(seed, "u1", &m, None);
            assert!((DIVERSITY_FLOOR..=1.0).contains(&d));
            assert_eq!(d, diversity_score(seed, "u1", &m, None));
        }
    }

    #[test]
    fn test_jitter_seed_is_stable() {
        assert_eq!(jitter_seed(7, "u1", "c1"), 0x6bf9_101c_ba37_e612);
        assert_ne!(jitter_seed(7, "u1", "c1"), jitter_seed(7, "u1c", "1"));
        assert_ne!(jitter_seed(7, "u1", "c1"), jitter_seed(8, "u1", "c1"));
    }

    #[test]
    fn test_diversity_prefers_new_topics() {
        let mut m = ContentMetric::new("c1", Utc::now());
        m.tags = vec!["jazz".to_string()];

        let known: BTreeSet<String> = ["jazz".to_string()].into_iter().collect();
        let novel = diversity_score(7, "u1", &m, None);
        let familiar = diversity_score(7, "u1", &m, Some(&known));
        assert!((novel - familiar - DIVERSITY_SPAN * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_trending_formula() {
        let mut m = metric(10, 2, 1, 0);
        refresh_derived(&mut m, Utc::now(), Duration::from_secs(3600)).unwrap();
        let expected = 10.0 * 0.3
            + m.engagement_rate * 0.3
            + m.virality_score * 0.2
            + m.recency_score * 0.2;
        assert!((trending_score(&m) - expected).abs() < 1e-12);
    }
}
