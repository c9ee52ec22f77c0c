//! Interaction Recorder
//!
//! Applies a single interaction event to the metric store: bumps counts on the
//! user and content records, recomputes the content's derived fields, appends
//! to the user's history and grows the user's interests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::scoring;
use super::store::{InteractionKind, MetricStore};
use crate::config::EngineConfig;

/// Interaction event for recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub user_id: String,
    pub content_id: String,
    pub kind: InteractionKind,
    /// Only meaningful for views
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl Interaction {
    pub fn new(
        user_id: impl Into<String>,
        content_id: impl Into<String>,
        kind: InteractionKind,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            content_id: content_id.into(),
            kind,
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// What a single `track` call changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackOutcome {
    pub new_user: bool,
    pub new_content: bool,
    pub interests_added: usize,
}

#[derive(Debug, Clone)]
pub struct InteractionRecorder {
    history_cap: usize,
    max_interests: usize,
    half_life: Duration,
}

impl InteractionRecorder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            history_cap: config.history_cap,
            max_interests: config.max_interests,
            half_life: config.recency_half_life,
        }
    }

    /// Apply one interaction. Total: unknown users and content are created.
    pub fn track(
        &self,
        store: &mut MetricStore,
        event: &Interaction,
        now: DateTime<Utc>,
    ) -> TrackOutcome {
        let mut outcome = TrackOutcome {
            new_user: store.behavior(&event.user_id).is_none(),
            new_content: store.content(&event.content_id).is_none(),
            interests_added: 0,
        };

        // 1. User behavior
        let behavior = store.behavior_entry(&event.user_id, now);
        match event.kind {
            InteractionKind::View => {
                behavior.watch_time_ms = behavior
                    .watch_time_ms
                    .saturating_add(event.duration_ms.unwrap_or(0));
            }
            InteractionKind::Like => behavior.likes = behavior.likes.saturating_add(1),
            InteractionKind::Share => behavior.shares = behavior.shares.saturating_add(1),
            InteractionKind::Comment => behavior.comments = behavior.comments.saturating_add(1),
            InteractionKind::Purchase => behavior.purchases = behavior.purchases.saturating_add(1),
            InteractionKind::Skip => behavior.skips = behavior.skips.saturating_add(1),
        }
        behavior.last_active_at = behavior.last_active_at.max(now);

        // 2. Content counts, then derived fields before anyone can read them
        let metric = store.content_entry(&event.content_id, now);
        match event.kind {
            InteractionKind::View => {
                metric.views = metric.views.saturating_add(1);
                metric.watch_time_ms = metric
                    .watch_time_ms
                    .saturating_add(event.duration_ms.unwrap_or(0));
            }
            InteractionKind::Like => metric.likes = metric.likes.saturating_add(1),
            InteractionKind::Share => metric.shares = metric.shares.saturating_add(1),
            InteractionKind::Comment => metric.comments = metric.comments.saturating_add(1),
            InteractionKind::Purchase => metric.purchases = metric.purchases.saturating_add(1),
            InteractionKind::Skip => metric.skips = metric.skips.saturating_add(1),
        }
        metric.updated_at = metric.updated_at.max(now);

        if let Err(e) = scoring::refresh_derived(metric, now, self.half_life) {
            warn!(content_id = %event.content_id, "Failed to refresh derived metrics: {}", e);
        }

        // 3. History
        store.push_history(&event.user_id, &event.content_id, self.history_cap);

        // 4. Interests (best effort)
        if event.kind.grows_interests() {
            outcome.interests_added = self.grow_interests(store, event);
        }

        debug!(
            user_id = %event.user_id,
            content_id = %event.content_id,
            kind = %event.kind,
            "Recorded interaction"
        );

        outcome
    }

    /// Merge the content's tags into the user's interests
    fn grow_interests(&self, store: &mut MetricStore, event: &Interaction) -> usize {
        let tags = match store.content(&event.content_id) {
            Some(metric) if !metric.tags.is_empty() => metric.tags.clone(),
            _ => return 0,
        };
        store.add_interests(&event.user_id, &tags, self.max_interests)
    }

    /// Register catalog data for a content item without counting an interaction
    pub fn register_content(
        &self,
        store: &mut MetricStore,
        content_id: &str,
        tags: &[String],
        created_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let is_new = store.content(content_id).is_none();
        let metric = store.content_entry(content_id, created_at.unwrap_or(now));
        metric.merge_tags(tags.iter().cloned());
        if let Some(created_at) = created_at {
            if created_at < metric.created_at {
                metric.created_at = created_at;
            }
        }

        if let Err(e) = scoring::refresh_derived(metric, now, self.half_life) {
            warn!(content_id = %content_id, "Failed to refresh derived metrics: {}", e);
        }
        is_new
    }
}
