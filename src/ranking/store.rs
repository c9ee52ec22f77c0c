//! Metric Store
//!
//! Owns the four keyed maps the ranking engine works from: per-user behavior,
//! per-content metrics, per-user interest tags and per-user recent history.
//! Only the recorder and the optimizer mutate it; everything else reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::error::Error;

/// Interaction kinds we track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Like,
    Share,
    Comment,
    Purchase,
    Skip,
}

impl InteractionKind {
    /// Whether this interaction feeds the user's interest profile
    pub fn grows_interests(self) -> bool {
        !matches!(self, InteractionKind::Skip)
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionKind::View => write!(f, "view"),
            InteractionKind::Like => write!(f, "like"),
            InteractionKind::Share => write!(f, "share"),
            InteractionKind::Comment => write!(f, "comment"),
            InteractionKind::Purchase => write!(f, "purchase"),
            InteractionKind::Skip => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for InteractionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(InteractionKind::View),
            "like" => Ok(InteractionKind::Like),
            "share" => Ok(InteractionKind::Share),
            "comment" => Ok(InteractionKind::Comment),
            "purchase" => Ok(InteractionKind::Purchase),
            "skip" => Ok(InteractionKind::Skip),
            other => Err(Error::bad_request(format!(
                "unknown interaction kind '{}'",
                other
            ))),
        }
    }
}

/// Cumulative behavior of a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBehavior {
    pub user_id: String,
    pub watch_time_ms: u64,
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
    pub purchases: u64,
    pub skips: u64,
    /// Reserved: not derivable from counts alone
    #[serde(default)]
    pub completion_rate: f64,
    /// Reserved: filled in by session-aware callers
    #[serde(default)]
    pub session_duration_ms: u64,
    pub last_active_at: DateTime<Utc>,
}

impl UserBehavior {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            watch_time_ms: 0,
            likes: 0,
            shares: 0,
            comments: 0,
            purchases: 0,
            skips: 0,
            completion_rate: 0.0,
            session_duration_ms: 0,
            last_active_at: now,
        }
    }

    /// Likes, shares and comments combined
    pub fn total_interactions(&self) -> u64 {
        self.likes
            .saturating_add(self.shares)
            .saturating_add(self.comments)
    }
}

/// Counts and derived quality signals for a single content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetric {
    pub content_id: String,
    pub views: u64,
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
    pub purchases: u64,
    pub skips: u64,
    pub watch_time_ms: u64,

    // Derived, always recomputed together
    pub skip_rate: f64,
    pub engagement_rate: f64,
    pub virality_score: f64,
    pub recency_score: f64,

    /// Topic tags supplied at registration
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentMetric {
    pub fn new(content_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            content_id: content_id.into(),
            views: 0,
            likes: 0,
            shares: 0,
            comments: 0,
            purchases: 0,
            skips: 0,
            watch_time_ms: 0,
            skip_rate: 0.0,
            engagement_rate: 0.0,
            virality_score: 0.0,
            recency_score: 1.0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge tags, keeping first-seen order and dropping duplicates
    pub fn merge_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = normalize_tag(tag.into());
            if !tag.is_empty() && !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }
}

/// Tags are compared case-insensitively and without surrounding whitespace
pub fn normalize_tag(tag: String) -> String {
    tag.trim().to_lowercase()
}

/// In-memory owner of all ranking state
#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    behaviors: HashMap<String, UserBehavior>,
    content: HashMap<String, ContentMetric>,
    interests: HashMap<String, BTreeSet<String>>,
    // Most-recent first
    history: HashMap<String, VecDeque<String>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Reads ----

    pub fn behavior(&self, user_id: &str) -> Option<&UserBehavior> {
        self.behaviors.get(user_id)
    }

    pub fn content(&self, content_id: &str) -> Option<&ContentMetric> {
        self.content.get(content_id)
    }

    pub fn interests(&self, user_id: &str) -> Option<&BTreeSet<String>> {
        self.interests.get(user_id)
    }

    pub fn history(&self, user_id: &str) -> Option<&VecDeque<String>> {
        self.history.get(user_id)
    }

    /// Whether the user has already been shown or interacted with the content
    pub fn has_seen(&self, user_id: &str, content_id: &str) -> bool {
        self.history
            .get(user_id)
            .map(|h| h.iter().any(|c| c == content_id))
            .unwrap_or(false)
    }

    pub fn user_count(&self) -> usize {
        self.behaviors.len()
    }

    pub fn content_count(&self) -> usize {
        self.content.len()
    }

    pub fn behaviors(&self) -> impl Iterator<Item = &UserBehavior> {
        self.behaviors.values()
    }

    pub fn contents(&self) -> impl Iterator<Item = &ContentMetric> {
        self.content.values()
    }

    pub fn all_interests(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.interests.iter()
    }

    pub fn all_history(&self) -> impl Iterator<Item = (&String, &VecDeque<String>)> {
        self.history.iter()
    }

    // ---- Bounded mutation ----

    /// Get or create the behavior record for a user
    pub(crate) fn behavior_entry(&mut self, user_id: &str, now: DateTime<Utc>) -> &mut UserBehavior {
        self.behaviors
            .entry(user_id.to_string())
            .or_insert_with(|| UserBehavior::new(user_id, now))
    }

    /// Get or create the metric record for a content item
    pub(crate) fn content_entry(&mut self, content_id: &str, now: DateTime<Utc>) -> &mut ContentMetric {
        self.content
            .entry(content_id.to_string())
            .or_insert_with(|| ContentMetric::new(content_id, now))
    }

    pub(crate) fn content_mut(&mut self) -> impl Iterator<Item = &mut ContentMetric> {
        self.content.values_mut()
    }

    /// Push a content id to the front of the user's history unless it is
    /// already the most recent entry, evicting the oldest past `cap`.
    pub(crate) fn push_history(&mut self, user_id: &str, content_id: &str, cap: usize) {
        let history = self.history.entry(user_id.to_string()).or_default();
        if history.front().map(String::as_str) != Some(content_id) {
            history.push_front(content_id.to_string());
        }
        history.truncate(cap);
        debug_assert!(history.len() <= cap);
    }

    /// Add tags to the user's interests without exceeding `cap`.
    /// Returns the number of tags added.
    pub(crate) fn add_interests<'a, I>(&mut self, user_id: &str, tags: I, cap: usize) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let interests = self.interests.entry(user_id.to_string()).or_default();
        let mut added = 0;
        for tag in tags {
            if interests.len() >= cap {
                break;
            }
            if interests.insert(tag.clone()) {
                added += 1;
            }
        }
        added
    }

    /// Drop every record for a user
    pub(crate) fn remove_user(&mut self, user_id: &str) -> bool {
        self.interests.remove(user_id);
        self.history.remove(user_id);
        self.behaviors.remove(user_id).is_some()
    }

    pub(crate) fn remove_content(&mut self, content_id: &str) -> bool {
        self.content.remove(content_id).is_some()
    }

    // ---- Bulk restore ----

    pub(crate) fn insert_behavior(&mut self, behavior: UserBehavior) {
        self.behaviors.insert(behavior.user_id.clone(), behavior);
    }

    pub(crate) fn insert_content(&mut self, metric: ContentMetric) {
        self.content.insert(metric.content_id.clone(), metric);
    }

    pub(crate) fn insert_interests(&mut self, user_id: String, interests: BTreeSet<String>) {
        self.interests.insert(user_id, interests);
    }

    pub(crate) fn insert_history(&mut self, user_id: String, history: VecDeque<String>) {
        self.history.insert(user_id, history);
    }
}
