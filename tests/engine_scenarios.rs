use std::sync::Arc;

use chrono::{Duration, Utc};
use socialrank::config::EngineConfig;
use socialrank::{
    Interaction, InteractionKind, LoadOutcome, MemoryAdapter, RankingEngine, SnapshotStore,
};

fn engine() -> RankingEngine {
    RankingEngine::new(EngineConfig::default())
}

#[test]
fn viewed_content_is_excluded_from_feed() {
    let engine = engine();
    engine.track("u1", "c1", InteractionKind::View, Some(5000));
    engine.track("u2", "c2", InteractionKind::View, None);
    engine.track("u2", "c3", InteractionKind::Like, None);

    let feed = engine.personalized_feed("u1", 10);
    assert!(!feed.contains(&"c1".to_string()));
    assert_eq!(feed.len(), 2);
}

#[test]
fn views_from_two_users_accumulate() {
    let engine = engine();
    engine.track("u1", "c1", InteractionKind::View, None);
    engine.track("u2", "c1", InteractionKind::View, None);
    assert_eq!(engine.content_insights("c1").unwrap().views, 2);
}

#[test]
fn three_shares_over_ten_views() {
    let engine = engine();
    for i in 0..10 {
        engine.track(&format!("viewer{}", i), "c1", InteractionKind::View, Some(100));
    }
    for _ in 0..3 {
        engine.track("u1", "c1", InteractionKind::Share, None);
    }
    let metric = engine.content_insights("c1").unwrap();
    assert!((metric.engagement_rate - 0.3).abs() < 1e-12);
}

#[test]
fn oversized_durations_never_break_tracking() {
    let engine = engine();
    engine.track("u1", "c1", InteractionKind::View, Some(u64::MAX));
    engine.track("u1", "c1", InteractionKind::View, Some(u64::MAX));
    engine.track("u2", "c1", InteractionKind::Like, None);

    let metric = engine.content_insights("c1").unwrap();
    assert_eq!(metric.views, 2);
    assert_eq!(metric.likes, 1);
    assert_eq!(metric.watch_time_ms, u64::MAX);
    assert_eq!(engine.user_insights("u1").watch_time_ms, u64::MAX);
    assert!(engine.personalized_feed("u2", 5).is_empty());
}

#[test]
fn trending_on_empty_store_is_empty() {
    assert!(engine().trending(5).is_empty());
}

#[test]
fn empty_store_round_trip_behaves_like_fresh() {
    let snapshots = SnapshotStore::new(Arc::new(MemoryAdapter::new()), "social_algorithm_data");
    let original = engine();
    let restored = engine();
    let outcome = tokio_test::block_on(async {
        snapshots.save(&original).await.unwrap();
        snapshots.load(&restored).await
    });
    assert_eq!(outcome, LoadOutcome::Restored { users: 0, content: 0 });

    let fresh = engine();
    assert_eq!(restored.trending(5), fresh.trending(5));
    assert_eq!(restored.personalized_feed("u1", 5), fresh.personalized_feed("u1", 5));
    assert_eq!(restored.user_insights("u1"), fresh.user_insights("u1"));
    assert_eq!(restored.content_insights("c1"), fresh.content_insights("c1"));
    assert_eq!(restored.algorithm_performance(), fresh.algorithm_performance());
}

#[test]
fn history_never_exceeds_cap() {
    let engine = engine();
    for i in 0..250 {
        engine.track("u1", &format!("c{}", i), InteractionKind::View, Some(10));
        assert!(engine.user_insights("u1").history_length <= 100);
    }
    assert_eq!(engine.user_insights("u1").history_length, 100);

    // evicted content becomes eligible again
    let feed = engine.personalized_feed("u1", 1000);
    assert_eq!(feed.len(), 150);
    assert!(feed.contains(&"c0".to_string()));
    assert!(!feed.contains(&"c249".to_string()));
}

#[test]
fn counts_are_monotonic() {
    let engine = engine();
    let kinds = [
        InteractionKind::View,
        InteractionKind::Like,
        InteractionKind::Share,
        InteractionKind::Comment,
        InteractionKind::Purchase,
        InteractionKind::Skip,
    ];

    let mut previous = (0, 0, 0, 0, 0);
    for i in 0..60 {
        engine.track(&format!("u{}", i % 4), "c1", kinds[i % kinds.len()], Some(20));
        let m = engine.content_insights("c1").unwrap();
        let current = (m.views, m.likes, m.shares, m.comments, m.purchases);
        assert!(current.0 >= previous.0);
        assert!(current.1 >= previous.1);
        assert!(current.2 >= previous.2);
        assert!(current.3 >= previous.3);
        assert!(current.4 >= previous.4);
        let expected = (m.likes + m.shares + m.comments) as f64 / m.views.max(1) as f64;
        assert_eq!(m.engagement_rate, expected);
        previous = current;
    }
}

#[test]
fn feed_is_reproducible_for_fixed_seed() {
    let mut config = EngineConfig::default();
    config.diversity_seed = 1234;
    let a = RankingEngine::new(config.clone());
    let b = RankingEngine::new(config);
    let now = Utc::now();

    for engine in [&a, &b] {
        for i in 0..30 {
            let content = format!("c{:02}", i);
            engine.register_content_at(&content, &[format!("t{}", i % 4)], None, now);
            engine.record_at(&Interaction::new("other", &content, InteractionKind::View), now);
        }
        engine.record_at(&Interaction::new("u1", "c00", InteractionKind::Like), now);
    }

    let feed_a = a.personalized_feed("u1", 10);
    assert_eq!(feed_a, a.personalized_feed("u1", 10));
    assert_eq!(feed_a, b.personalized_feed("u1", 10));
}

#[test]
fn optimizer_sweep_drops_stale_records() {
    let engine = engine();
    let now = Utc::now();
    let long_ago = now - Duration::days(45);

    engine.register_content_at("old", &[], Some(long_ago), long_ago);
    engine.record_at(&Interaction::new("dormant", "old", InteractionKind::Like), long_ago);
    engine.record_at(&Interaction::new("active", "new", InteractionKind::Like), now);

    let report = engine.optimize_at(now);
    assert_eq!(report.users_removed, 1);
    assert_eq!(report.content_removed, 1);
    assert!(engine.content_insights("old").is_none());
    assert!(engine.content_insights("new").is_some());
    assert!(engine.user_insights("dormant").last_active_at.is_none());
    assert!(engine.weights().is_normalized());
}
