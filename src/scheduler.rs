//! Background maintenance tasks
//!
//! Three independent tickers, all stopped by the same shutdown broadcast:
//! - **refresh**: recompute derived content metrics
//! - **optimize**: full optimizer sweep (cleanup, recompute, tuning)
//! - **persist**: save a snapshot
//!
//! The first (immediate) tick of each interval is skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::Error;
use crate::persistence::SnapshotStore;
use crate::ranking::RankingEngine;

/// Spawn all maintenance tasks
pub fn spawn_background_tasks(
    engine: Arc<RankingEngine>,
    snapshots: SnapshotStore,
    config: &SchedulerConfig,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_refresher(engine.clone(), config.refresh_interval, shutdown.subscribe()),
        spawn_optimizer(engine.clone(), config.optimize_interval, shutdown.subscribe()),
        spawn_persister(engine, snapshots, config.persist_interval, shutdown.subscribe()),
    ]
}

/// Spawn the derived-metric refresher
pub fn spawn_refresher(
    engine: Arc<RankingEngine>,
    every: Duration,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    spawn_ticker("refresh", every, shutdown_rx, move || {
        let engine = engine.clone();
        async move {
            // Holds the store write lock while it walks every content record
            match tokio::task::spawn_blocking(move || engine.refresh_metrics()).await {
                Ok((recomputed, failures)) => {
                    debug!(recomputed, failures, "Content metrics refreshed");
                }
                Err(e) => error!("Metric refresh failed: {:?}", Error::internal(e)),
            }
        }
    })
}

/// Spawn the optimizer sweep
pub fn spawn_optimizer(
    engine: Arc<RankingEngine>,
    every: Duration,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    spawn_ticker("optimize", every, shutdown_rx, move || {
        let engine = engine.clone();
        async move {
            // The sweep holds the store lock for its whole duration
            if let Err(e) = tokio::task::spawn_blocking(move || engine.optimize()).await {
                error!("Optimizer sweep failed: {:?}", Error::internal(e));
            }
        }
    })
}

/// Spawn the snapshot persister
pub fn spawn_persister(
    engine: Arc<RankingEngine>,
    snapshots: SnapshotStore,
    every: Duration,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    spawn_ticker("persist", every, shutdown_rx, move || {
        let engine = engine.clone();
        let snapshots = snapshots.clone();
        async move {
            match snapshots.save(&engine).await {
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    warn!("Snapshot save failed, retrying next tick: {}", e);
                }
                Err(e) => error!("Failed to save snapshot: {:?}", e),
            }
        }
    })
}

fn spawn_ticker<F, Fut>(
    name: &'static str,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip first tick (runs immediately otherwise)
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    job().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("{} task shutting down", name);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::persistence::{LoadOutcome, MemoryAdapter};
    use crate::ranking::InteractionKind;

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            optimize_interval: Duration::from_millis(20),
            persist_interval: Duration::from_millis(20),
            refresh_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_persister_saves_and_tasks_stop_on_shutdown() {
        let engine = Arc::new(RankingEngine::new(EngineConfig::default()));
        engine.track("u1", "c1", InteractionKind::Like, None);

        let snapshots = SnapshotStore::new(Arc::new(MemoryAdapter::new()), "sched");
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let handles =
            spawn_background_tasks(engine.clone(), snapshots.clone(), &fast_config(), &shutdown_tx);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = shutdown_tx.send(());

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("task did not stop")
                .expect("task panicked");
        }

        let restored = RankingEngine::new(EngineConfig::default());
        assert_eq!(
            snapshots.load(&restored).await,
            LoadOutcome::Restored { users: 1, content: 1 }
        );
    }

    #[tokio::test]
    async fn test_refresher_decays_recency_off_the_runtime() {
        let config = EngineConfig {
            recency_half_life: Duration::from_millis(10),
            ..EngineConfig::default()
        };
        let engine = Arc::new(RankingEngine::new(config));
        engine.track("u1", "c1", InteractionKind::View, None);
        let fresh = engine.content_insights("c1").unwrap().recency_score;

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let handle = spawn_refresher(engine.clone(), Duration::from_millis(20), shutdown_tx.subscribe());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = shutdown_tx.send(());
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("task did not stop")
            .expect("task panicked");

        let refreshed = engine.content_insights("c1").unwrap().recency_score;
        assert!(refreshed < fresh);
        assert!(refreshed < 0.5);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let engine = Arc::new(RankingEngine::new(EngineConfig::default()));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let handle = spawn_refresher(engine, Duration::from_secs(3600), shutdown_tx.subscribe());

        let _ = shutdown_tx.send(());
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("task did not stop")
            .expect("task panicked");
    }
}
