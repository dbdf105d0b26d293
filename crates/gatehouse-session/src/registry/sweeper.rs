//! Background eviction of sessions whose heartbeat went silent.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use gatehouse_core::config::SessionConfig;

use super::store::SessionRegistry;

/// Periodically evicts stale sessions from the registry.
#[derive(Debug, Clone)]
pub struct HeartbeatSweeper {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatSweeper {
    /// Creates a sweeper from session configuration.
    pub fn new(registry: Arc<SessionRegistry>, config: &SessionConfig) -> Self {
        Self {
            registry,
            interval: config.sweep_interval(),
            timeout: config.heartbeat_timeout(),
        }
    }

    /// Runs one pass: snapshot stale IDs under the read lock, then evict
    /// each one after re-checking it under the write lock.
    pub async fn sweep_once(&self) -> usize {
        let stale = self.registry.stale_sessions(self.timeout).await;
        let mut evicted = 0;
        for session_id in stale {
            if self
                .registry
                .evict_if_stale(session_id, self.timeout)
                .await
                .is_some()
            {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "Heartbeat sweep evicted stale sessions");
        }
        evicted
    }

    /// Sweeps every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.as_secs(),
            "Heartbeat sweeper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        debug!("Heartbeat sweeper stopped");
    }
}
