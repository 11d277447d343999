use std::{sync::Arc, time::Duration};

use {
    tokio::{
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

use supportbot_config::HeartbeatConfig;

use crate::registry::SessionRegistry;

/// Periodic liveness scan over every registered session.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_missed: u32,
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::from_config(&HeartbeatConfig::default())
    }
}

impl HeartbeatMonitor {
    pub fn from_config(cfg: &HeartbeatConfig) -> Self {
        Self {
            interval: cfg.interval(),
            timeout: cfg.timeout(),
            max_missed: cfg.max_missed.max(1),
        }
    }

    /// Spawn the scan loop. It stops when `shutdown` is cancelled.
    pub fn spawn(
        self,
        registry: Arc<SessionRegistry>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                timeout_secs = self.timeout.as_secs(),
                max_missed = self.max_missed,
                "heartbeat monitor started"
            );
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can be late yet.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let report = registry
                            .sweep(Instant::now(), self.timeout, self.max_missed)
                            .await;
                        debug!(
                            scanned = report.scanned,
                            late = report.late.len(),
                            evicted = report.evicted.len(),
                            "heartbeat scan"
                        );
                    },
                }
            }
            info!("heartbeat monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::session::TransportHandle};

    #[tokio::test(start_paused = true)]
    async fn evicts_silent_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, _rx) = TransportHandle::channel();
        registry
            .register(1, handle.clone(), "s1".into(), None)
            .await;

        let monitor = HeartbeatMonitor {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
            max_missed: 3,
        };
        let shutdown = CancellationToken::new();
        let task = monitor.spawn(Arc::clone(&registry), shutdown.clone());

        // Late from the scan at t=90 on; the third late scan (t=150) evicts.
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(registry.is_online(1).await);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!registry.is_online(1).await);
        assert!(handle.cancellation().is_cancelled());

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_keep_session_alive() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, _rx) = TransportHandle::channel();
        registry.register(1, handle, "s1".into(), None).await;

        let shutdown = CancellationToken::new();
        let task = HeartbeatMonitor::default().spawn(Arc::clone(&registry), shutdown.clone());

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            assert!(registry.touch_heartbeat("s1").await);
        }
        assert!(registry.is_online(1).await);

        shutdown.cancel();
        task.await.unwrap();
    }
}
