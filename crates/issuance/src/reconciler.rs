//! Periodic background sweep over non-terminal receipts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::service::IssuanceService;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    /// Only receipts created within this window are swept. `None` sweeps all.
    pub window: Option<chrono::Duration>,
    /// Name for logging
    pub name: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            window: None,
            name: "reconciler".to_string(),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_window(mut self, window: chrono::Duration) -> Self {
        self.window = Some(window);
        self
    }
}

/// Handle to stop a running reconciler.
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Requests shutdown and waits for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            error!(error = %e, "reconciler task panicked");
        }
    }
}

pub struct Reconciler;

impl Reconciler {
    /// Spawns the sweep loop. The first sweep runs immediately.
    pub fn spawn(service: Arc<IssuanceService>, config: ReconcilerConfig) -> ReconcilerHandle {
        let shutdown = Arc::new(Notify::new());
        let join = tokio::spawn(run(service, config, Arc::clone(&shutdown)));
        ReconcilerHandle { shutdown, join }
    }
}

async fn run(service: Arc<IssuanceService>, config: ReconcilerConfig, shutdown: Arc<Notify>) {
    info!(reconciler = %config.name, interval = ?config.interval, "reconciler started");

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                let created_after = config.window.map(|w| Utc::now() - w);
                match service.process_background_sync(created_after).await {
                    Ok(authorized) => {
                        if authorized > 0 {
                            info!(reconciler = %config.name, authorized, "sweep authorized receipts");
                        }
                    }
                    Err(e) => {
                        error!(reconciler = %config.name, error = %e, "sweep failed");
                    }
                }
            }
        }
    }

    info!(reconciler = %config.name, "reconciler stopped");
}
