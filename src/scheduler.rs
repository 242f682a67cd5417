//! Periodic maintenance: expire overdue subscriptions and send expiry
//! warnings. Owned by the binary; the engine never schedules itself.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::service::LifecycleEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub expired: usize,
    pub warned: usize,
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    engine: Arc<LifecycleEngine>,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(engine: Arc<LifecycleEngine>, period: Duration) -> Self {
        Self {
            engine,
            period: period.max(Duration::from_secs(1)),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.as_ref().is_some_and(|r| !r.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Spawns the loop. The first tick runs immediately. Calling it while
    /// already running does nothing.
    pub fn start(&self) {
        let Ok(mut running) = self.running.lock() else {
            tracing::error!("Scheduler state poisoned, not starting");
            return;
        };
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }

        let token = CancellationToken::new();
        let engine = self.engine.clone();
        let period = self.period;
        let child = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => {
                        Self::tick(&engine).await;
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        });

        tracing::info!("Scheduler started, running every {:?}", period);
        *running = Some(Running { token, handle });
    }

    /// Cancels the loop and waits for an in-flight tick to finish.
    pub async fn stop(&self) {
        let running = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };

        if let Some(Running { token, handle }) = running {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::error!("Scheduler task ended abnormally: {}", e);
            }
        }
    }

    /// One maintenance pass, outside the timer.
    pub async fn run_once(&self) -> TickReport {
        Self::tick(&self.engine).await
    }

    async fn tick(engine: &LifecycleEngine) -> TickReport {
        let mut report = TickReport::default();

        match engine.sweep_expired().await {
            Ok(count) => report.expired = count,
            Err(e) => tracing::error!("Expiration sweep failed: {:?}", e),
        }

        match engine.warn_expiring().await {
            Ok(count) => report.warned = count,
            Err(e) => tracing::error!("Expiry warning scan failed: {:?}", e),
        }

        tracing::debug!(expired = report.expired, warned = report.warned, "Scheduler tick done");
        report
    }
}
