//! Background task that drives demo expiry.
//!
//! Expiry must happen even when nobody is looking at the UI, so a tokio
//! task calls [`LicenseManager::tick`] once per period.  The task ends on
//! its own when the demo expires or stops running, and can be cancelled
//! at any time.  Dropping the handle aborts it.

use super::manager::{LicenseManager, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug)]
pub struct CountdownTimer {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<TickOutcome>>,
}

impl CountdownTimer {
    /// Spawns the ticking task on the current runtime.
    pub fn spawn(manager: Arc<Mutex<LicenseManager>>, period: Duration) -> Self {
        let (cancel, mut cancelled) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // After a suspension one catch-up tick is enough: the clock is
            // re-read on every tick anyway.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut cancelled => {
                        tracing::debug!("demo countdown timer cancelled");
                        return TickOutcome::Inactive;
                    }
                    _ = interval.tick() => {
                        let outcome = manager.lock().await.tick();
                        match outcome {
                            TickOutcome::Running { .. } => continue,
                            other => {
                                tracing::debug!(?other, "demo countdown timer finished");
                                return other;
                            }
                        }
                    }
                }
            }
        });
        Self {
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the task and waits for it, returning the last outcome seen.
    pub async fn cancel(mut self) -> TickOutcome {
        if let Some(tx) = self.cancel.take() {
            // The task may already have ended on its own.
            let _ = tx.send(());
        }
        self.join_inner().await
    }

    /// Waits for the task to end by itself.
    pub async fn join(mut self) -> TickOutcome {
        self.join_inner().await
    }

    async fn join_inner(&mut self) -> TickOutcome {
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(TickOutcome::Inactive),
            None => TickOutcome::Inactive,
        }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
