//! Background cleanup and autosave

use super::DialogueManager;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A running maintenance task and the token that stops it
#[derive(Debug)]
pub(super) struct MaintenanceHandle {
    pub token: CancellationToken,
    pub join: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Run cleanup and autosave every `period` until cancelled or until the
    /// manager is dropped.
    pub fn spawn(manager: Weak<DialogueManager>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => break,

                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.run_maintenance().await;
                    }
                }
            }
            tracing::info!("Dialogue maintenance task stopped");
        });
        tracing::info!(period_secs = period.as_secs(), "Dialogue maintenance task started");
        Self { token, join }
    }

    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Maintenance task panicked");
        }
    }
}

impl DialogueManager {
    pub(super) async fn run_maintenance(&self) {
        let swept = self.cleanup_inactive_conversations().await;
        if swept > 0 {
            tracing::info!(count = swept, "Swept idle conversations");
        }
        if let Err(e) = self.autosave().await {
            tracing::error!(error = %e, "Autosave failed");
        }
    }
}
