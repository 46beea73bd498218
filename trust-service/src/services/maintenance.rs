use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{PasswordResetManager, SessionManager};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_sessions: u64,
    pub spent_reset_tokens: u64,
}

/// One cleanup pass. A failing step is logged and the other still runs.
pub async fn run_maintenance_pass(
    sessions: &SessionManager,
    resets: &PasswordResetManager,
) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    match sessions.sweep_expired().await {
        Ok(n) => report.expired_sessions = n,
        Err(e) => tracing::error!(error = %e, "Expired session sweep failed"),
    }
    match resets.cleanup().await {
        Ok(n) => report.spent_reset_tokens = n,
        Err(e) => tracing::error!(error = %e, "Reset token cleanup failed"),
    }

    if report != MaintenanceReport::default() {
        tracing::info!(
            expired_sessions = report.expired_sessions,
            spent_reset_tokens = report.spent_reset_tokens,
            "Maintenance pass removed stale rows"
        );
    }
    report
}

/// Periodic cleanup until `shutdown` fires.
pub fn spawn_maintenance(
    sessions: SessionManager,
    resets: PasswordResetManager,
    every: std::time::Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Maintenance task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    run_maintenance_pass(&sessions, &resets).await;
                }
            }
        }
    })
}
