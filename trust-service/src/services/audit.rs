use service_core::utils::SharedClock;
use std::sync::Arc;

use crate::{models::AuditEvent, store::AuditSink};

/// Best-effort audit trail. Write failures go to the log and never reach
/// the operation being audited.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    clock: SharedClock,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, clock: SharedClock) -> Self {
        Self { sink, clock }
    }

    /// Stamp the event with the current time and append it.
    pub async fn record(&self, event: AuditEvent) {
        let event = event.at(self.clock.now());
        if let Err(e) = self.sink.append(&event).await {
            tracing::error!(
                error = %e,
                action = event.action.as_str(),
                status = event.status.as_str(),
                user_id = ?event.user_id,
                "Failed to write audit event"
            );
        }
    }

    /// Fire-and-forget variant for paths that must not wait on the write.
    pub fn record_detached(&self, event: AuditEvent) {
        let recorder = self.clone();
        tokio::spawn(async move {
            recorder.record(event).await;
        });
    }
}
