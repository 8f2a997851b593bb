use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

impl From<AuditEventEnvelope> for AuditRecord {
    fn from(envelope: AuditEventEnvelope) -> Self {
        AuditRecord {
            id: 0, // assigned by the store
            timestamp: envelope.timestamp,
            event_type: envelope.event.event_type().to_string(),
            case_number: envelope.event.case_number().map(String::from),
            data: envelope.event,
        }
    }
}

/// Background task draining the audit channel into a store.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Consume events until every handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Audit writer started");

        let mut written = 0u64;
        while let Some(envelope) = self.rx.recv().await {
            let record = AuditRecord::from(envelope);
            match self.store.insert(&record) {
                Ok(_) => written += 1,
                Err(e) => tracing::error!(
                    event_type = %record.event_type,
                    "Failed to write audit event: {}",
                    e
                ),
            }
        }

        tracing::info!(written, "Audit writer shutting down");
    }
}

/// Create a handle/writer pair over a bounded channel.
///
/// Spawn the writer with `tokio::spawn(writer.run())` and clone the handle
/// into every component that emits events.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}
