use std::sync::Mutex;

use futures::future::BoxFuture;

use botflow_core::error::Result;
use botflow_core::traits::MessageSink;
use botflow_core::types::OutboundMessage;

/// Records every message instead of transmitting it.
///
/// This is the simulation collaborator: the test executor is the real
/// interpreter wired to this sink, so assertions run against exactly what
/// a live recipient would have received.
#[derive(Default)]
pub struct RecordingSink {
    log: Mutex<Vec<(String, OutboundMessage)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.log.lock().expect("recording log poisoned").clone()
    }

    /// Drain the log, returning what was recorded.
    pub fn take(&self) -> Vec<(String, OutboundMessage)> {
        std::mem::take(&mut *self.log.lock().expect("recording log poisoned"))
    }
}

impl MessageSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, recipient: &str, message: &OutboundMessage) -> BoxFuture<'_, Result<()>> {
        let entry = (recipient.to_string(), message.clone());
        Box::pin(async move {
            self.log.lock().expect("recording log poisoned").push(entry);
            Ok(())
        })
    }
}
