use crate::types::{CompletionReason, ContextId, WaitKind};

/// Instrumentation event emitted at defined points of a run.
///
/// Delivery is fire-and-forget: the interpreter never waits on or fails
/// because of a subscriber.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A node is about to be dispatched.
    NodeEntered { context: ContextId, node: String },
    /// A node's handler finished (or failed).
    NodeExecuted {
        context: ContextId,
        node: String,
        ok: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    /// The outgoing edge was resolved; `next` is None on normal completion.
    NodeExited {
        context: ContextId,
        node: String,
        next: Option<String>,
    },
    /// The context suspended awaiting external input.
    WaitingForInput {
        context: ContextId,
        node: String,
        kind: WaitKind,
    },
    /// A variable was written.
    VariableChanged {
        context: ContextId,
        key: String,
        old: Option<serde_json::Value>,
        new: serde_json::Value,
        source: String,
    },
    /// An unhandled step error turned the run terminal.
    RunError { context: ContextId, error: String },
    /// The run reached a terminal state.
    RunCompleted {
        context: ContextId,
        reason: CompletionReason,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: FlowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
