use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one execution context (one run of one flow).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a flow definition.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl FlowId {
    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initializing,
    Running,
    /// Suspended on a question, waiting for a user reply.
    WaitingInput,
    /// Suspended on an external form, waiting for its payload.
    WaitingFlow,
    Completed,
    Stopped,
    Error,
    LoopDetected,
    Expired,
}

impl RunStatus {
    /// Terminal states accept no further stepping.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Stopped | Self::Error | Self::LoopDetected | Self::Expired
        )
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingInput | Self::WaitingFlow)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::WaitingInput => "waiting_input",
            Self::WaitingFlow => "waiting_flow",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::LoopDetected => "loop_detected",
            Self::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// Why a context reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The step chain ran out of outgoing edges.
    Finished,
    /// An external stop request.
    Stopped,
    /// The loop guard tripped a ceiling.
    LoopDetected,
    /// An unhandled error inside a step handler.
    StepError,
    /// The expiry sweep deactivated the context.
    Timeout,
}

impl std::fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Finished => "finished",
            Self::Stopped => "stopped",
            Self::LoopDetected => "loop_detected",
            Self::StepError => "step_error",
            Self::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// What kind of external input a suspended context is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    /// A user reply to a question (text, button, or list row).
    Input,
    /// A structured payload from an external form.
    Flow,
}

/// Marker for a suspended context: where the eventual response lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Awaiting {
    /// Variable key the response value is stored under.
    pub variable: String,
    pub kind: WaitKind,
}

/// Per-run loop-guard ceilings, configurable at run start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: u32,
    #[serde(default = "default_max_total_steps")]
    pub max_total_steps: u32,
}

fn default_max_node_visits() -> u32 {
    10
}

fn default_max_total_steps() -> u32 {
    100
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_node_visits: default_max_node_visits(),
            max_total_steps: default_max_total_steps(),
        }
    }
}

/// Loop-guard counters, persisted with the context so a restart cannot
/// reset a runaway flow's budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopState {
    #[serde(default)]
    pub visits: HashMap<String, u32>,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub tripped: bool,
    #[serde(default)]
    pub diagnostic: Option<String>,
}

/// The durable per-run record of where a flow's execution stands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: ContextId,
    pub flow_id: FlowId,
    /// Where outbound messages for this run are delivered.
    pub recipient: String,
    /// None means the run has ended.
    pub current_node: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Append-only execution trail. Never truncated.
    #[serde(default)]
    pub history: Vec<String>,
    pub status: RunStatus,
    /// Orthogonal to `status`: while set, new input is rejected.
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub awaiting: Option<Awaiting>,
    #[serde(default)]
    pub completion_reason: Option<CompletionReason>,
    #[serde(default)]
    pub loop_state: LoopState,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Context {
    pub fn new(flow_id: FlowId, recipient: impl Into<String>, start_node: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ContextId::new(),
            flow_id,
            recipient: recipient.into(),
            current_node: Some(start_node.into()),
            variables: HashMap::new(),
            history: Vec::new(),
            status: RunStatus::Initializing,
            paused: false,
            awaiting: None,
            completion_reason: None,
            loop_state: LoopState::default(),
            limits: Limits::default(),
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Store a variable, returning the previous value if any.
    pub fn set_variable(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.variables.insert(key.into(), value)
    }

    /// Move the context to a terminal state. Clears the current node and
    /// any awaiting marker; sets the completion reason.
    pub fn finish(&mut self, status: RunStatus, reason: CompletionReason) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completion_reason = Some(reason);
        self.current_node = None;
        self.awaiting = None;
        self.touch();
    }
}

/// A response submitted against a suspended context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseInput {
    /// Free text typed by the user.
    Text { text: String },
    /// A chosen button, by its id.
    Button { id: String },
    /// A chosen list row, by its id.
    ListRow { id: String },
    /// A structured payload delivered by an external form.
    Form { payload: serde_json::Value },
}

impl ResponseInput {
    /// The wait kind this input satisfies.
    pub fn wait_kind(&self) -> WaitKind {
        match self {
            Self::Text { .. } | Self::Button { .. } | Self::ListRow { .. } => WaitKind::Input,
            Self::Form { .. } => WaitKind::Flow,
        }
    }

    /// Button and row ids double as edge handles for routing.
    pub fn handle_hint(&self) -> Option<&str> {
        match self {
            Self::Button { id } | Self::ListRow { id } => Some(id),
            _ => None,
        }
    }

    /// The value stored into the remembered variable.
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Self::Text { text } => serde_json::Value::String(text),
            Self::Button { id } | Self::ListRow { id } => serde_json::Value::String(id),
            Self::Form { payload } => payload,
        }
    }
}

/// Most chat transports cap interactive messages at three buttons with
/// short labels; list rows carry slightly longer titles and descriptions.
pub const MAX_BUTTONS: usize = 3;
pub const MAX_BUTTON_LABEL: usize = 20;
pub const MAX_ROW_TITLE: usize = 24;
pub const MAX_ROW_DESCRIPTION: usize = 72;

/// One tappable button option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonOption {
    pub id: String,
    pub label: String,
}

/// One row inside a list section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A titled group of list rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Outbound content handed to a message sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        body: String,
    },
    Buttons {
        body: String,
        buttons: Vec<ButtonOption>,
    },
    List {
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button_label: Option<String>,
        sections: Vec<ListSection>,
    },
    /// A request to open a structured third-party form.
    Form {
        form_id: String,
        payload: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::LoopDetected.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::WaitingInput.is_terminal());
    }

    #[test]
    fn test_response_input_routing() {
        let button = ResponseInput::Button { id: "yes".into() };
        assert_eq!(button.handle_hint(), Some("yes"));
        assert_eq!(button.wait_kind(), WaitKind::Input);

        let text = ResponseInput::Text { text: "hi".into() };
        assert_eq!(text.handle_hint(), None);

        let form = ResponseInput::Form {
            payload: serde_json::json!({"a": 1}),
        };
        assert_eq!(form.wait_kind(), WaitKind::Flow);
        assert_eq!(form.into_value(), serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_context_finish_clears_position() {
        let mut ctx = Context::new(FlowId::from_string("f1"), "user:1", "start");
        ctx.awaiting = Some(Awaiting {
            variable: "name".into(),
            kind: WaitKind::Input,
        });
        ctx.finish(RunStatus::Stopped, CompletionReason::Stopped);

        assert_eq!(ctx.status, RunStatus::Stopped);
        assert_eq!(ctx.completion_reason, Some(CompletionReason::Stopped));
        assert!(ctx.current_node.is_none());
        assert!(ctx.awaiting.is_none());
    }

    #[test]
    fn test_context_serialization_roundtrip() {
        let mut ctx = Context::new(FlowId::from_string("f1"), "user:1", "start");
        ctx.set_variable("name", serde_json::json!("Ada"));
        ctx.history.push("start".into());

        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: Context = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, ctx.id);
        assert_eq!(parsed.variables.get("name"), Some(&serde_json::json!("Ada")));
        assert_eq!(parsed.history, vec!["start".to_string()]);
        assert_eq!(parsed.status, RunStatus::Initializing);
    }
}
