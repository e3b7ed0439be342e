use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use botflow_core::types::{ButtonOption, ListSection};

/// A node in a flow graph.
///
/// The payload is a closed tagged set: authors pick from a small menu of
/// step types, and each type's data is deserialized into its own struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the graph.
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// The closed set of step types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point. Exactly one per graph; advances via the default edge.
    Start,
    /// Send a templated text message and advance.
    Message(MessagePayload),
    /// Ask the user something and suspend until a reply arrives.
    Question(QuestionPayload),
    /// Branch on variables via the `"true"`/`"false"` handles.
    Condition(ConditionPayload),
    /// Outbound HTTP call; routes via `"success"`/`"error"`.
    RestApi(RestPayload),
    /// Dispatch a structured third-party form and suspend for its payload.
    ExternalForm(FormPayload),
    /// Canned stand-in for an integration that is not wired up.
    Stub(StubPayload),
}

impl NodeKind {
    /// Snake-case type name, also used to build step-output keys.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Message(_) => "message",
            Self::Question(_) => "question",
            Self::Condition(_) => "condition",
            Self::RestApi(_) => "rest_api",
            Self::ExternalForm(_) => "external_form",
            Self::Stub(_) => "stub",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message text; `{{path}}` tokens are substituted before sending.
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub body: String,
    /// Variable key the answer is stored under.
    pub variable: String,
    #[serde(default)]
    pub style: QuestionStyle,
}

/// How a question is presented.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionStyle {
    /// Plain text prompt, free-text answer.
    #[default]
    Text,
    /// Up to three tappable buttons; the chosen id doubles as an edge handle.
    Buttons { options: Vec<ButtonOption> },
    /// Sectioned rows; the chosen row id doubles as an edge handle.
    List {
        #[serde(default)]
        button_label: Option<String>,
        sections: Vec<ListSection>,
    },
}

/// Logical combinator for a condition group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    #[default]
    #[serde(alias = "AND", alias = "And")]
    And,
    #[serde(alias = "OR", alias = "Or")]
    Or,
}

/// One `(variable, operator, literal)` comparison.
///
/// The operator is kept as authored text: aliases collapse at evaluation
/// time, and an unrecognized operator evaluates false rather than failing
/// the graph load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub variable: String,
    pub operator: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionPayload {
    #[serde(default)]
    pub combinator: Combinator,
    pub conditions: Vec<ConditionSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        write!(f, "{}", s)
    }
}

/// Request body encoding for a REST step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    #[default]
    Json,
    Multipart,
    #[serde(alias = "urlencoded", alias = "form")]
    FormUrlencoded,
}

/// Narrow an array response to elements whose `field` equals `value`
/// (the value passes through variable substitution first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFilter {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestPayload {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub content_type: BodyEncoding,
    /// Per-step override of the engine's default timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Dotted sub-path to extract from the response body.
    #[serde(default)]
    pub response_path: Option<String>,
    #[serde(default)]
    pub filter: Option<ResponseFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormPayload {
    /// Which third-party form to open.
    pub form_id: String,
    /// Variable key the eventual form payload is stored under.
    pub variable: String,
    /// Opaque data forwarded with the form request.
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubPayload {
    /// What the stub stands in for (e.g. "catalog", "calendar").
    pub label: String,
    /// Canned output stored as the step result.
    #[serde(default)]
    pub output: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_json_shape() {
        let raw = r#"{
            "id": "greet",
            "type": "message",
            "payload": { "body": "Hello {{name}}" }
        }"#;
        let node: Node = serde_json::from_str(raw).unwrap();
        assert_eq!(node.id, "greet");
        match node.kind {
            NodeKind::Message(ref m) => assert_eq!(m.body, "Hello {{name}}"),
            _ => panic!("wrong kind"),
        }
        assert_eq!(node.kind.name(), "message");
    }

    #[test]
    fn test_start_node_has_no_payload() {
        let raw = r#"{ "id": "s", "type": "start" }"#;
        let node: Node = serde_json::from_str(raw).unwrap();
        assert!(matches!(node.kind, NodeKind::Start));
    }

    #[test]
    fn test_question_style_defaults_to_text() {
        let raw = r#"{
            "id": "q",
            "type": "question",
            "payload": { "body": "Name?", "variable": "name" }
        }"#;
        let node: Node = serde_json::from_str(raw).unwrap();
        match node.kind {
            NodeKind::Question(ref q) => assert!(matches!(q.style, QuestionStyle::Text)),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn test_combinator_aliases() {
        assert_eq!(
            serde_json::from_str::<Combinator>("\"AND\"").unwrap(),
            Combinator::And
        );
        assert_eq!(
            serde_json::from_str::<Combinator>("\"or\"").unwrap(),
            Combinator::Or
        );
    }

    #[test]
    fn test_rest_payload_defaults() {
        let raw = r#"{ "url": "https://api.example.com/items" }"#;
        let rest: RestPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(rest.method, HttpMethod::Get);
        assert_eq!(rest.content_type, BodyEncoding::Json);
        assert!(rest.timeout_secs.is_none());
        assert!(rest.headers.is_empty());
    }
}
