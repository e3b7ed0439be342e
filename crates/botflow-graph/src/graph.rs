use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use botflow_core::error::{FlowError, Result};
use botflow_core::types::{MAX_BUTTONS, MAX_BUTTON_LABEL, MAX_ROW_DESCRIPTION, MAX_ROW_TITLE};

use crate::edge::Edge;
use crate::node::{Node, NodeKind, QuestionStyle};

/// One flow's immutable node/edge definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl FlowGraph {
    /// Build and validate a graph.
    pub fn new(id: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self> {
        let graph = Self {
            id: id.into(),
            name: None,
            nodes,
            edges,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Parse a graph from its JSON definition and validate it.
    pub fn parse(raw: &str) -> Result<Self> {
        let graph: Self =
            serde_json::from_str(raw).map_err(|e| FlowError::Graph(e.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Check structural invariants. Runs once at load time so step
    /// handlers can trust the definition.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(FlowError::Graph(format!("duplicate node id: {}", node.id)));
            }
        }

        let start_count = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Start))
            .count();
        if start_count != 1 {
            return Err(FlowError::Graph(format!(
                "graph must contain exactly one start node, found {}",
                start_count
            )));
        }

        for edge in &self.edges {
            if !seen.contains(edge.source.as_str()) {
                return Err(FlowError::Graph(format!(
                    "edge references unknown source node: {}",
                    edge.source
                )));
            }
            if !seen.contains(edge.target.as_str()) {
                return Err(FlowError::Graph(format!(
                    "edge references unknown target node: {}",
                    edge.target
                )));
            }
        }

        for node in &self.nodes {
            if let NodeKind::Question(q) = &node.kind {
                validate_question(&node.id, &q.style)?;
            }
        }

        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| matches!(n.kind, NodeKind::Start))
    }

    /// Resolve "what comes next" from a node.
    ///
    /// With a handle: the first edge matching it exactly wins; failing
    /// that, the first unconditional edge (no handle or `"default"`).
    /// With no handle: the first outgoing edge. None means this branch of
    /// the step chain ends.
    ///
    /// When several edges satisfy the same `(source, handle)` pair the
    /// first one encountered wins; authoring tools are expected to avoid
    /// producing duplicates.
    pub fn next_node(&self, source: &str, handle: Option<&str>) -> Option<&str> {
        match handle {
            Some(h) => self
                .edges
                .iter()
                .find(|e| e.source == source && e.handle.as_deref() == Some(h))
                .or_else(|| {
                    self.edges
                        .iter()
                        .find(|e| e.source == source && e.is_default())
                })
                .map(|e| e.target.as_str()),
            None => self
                .edges
                .iter()
                .find(|e| e.source == source)
                .map(|e| e.target.as_str()),
        }
    }
}

fn validate_question(node_id: &str, style: &QuestionStyle) -> Result<()> {
    match style {
        QuestionStyle::Text => Ok(()),
        QuestionStyle::Buttons { options } => {
            if options.is_empty() || options.len() > MAX_BUTTONS {
                return Err(FlowError::Graph(format!(
                    "question {}: between 1 and {} buttons required, found {}",
                    node_id,
                    MAX_BUTTONS,
                    options.len()
                )));
            }
            for opt in options {
                if opt.label.chars().count() > MAX_BUTTON_LABEL {
                    return Err(FlowError::Graph(format!(
                        "question {}: button label '{}' exceeds {} characters",
                        node_id, opt.label, MAX_BUTTON_LABEL
                    )));
                }
            }
            let mut ids = HashSet::new();
            for opt in options {
                if !ids.insert(opt.id.as_str()) {
                    return Err(FlowError::Graph(format!(
                        "question {}: duplicate button id '{}'",
                        node_id, opt.id
                    )));
                }
            }
            Ok(())
        }
        QuestionStyle::List { sections, .. } => {
            if sections.is_empty() || sections.iter().all(|s| s.rows.is_empty()) {
                return Err(FlowError::Graph(format!(
                    "question {}: list must contain at least one row",
                    node_id
                )));
            }
            let mut ids = HashSet::new();
            for section in sections {
                for row in &section.rows {
                    if row.title.chars().count() > MAX_ROW_TITLE {
                        return Err(FlowError::Graph(format!(
                            "question {}: row title '{}' exceeds {} characters",
                            node_id, row.title, MAX_ROW_TITLE
                        )));
                    }
                    if let Some(desc) = &row.description {
                        if desc.chars().count() > MAX_ROW_DESCRIPTION {
                            return Err(FlowError::Graph(format!(
                                "question {}: row description exceeds {} characters",
                                node_id, MAX_ROW_DESCRIPTION
                            )));
                        }
                    }
                    if !ids.insert(row.id.as_str()) {
                        return Err(FlowError::Graph(format!(
                            "question {}: duplicate row id '{}'",
                            node_id, row.id
                        )));
                    }
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MessagePayload;
    use botflow_core::types::ButtonOption;

    fn message(id: &str, body: &str) -> Node {
        Node::new(
            id,
            NodeKind::Message(MessagePayload {
                body: body.to_string(),
            }),
        )
    }

    fn two_node_graph() -> FlowGraph {
        FlowGraph::new(
            "f1",
            vec![Node::new("start", NodeKind::Start), message("m1", "hi")],
            vec![Edge::new("start", "m1")],
        )
        .unwrap()
    }

    #[test]
    fn test_validate_accepts_wellformed() {
        let graph = two_node_graph();
        assert_eq!(graph.start_node().unwrap().id, "start");
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let result = FlowGraph::new(
            "f1",
            vec![Node::new("start", NodeKind::Start), message("start", "hi")],
            vec![],
        );
        assert!(matches!(result, Err(FlowError::Graph(_))));
    }

    #[test]
    fn test_validate_requires_exactly_one_start() {
        let result = FlowGraph::new("f1", vec![message("m1", "hi")], vec![]);
        assert!(matches!(result, Err(FlowError::Graph(_))));

        let result = FlowGraph::new(
            "f1",
            vec![Node::new("a", NodeKind::Start), Node::new("b", NodeKind::Start)],
            vec![],
        );
        assert!(matches!(result, Err(FlowError::Graph(_))));
    }

    #[test]
    fn test_validate_rejects_dangling_edge() {
        let result = FlowGraph::new(
            "f1",
            vec![Node::new("start", NodeKind::Start)],
            vec![Edge::new("start", "ghost")],
        );
        assert!(matches!(result, Err(FlowError::Graph(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_button_set() {
        use crate::node::{QuestionPayload, QuestionStyle};
        let options = (0..4)
            .map(|i| ButtonOption {
                id: format!("b{}", i),
                label: "ok".into(),
            })
            .collect();
        let q = Node::new(
            "q",
            NodeKind::Question(QuestionPayload {
                body: "pick".into(),
                variable: "choice".into(),
                style: QuestionStyle::Buttons { options },
            }),
        );
        let result = FlowGraph::new("f1", vec![Node::new("start", NodeKind::Start), q], vec![]);
        assert!(matches!(result, Err(FlowError::Graph(_))));
    }

    #[test]
    fn test_next_node_exact_handle() {
        let graph = FlowGraph::new(
            "f1",
            vec![
                Node::new("start", NodeKind::Start),
                message("a", "A"),
                message("b", "B"),
            ],
            vec![
                Edge::with_handle("start", "a", "true"),
                Edge::with_handle("start", "b", "false"),
            ],
        )
        .unwrap();

        assert_eq!(graph.next_node("start", Some("true")), Some("a"));
        assert_eq!(graph.next_node("start", Some("false")), Some("b"));
    }

    #[test]
    fn test_next_node_falls_back_to_default() {
        let graph = FlowGraph::new(
            "f1",
            vec![
                Node::new("start", NodeKind::Start),
                message("a", "A"),
                message("b", "B"),
            ],
            vec![
                Edge::with_handle("start", "a", "success"),
                Edge::new("start", "b"),
            ],
        )
        .unwrap();

        // No "error" edge exists, so the unconditional edge wins.
        assert_eq!(graph.next_node("start", Some("error")), Some("b"));
    }

    #[test]
    fn test_next_node_none_ends_chain() {
        let graph = two_node_graph();
        assert_eq!(graph.next_node("m1", None), None);
        assert_eq!(graph.next_node("m1", Some("anything")), None);
    }

    #[test]
    fn test_next_node_first_match_wins() {
        let graph = FlowGraph::new(
            "f1",
            vec![
                Node::new("start", NodeKind::Start),
                message("a", "A"),
                message("b", "B"),
            ],
            vec![Edge::new("start", "a"), Edge::new("start", "b")],
        )
        .unwrap();

        assert_eq!(graph.next_node("start", None), Some("a"));
    }

    #[test]
    fn test_parse_roundtrip() {
        let raw = r#"{
            "id": "greeting",
            "nodes": [
                { "id": "start", "type": "start" },
                { "id": "hello", "type": "message", "payload": { "body": "Hello!" } }
            ],
            "edges": [ { "source": "start", "target": "hello" } ]
        }"#;
        let graph = FlowGraph::parse(raw).unwrap();
        assert_eq!(graph.id, "greeting");
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.next_node("start", None), Some("hello"));
    }
}
