use serde::{Deserialize, Serialize};

/// A directed connection between two nodes.
///
/// A handle discriminates among several outgoing edges from one node:
/// `"true"`/`"false"` for conditions, `"success"`/`"error"` for REST
/// steps, a button or row id for questions. An edge with no handle (or
/// the literal handle `"default"`) is the unconditional fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub handle: Option<String>,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            handle: None,
        }
    }

    /// Create an edge with a routing handle.
    pub fn with_handle(
        source: impl Into<String>,
        target: impl Into<String>,
        handle: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            handle: Some(handle.into()),
        }
    }

    /// Whether this edge acts as the unconditional fallback.
    pub fn is_default(&self) -> bool {
        matches!(self.handle.as_deref(), None | Some("default"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_builders() {
        let e = Edge::new("a", "b");
        assert_eq!(e.source, "a");
        assert_eq!(e.target, "b");
        assert!(e.is_default());

        let e = Edge::with_handle("a", "c", "true");
        assert_eq!(e.handle.as_deref(), Some("true"));
        assert!(!e.is_default());

        let e = Edge::with_handle("a", "d", "default");
        assert!(e.is_default());
    }

    #[test]
    fn test_missing_handle_deserializes_none() {
        let e: Edge = serde_json::from_str(r#"{"source":"a","target":"b"}"#).unwrap();
        assert!(e.handle.is_none());
    }
}
