use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::BoxFuture;

use botflow_core::error::Result;
use botflow_core::types::FlowId;

use crate::graph::FlowGraph;

/// Graph source — supplies the immutable flow definition for one run.
pub trait GraphSource: Send + Sync + 'static {
    /// Fetch a flow definition by id. Ok(None) when unknown.
    fn flow(&self, id: &FlowId) -> BoxFuture<'_, Result<Option<FlowGraph>>>;
}

/// In-memory graph source, used by tests and the CLI runner.
#[derive(Default)]
pub struct InMemoryGraphs {
    graphs: RwLock<HashMap<String, FlowGraph>>,
}

impl InMemoryGraphs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a (validated) graph under its own id.
    pub fn insert(&self, graph: FlowGraph) {
        self.graphs
            .write()
            .expect("graph map poisoned")
            .insert(graph.id.clone(), graph);
    }
}

impl GraphSource for InMemoryGraphs {
    fn flow(&self, id: &FlowId) -> BoxFuture<'_, Result<Option<FlowGraph>>> {
        let found = self
            .graphs
            .read()
            .expect("graph map poisoned")
            .get(&id.0)
            .cloned();
        Box::pin(async move { Ok(found) })
    }
}
