//! Static flow definition — nodes, edges, and the edge-resolution rule.
//!
//! A flow is a directed graph of typed nodes. Each node's payload is a
//! tagged serde variant validated when the graph is loaded, so step
//! handlers never poke at loosely-typed JSON. Cycles are legal; bounding
//! them is the loop guard's job, not the graph's.

pub mod edge;
pub mod graph;
pub mod node;
pub mod source;

pub use edge::Edge;
pub use graph::FlowGraph;
pub use node::{
    BodyEncoding, Combinator, ConditionPayload, ConditionSpec, FormPayload, HttpMethod,
    MessagePayload, Node, NodeKind, QuestionPayload, QuestionStyle, ResponseFilter, RestPayload,
    StubPayload,
};
pub use source::{GraphSource, InMemoryGraphs};
