//! Flow Execution Engine — interprets a user-authored, possibly-cyclic
//! graph of heterogeneous step types.
//!
//! The `Interpreter` drives one execution context from its start node to a
//! terminal state, suspending at questions and external forms and resuming
//! when a response is submitted. It is parameterized by a `MessageSink`
//! (real delivery vs. record-only simulation) and observed through the
//! `EventBus`, so live and test runs share one implementation.

pub mod arith;
pub mod condition;
pub mod interpreter;
pub mod loop_guard;
pub mod rest;
pub mod sweeper;
pub mod vars;

pub use interpreter::{Interpreter, StartOptions};
pub use rest::{RestExecutor, RestOutcome};
pub use sweeper::ExpirySweeper;
