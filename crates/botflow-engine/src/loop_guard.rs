//! Circuit breaker against cyclic or unbounded graphs.
//!
//! Counters are checked before every dispatch, not after: a node that
//! would exceed a ceiling is never executed. This bounds runaway flows; it
//! does not make any graph correct.

use botflow_core::types::{Limits, LoopState};

/// Which ceiling tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopTrip {
    NodeVisits {
        node: String,
        count: u32,
        ceiling: u32,
    },
    TotalSteps {
        node: String,
        steps: u32,
        ceiling: u32,
    },
}

impl LoopTrip {
    pub fn diagnostic(&self) -> String {
        match self {
            Self::NodeVisits {
                node,
                count,
                ceiling,
            } => format!(
                "node {} visited {} times (ceiling {})",
                node, count, ceiling
            ),
            Self::TotalSteps {
                node,
                steps,
                ceiling,
            } => format!(
                "total steps reached {} at node {} (ceiling {})",
                steps, node, ceiling
            ),
        }
    }
}

/// Count one admission of `node` and check the ceilings.
///
/// On a trip, `state` is marked tripped with the diagnostic recorded, and
/// the caller must not dispatch the node.
pub fn admit(state: &mut LoopState, limits: &Limits, node: &str) -> Option<LoopTrip> {
    let visits = state.visits.entry(node.to_string()).or_insert(0);
    *visits += 1;
    let visits = *visits;
    state.total_steps += 1;

    let trip = if visits > limits.max_node_visits {
        Some(LoopTrip::NodeVisits {
            node: node.to_string(),
            count: visits,
            ceiling: limits.max_node_visits,
        })
    } else if state.total_steps > limits.max_total_steps {
        Some(LoopTrip::TotalSteps {
            node: node.to_string(),
            steps: state.total_steps,
            ceiling: limits.max_total_steps,
        })
    } else {
        None
    };

    if let Some(ref trip) = trip {
        state.tripped = true;
        state.diagnostic = Some(trip.diagnostic());
    }
    trip
}
