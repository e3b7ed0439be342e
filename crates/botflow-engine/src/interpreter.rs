use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use botflow_core::config::EngineConfig;
use botflow_core::error::{FlowError, Result};
use botflow_core::event::{EventBus, FlowEvent};
use botflow_core::traits::{ContextStore, MessageSink};
use botflow_core::types::{
    Awaiting, ButtonOption, CompletionReason, Context, ContextId, FlowId, Limits, ListRow,
    ListSection, OutboundMessage, ResponseInput, RunStatus, WaitKind,
};
use botflow_graph::{FlowGraph, GraphSource, Node, NodeKind, QuestionPayload, QuestionStyle};

use crate::condition::evaluate_group;
use crate::loop_guard;
use crate::rest::RestExecutor;
use crate::vars::resolve_templates;

/// Options for starting one run.
pub struct StartOptions {
    /// Where outbound messages are delivered.
    pub recipient: String,
    /// Seed variables available to the first steps.
    pub variables: HashMap<String, Value>,
    /// Per-run override of the loop-guard ceilings.
    pub limits: Option<Limits>,
    /// When the expiry sweep may deactivate this run.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StartOptions {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            variables: HashMap::new(),
            limits: None,
            expires_at: None,
        }
    }
}

/// What a dispatched node asks the step loop to do next.
enum StepOutcome {
    /// Resolve the outgoing edge, optionally through a handle.
    Advance(Option<String>),
    /// Suspend until external input arrives.
    Wait(WaitKind),
}

/// The step dispatcher and state machine.
///
/// One interpreter serves both execution modes: wire it to a transmitting
/// sink for live runs or a recording sink for simulation. Exactly one step
/// is in flight per context at a time; chains of non-suspending nodes run
/// back-to-back inside one `advance` call.
pub struct Interpreter {
    graphs: Arc<dyn GraphSource>,
    store: Arc<dyn ContextStore>,
    sink: Arc<dyn MessageSink>,
    events: Arc<EventBus>,
    rest: RestExecutor,
    default_limits: Limits,
}

impl Interpreter {
    pub fn new(
        graphs: Arc<dyn GraphSource>,
        store: Arc<dyn ContextStore>,
        sink: Arc<dyn MessageSink>,
        events: Arc<EventBus>,
        config: &EngineConfig,
    ) -> Result<Self> {
        Ok(Self {
            graphs,
            store,
            sink,
            events,
            rest: RestExecutor::new(config.rest_timeout_secs)?,
            default_limits: config.limits(),
        })
    }

    /// Start a new run of `flow_id` and drive it to its first suspension
    /// point or terminal state.
    ///
    /// Failures here (unknown flow, missing start node) propagate to the
    /// caller; the run never starts.
    pub async fn start(&self, flow_id: &FlowId, opts: StartOptions) -> Result<Context> {
        let graph = self.load_graph(flow_id).await?;
        let start = graph
            .start_node()
            .ok_or_else(|| FlowError::StartNodeMissing(flow_id.to_string()))?;

        let mut ctx = Context::new(flow_id.clone(), opts.recipient, &start.id);
        ctx.variables = opts.variables;
        ctx.limits = opts.limits.unwrap_or(self.default_limits);
        ctx.expires_at = opts.expires_at;
        self.store.save(&ctx).await?;

        info!(context = %ctx.id, flow = %flow_id, "Flow run starting");
        ctx.status = RunStatus::Running;
        self.advance(&mut ctx, &graph).await?;
        Ok(ctx)
    }

    /// Process a response against a suspended context and resume stepping.
    ///
    /// Rejections (not waiting, paused, wrong response kind) surface as
    /// `InvalidInput` with no state mutation.
    pub async fn submit_response(&self, id: &ContextId, input: ResponseInput) -> Result<Context> {
        let mut ctx = self.load_context(id).await?;

        if ctx.paused {
            return Err(FlowError::InvalidInput(format!(
                "context {} is paused",
                ctx.id
            )));
        }
        let expected = match ctx.status {
            RunStatus::WaitingInput => WaitKind::Input,
            RunStatus::WaitingFlow => WaitKind::Flow,
            other => {
                return Err(FlowError::InvalidInput(format!(
                    "context {} is not awaiting input (status: {})",
                    ctx.id, other
                )));
            }
        };
        if input.wait_kind() != expected {
            return Err(FlowError::InvalidInput(format!(
                "context {} expects a {:?} response",
                ctx.id,
                expected
            )));
        }
        let awaiting = ctx.awaiting.take().ok_or_else(|| {
            FlowError::InvalidInput(format!("context {} has no awaiting marker", ctx.id))
        })?;
        let node_id = ctx.current_node.clone().ok_or_else(|| {
            FlowError::InvalidInput(format!("context {} has no current node", ctx.id))
        })?;

        let graph = self.load_graph(&ctx.flow_id).await?;

        debug!(context = %ctx.id, node = %node_id, variable = %awaiting.variable, "Response received");

        let handle = input.handle_hint().map(str::to_string);
        let value = input.into_value();
        let old = ctx.variables.get(&awaiting.variable).cloned();
        self.events.publish(FlowEvent::VariableChanged {
            context: ctx.id.clone(),
            key: awaiting.variable.clone(),
            old,
            new: value.clone(),
            source: "response".to_string(),
        });
        ctx.set_variable(awaiting.variable, value);
        ctx.history.push(node_id.clone());

        // Button/row id first, then "default", then the unconditional edge.
        let next = graph
            .next_node(&node_id, Some(handle.as_deref().unwrap_or("default")))
            .map(str::to_string);
        self.events.publish(FlowEvent::NodeExited {
            context: ctx.id.clone(),
            node: node_id,
            next: next.clone(),
        });

        ctx.status = RunStatus::Running;
        match next {
            Some(next_id) => {
                ctx.current_node = Some(next_id);
                ctx.touch();
                self.store.save(&ctx).await?;
                self.advance(&mut ctx, &graph).await?;
            }
            None => {
                self.complete(&mut ctx, RunStatus::Completed, CompletionReason::Finished)
                    .await?;
            }
        }
        Ok(ctx)
    }

    /// Set the pause flag. Input is rejected while paused; the underlying
    /// status is untouched.
    pub async fn pause(&self, id: &ContextId) -> Result<Context> {
        let mut ctx = self.load_context(id).await?;
        if ctx.status.is_terminal() {
            return Err(FlowError::InvalidInput(format!(
                "context {} already ended",
                ctx.id
            )));
        }
        ctx.paused = true;
        ctx.touch();
        self.store.save(&ctx).await?;
        info!(context = %ctx.id, "Context paused");
        Ok(ctx)
    }

    /// Clear the pause flag without otherwise touching state.
    pub async fn resume(&self, id: &ContextId) -> Result<Context> {
        let mut ctx = self.load_context(id).await?;
        ctx.paused = false;
        ctx.touch();
        self.store.save(&ctx).await?;
        info!(context = %ctx.id, "Context resumed");
        Ok(ctx)
    }

    /// Unconditional, immediate stop. Side effects of any step that
    /// already ran are not rolled back.
    pub async fn stop(&self, id: &ContextId) -> Result<Context> {
        let mut ctx = self.load_context(id).await?;
        if ctx.status.is_terminal() {
            return Ok(ctx);
        }
        info!(context = %ctx.id, "Context stopped");
        self.complete(&mut ctx, RunStatus::Stopped, CompletionReason::Stopped)
            .await?;
        Ok(ctx)
    }

    /// Drive the context forward until it suspends or terminates.
    ///
    /// An explicit trampoline rather than recursion: arbitrarily long
    /// chains of non-suspending nodes cannot grow the call stack. Step
    /// handler failures are absorbed into context state here — stepping
    /// may continue asynchronously past the request that triggered it, so
    /// there is no caller to propagate to.
    async fn advance(&self, ctx: &mut Context, graph: &FlowGraph) -> Result<()> {
        loop {
            if ctx.status.is_terminal() || ctx.status.is_waiting() {
                break;
            }
            let Some(node_id) = ctx.current_node.clone() else {
                break;
            };
            let Some(node) = graph.node(&node_id) else {
                self.fail_step(ctx, &node_id, "node missing from graph definition")
                    .await?;
                break;
            };

            if let Some(trip) = loop_guard::admit(&mut ctx.loop_state, &ctx.limits, &node_id) {
                warn!(
                    context = %ctx.id,
                    node = %node_id,
                    diagnostic = %trip.diagnostic(),
                    "Loop guard tripped, terminating run"
                );
                self.complete(ctx, RunStatus::LoopDetected, CompletionReason::LoopDetected)
                    .await?;
                break;
            }

            self.events.publish(FlowEvent::NodeEntered {
                context: ctx.id.clone(),
                node: node_id.clone(),
            });

            let started = Instant::now();
            let outcome = self.dispatch(ctx, graph, node).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(StepOutcome::Advance(handle)) => {
                    self.events.publish(FlowEvent::NodeExecuted {
                        context: ctx.id.clone(),
                        node: node_id.clone(),
                        ok: true,
                        duration_ms,
                        error: None,
                    });
                    ctx.history.push(node_id.clone());
                    let next = graph
                        .next_node(&node_id, handle.as_deref())
                        .map(str::to_string);
                    self.events.publish(FlowEvent::NodeExited {
                        context: ctx.id.clone(),
                        node: node_id.clone(),
                        next: next.clone(),
                    });
                    match next {
                        Some(next_id) => {
                            debug!(context = %ctx.id, from = %node_id, to = %next_id, "Advancing");
                            ctx.current_node = Some(next_id);
                            ctx.touch();
                            self.store.save(ctx).await?;
                        }
                        None => {
                            info!(context = %ctx.id, node = %node_id, "Flow completed");
                            self.complete(ctx, RunStatus::Completed, CompletionReason::Finished)
                                .await?;
                        }
                    }
                }
                Ok(StepOutcome::Wait(kind)) => {
                    self.events.publish(FlowEvent::NodeExecuted {
                        context: ctx.id.clone(),
                        node: node_id.clone(),
                        ok: true,
                        duration_ms,
                        error: None,
                    });
                    ctx.status = match kind {
                        WaitKind::Input => RunStatus::WaitingInput,
                        WaitKind::Flow => RunStatus::WaitingFlow,
                    };
                    ctx.touch();
                    self.store.save(ctx).await?;
                    self.events.publish(FlowEvent::WaitingForInput {
                        context: ctx.id.clone(),
                        node: node_id.clone(),
                        kind,
                    });
                    debug!(context = %ctx.id, node = %node_id, ?kind, "Suspended awaiting input");
                }
                Err(e) => {
                    error!(context = %ctx.id, node = %node_id, error = %e, "Step handler failed");
                    self.events.publish(FlowEvent::NodeExecuted {
                        context: ctx.id.clone(),
                        node: node_id.clone(),
                        ok: false,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                    self.events.publish(FlowEvent::RunError {
                        context: ctx.id.clone(),
                        error: e.to_string(),
                    });
                    self.complete(ctx, RunStatus::Error, CompletionReason::StepError)
                        .await?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Dispatch one node by type.
    async fn dispatch(
        &self,
        ctx: &mut Context,
        graph: &FlowGraph,
        node: &Node,
    ) -> Result<StepOutcome> {
        match &node.kind {
            NodeKind::Start => Ok(StepOutcome::Advance(None)),

            NodeKind::Message(m) => {
                let body = resolve_templates(&m.body, &ctx.variables);
                self.sink
                    .send(&ctx.recipient, &OutboundMessage::Text { body })
                    .await?;
                Ok(StepOutcome::Advance(None))
            }

            NodeKind::Question(q) => {
                let message = build_question_message(q, &ctx.variables);
                self.sink.send(&ctx.recipient, &message).await?;
                ctx.awaiting = Some(Awaiting {
                    variable: q.variable.clone(),
                    kind: WaitKind::Input,
                });
                Ok(StepOutcome::Wait(WaitKind::Input))
            }

            NodeKind::Condition(c) => {
                let result = evaluate_group(c.combinator, &c.conditions, &ctx.variables);
                debug!(context = %ctx.id, node = %node.id, result, "Condition evaluated");
                let handle = if result { "true" } else { "false" };
                Ok(StepOutcome::Advance(Some(handle.to_string())))
            }

            NodeKind::RestApi(r) => {
                let outcome = self.rest.execute(r, &ctx.variables).await;
                let key = step_output_key(graph, &ctx.history, node);
                self.record_output(ctx, key, outcome.to_value(), "rest_api");
                let handle = if outcome.success { "success" } else { "error" };
                Ok(StepOutcome::Advance(Some(handle.to_string())))
            }

            NodeKind::ExternalForm(f) => {
                let message = OutboundMessage::Form {
                    form_id: f.form_id.clone(),
                    payload: f.payload.clone(),
                };
                self.sink.send(&ctx.recipient, &message).await?;
                ctx.awaiting = Some(Awaiting {
                    variable: f.variable.clone(),
                    kind: WaitKind::Flow,
                });
                Ok(StepOutcome::Wait(WaitKind::Flow))
            }

            NodeKind::Stub(s) => {
                debug!(context = %ctx.id, node = %node.id, label = %s.label, "Stub step");
                let key = step_output_key(graph, &ctx.history, node);
                let value = serde_json::json!({ "data": s.output });
                self.record_output(ctx, key, value, "stub");
                Ok(StepOutcome::Advance(None))
            }
        }
    }

    fn record_output(&self, ctx: &mut Context, key: String, value: Value, source: &str) {
        let old = ctx.variables.get(&key).cloned();
        self.events.publish(FlowEvent::VariableChanged {
            context: ctx.id.clone(),
            key: key.clone(),
            old,
            new: value.clone(),
            source: source.to_string(),
        });
        ctx.set_variable(key, value);
    }

    async fn complete(
        &self,
        ctx: &mut Context,
        status: RunStatus,
        reason: CompletionReason,
    ) -> Result<()> {
        ctx.finish(status, reason);
        self.store.save(ctx).await?;
        self.events.publish(FlowEvent::RunCompleted {
            context: ctx.id.clone(),
            reason,
        });
        Ok(())
    }

    async fn fail_step(&self, ctx: &mut Context, node_id: &str, message: &str) -> Result<()> {
        error!(context = %ctx.id, node = %node_id, "{}", message);
        self.events.publish(FlowEvent::RunError {
            context: ctx.id.clone(),
            error: format!("node {}: {}", node_id, message),
        });
        self.complete(ctx, RunStatus::Error, CompletionReason::StepError)
            .await
    }

    async fn load_graph(&self, id: &FlowId) -> Result<FlowGraph> {
        self.graphs
            .flow(id)
            .await?
            .ok_or_else(|| FlowError::FlowNotFound(id.to_string()))
    }

    async fn load_context(&self, id: &ContextId) -> Result<Context> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| FlowError::ContextNotFound(id.to_string()))
    }
}

/// Auto-generated key for a step's output: the node's type name plus its
/// 1-indexed ordinal among same-type steps already present in the history.
fn step_output_key(graph: &FlowGraph, history: &[String], node: &Node) -> String {
    let kind = node.kind.name();
    let prior = history
        .iter()
        .filter(|id| {
            graph
                .node(id.as_str())
                .map(|n| n.kind.name() == kind)
                .unwrap_or(false)
        })
        .count();
    format!("{}_{}", kind, prior + 1)
}

/// Substitute variables into a question's text fields and shape the
/// outbound message. Option and row ids stay verbatim — they double as
/// edge handles.
fn build_question_message(q: &QuestionPayload, vars: &HashMap<String, Value>) -> OutboundMessage {
    let body = resolve_templates(&q.body, vars);
    match &q.style {
        QuestionStyle::Text => OutboundMessage::Text { body },
        QuestionStyle::Buttons { options } => OutboundMessage::Buttons {
            body,
            buttons: options
                .iter()
                .map(|o| ButtonOption {
                    id: o.id.clone(),
                    label: resolve_templates(&o.label, vars),
                })
                .collect(),
        },
        QuestionStyle::List {
            button_label,
            sections,
        } => OutboundMessage::List {
            body,
            button_label: button_label.clone(),
            sections: sections
                .iter()
                .map(|s| ListSection {
                    title: resolve_templates(&s.title, vars),
                    rows: s
                        .rows
                        .iter()
                        .map(|r| ListRow {
                            id: r.id.clone(),
                            title: resolve_templates(&r.title, vars),
                            description: r
                                .description
                                .as_ref()
                                .map(|d| resolve_templates(d, vars)),
                        })
                        .collect(),
                })
                .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botflow_graph::{Edge, MessagePayload, NodeKind};

    fn graph_with_two_rest_nodes() -> FlowGraph {
        FlowGraph::new(
            "f1",
            vec![
                Node::new("start", NodeKind::Start),
                Node::new(
                    "r1",
                    NodeKind::RestApi(botflow_graph::RestPayload {
                        url: "https://example.com/a".into(),
                        method: Default::default(),
                        headers: Default::default(),
                        body: None,
                        content_type: Default::default(),
                        timeout_secs: None,
                        response_path: None,
                        filter: None,
                    }),
                ),
                Node::new(
                    "r2",
                    NodeKind::RestApi(botflow_graph::RestPayload {
                        url: "https://example.com/b".into(),
                        method: Default::default(),
                        headers: Default::default(),
                        body: None,
                        content_type: Default::default(),
                        timeout_secs: None,
                        response_path: None,
                        filter: None,
                    }),
                ),
                Node::new(
                    "m",
                    NodeKind::Message(MessagePayload {
                        body: "hi".into(),
                    }),
                ),
            ],
            vec![Edge::new("start", "r1"), Edge::new("r1", "r2")],
        )
        .unwrap()
    }

    #[test]
    fn test_step_output_key_ordinals() {
        let graph = graph_with_two_rest_nodes();
        let r1 = graph.node("r1").unwrap();
        let r2 = graph.node("r2").unwrap();

        let history: Vec<String> = vec!["start".into()];
        assert_eq!(step_output_key(&graph, &history, r1), "rest_api_1");

        let history: Vec<String> = vec!["start".into(), "r1".into()];
        assert_eq!(step_output_key(&graph, &history, r2), "rest_api_2");

        // A revisited node keeps counting.
        let history: Vec<String> = vec!["start".into(), "r1".into(), "r2".into()];
        assert_eq!(step_output_key(&graph, &history, r1), "rest_api_3");
    }

    #[test]
    fn test_build_question_substitutes_labels_not_ids() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), serde_json::json!("Ada"));

        let q = QuestionPayload {
            body: "Hi {{name}}, proceed?".into(),
            variable: "answer".into(),
            style: QuestionStyle::Buttons {
                options: vec![ButtonOption {
                    id: "yes".into(),
                    label: "Yes {{name}}".into(),
                }],
            },
        };
        match build_question_message(&q, &vars) {
            OutboundMessage::Buttons { body, buttons } => {
                assert_eq!(body, "Hi Ada, proceed?");
                assert_eq!(buttons[0].id, "yes");
                assert_eq!(buttons[0].label, "Yes Ada");
            }
            _ => panic!("expected buttons"),
        }
    }
}
