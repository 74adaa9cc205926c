//! Node executors.
//!
//! One executor per node type. Each is a function of (node config,
//! conversation state, latest inbound message) to (state delta, zero or
//! more outbound actions, next-node selection). Executors never raise
//! past the pass boundary: every failure becomes a `StepOutcome`.

use crate::template;
use funil_core::config::EngineTuning;
use funil_core::graph::{
    handle, AgenticConfig, BroadcastConfig, ClosingConfig, Condition, LogicConfig, NodeKind,
    QualificationConfig, TriggerConfig,
};
use funil_core::retry::{with_backoff, Fault, RetryConfig};
use funil_core::{
    Campaign, ChatModel, ConversationState, GenerationParams, InboundMessage, Node, Origin,
    OutboundAction, Presence, RealtimeEvent, Role, Turn,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of executing one node within a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Action(s) emitted; the next node needs a fresh inbound message.
    Await { next: String },
    /// The next node can be evaluated without new input.
    Continue { next: String },
    /// A closing node was reached.
    Terminate { final_status: Option<String> },
    /// Rebind this chat to another campaign; the current graph's
    /// lifecycle ends.
    Handoff { target_campaign_id: Uuid },
    /// No outgoing edge matches the evaluated branch. The interpreter
    /// freezes position so the next message retries from the same node.
    DeadEnd { reason: String },
}

/// Per-pass execution context handed to each executor.
pub struct NodeContext<'a> {
    pub campaign: &'a Campaign,
    /// The WhatsApp session the chat lives on (outbound actions target
    /// it even after a handoff to a campaign bound elsewhere).
    pub session: &'a str,
    pub state: &'a mut ConversationState,
    /// Present only on the first node execution of a pass.
    pub inbound: Option<&'a InboundMessage>,
    pub actions: &'a mut Vec<OutboundAction>,
}

pub struct NodeExecutors {
    model: Arc<dyn ChatModel>,
    retry: RetryConfig,
    tuning: EngineTuning,
    params: GenerationParams,
}

impl NodeExecutors {
    pub fn new(model: Arc<dyn ChatModel>, tuning: EngineTuning, params: GenerationParams) -> Self {
        Self {
            model,
            retry: RetryConfig::default(),
            tuning,
            params,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn execute(&self, node: &Node, ctx: &mut NodeContext<'_>) -> StepOutcome {
        match &node.kind {
            NodeKind::Trigger(cfg) => self.run_trigger(node, cfg, ctx),
            NodeKind::Broadcast(cfg) => self.run_broadcast(node, cfg, ctx),
            NodeKind::Agentic(cfg) => self.run_agentic(node, cfg, ctx).await,
            NodeKind::Logic(cfg) => self.run_logic(node, cfg, ctx),
            NodeKind::Qualification(cfg) => self.run_qualification(node, cfg, ctx),
            NodeKind::Handoff(cfg) => StepOutcome::Handoff {
                target_campaign_id: cfg.target_campaign_id,
            },
            NodeKind::Closing(cfg) => self.run_closing(node, cfg, ctx),
        }
    }

    /// Entry-only. Validates the inbound origin against the trigger's
    /// allowed sources and falls through to its sole successor.
    fn run_trigger(
        &self,
        node: &Node,
        cfg: &TriggerConfig,
        ctx: &mut NodeContext<'_>,
    ) -> StepOutcome {
        let origin = ctx.inbound.map_or(Origin::Organic, InboundMessage::origin);
        if !cfg.accepts(origin) {
            return StepOutcome::DeadEnd {
                reason: format!("trigger '{}' does not accept origin {:?}", node.id, origin),
            };
        }
        match ctx.campaign.graph.default_edge(&node.id) {
            Some(edge) => StepOutcome::Continue {
                next: edge.target.clone(),
            },
            None => StepOutcome::DeadEnd {
                reason: format!("trigger '{}' has no successor", node.id),
            },
        }
    }

    /// Renders the template (variable substitution + spintax), emits the
    /// text, then awaits the lead's reply at the successor.
    fn run_broadcast(
        &self,
        node: &Node,
        cfg: &BroadcastConfig,
        ctx: &mut NodeContext<'_>,
    ) -> StepOutcome {
        let text = template::render(&cfg.message, &ctx.state.variables);
        if cfg.typing {
            ctx.actions.push(OutboundAction::SetPresence {
                session: ctx.session.to_string(),
                chat_id: ctx.state.chat_id.clone(),
                presence: Presence::Typing,
            });
        }
        ctx.actions.push(OutboundAction::SendText {
            session: ctx.session.to_string(),
            chat_id: ctx.state.chat_id.clone(),
            text: text.clone(),
        });
        ctx.state
            .push_turn(Role::Assistant, &text, self.tuning.history_limit);

        match ctx.campaign.graph.default_edge(&node.id) {
            Some(edge) => StepOutcome::Await {
                next: edge.target.clone(),
            },
            None => StepOutcome::DeadEnd {
                reason: format!("broadcast '{}' has no successor", node.id),
            },
        }
    }

    /// Calls the model and stores its output as an opaque string in the
    /// node's variable. Branching on that output is the job of a logic
    /// node — the interpreter never branches on raw model text.
    async fn run_agentic(
        &self,
        node: &Node,
        cfg: &AgenticConfig,
        ctx: &mut NodeContext<'_>,
    ) -> StepOutcome {
        let mut system = cfg.instructions.clone();
        if let Some(directive) = ctx.state.pad.instruction() {
            system.push_str("\n\nEmotional guidance: ");
            system.push_str(directive);
        }
        if let Some(extra) = &cfg.system_prompt {
            system.push_str("\n\n");
            system.push_str(extra);
        }

        let history: Vec<Turn> = ctx.state.history.clone();
        let call_timeout = Duration::from_secs(self.tuning.llm_timeout_secs);
        let label = format!("agentic node '{}'", node.id);

        let result = with_backoff(&self.retry, &label, || async {
            match tokio::time::timeout(
                call_timeout,
                self.model.generate(&system, &history, self.params.clone()),
            )
            .await
            {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(Fault::Transient(e)),
                Err(_) => Err(Fault::Transient(anyhow::anyhow!("model call timed out"))),
            }
        })
        .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                // Bounded retries exhausted: take the error branch when the
                // graph provides one, otherwise freeze and surface. The
                // inbound message is never lost and the node never skipped.
                tracing::error!(node = %node.id, "model unavailable: {}", e);
                if let Some(edge) = ctx.campaign.graph.edge_for_handle(&node.id, handle::ERROR) {
                    return StepOutcome::Continue {
                        next: edge.target.clone(),
                    };
                }
                ctx.actions.push(OutboundAction::Alert(
                    RealtimeEvent::AgentConfigError {
                        campaign_id: Some(ctx.campaign.id),
                        campaign_name: Some(ctx.campaign.name.clone()),
                        session_name: ctx.session.to_string(),
                        reason: format!("agentic node '{}' failed after retries: {}", node.id, e),
                        timestamp: chrono::Utc::now().timestamp(),
                    },
                ));
                return StepOutcome::DeadEnd {
                    reason: format!("agentic node '{}' exhausted retries", node.id),
                };
            }
        };

        let output = reply.text.trim().to_string();
        if cfg.variable.is_empty() {
            tracing::warn!(node = %node.id, "agentic node has no variable name; output discarded");
        } else {
            ctx.state.variables.insert(cfg.variable.clone(), output.clone());
        }
        if cfg.send_reply && !output.is_empty() {
            ctx.actions.push(OutboundAction::SendText {
                session: ctx.session.to_string(),
                chat_id: ctx.state.chat_id.clone(),
                text: output.clone(),
            });
            ctx.state
                .push_turn(Role::Assistant, &output, self.tuning.history_limit);
        }

        match ctx.campaign.graph.default_edge(&node.id) {
            Some(edge) if cfg.decide_immediately => StepOutcome::Continue {
                next: edge.target.clone(),
            },
            Some(edge) => StepOutcome::Await {
                next: edge.target.clone(),
            },
            None => StepOutcome::DeadEnd {
                reason: format!("agentic node '{}' has no successor", node.id),
            },
        }
    }

    /// Deterministic branch on an accumulated variable. An absent
    /// variable dead-ends rather than guessing a branch.
    fn run_logic(&self, node: &Node, cfg: &LogicConfig, ctx: &mut NodeContext<'_>) -> StepOutcome {
        let Some(value) = ctx.state.variables.get(&cfg.variable) else {
            return StepOutcome::DeadEnd {
                reason: format!(
                    "logic node '{}': variable '{}' is not set",
                    node.id, cfg.variable
                ),
            };
        };

        let matched = match cfg.op {
            Condition::Equals => value == &cfg.value,
            Condition::NotEquals => value != &cfg.value,
            Condition::Contains => value.contains(&cfg.value),
            Condition::Matches => match regex::Regex::new(&cfg.value) {
                Ok(re) => re.is_match(value),
                Err(e) => {
                    return StepOutcome::DeadEnd {
                        reason: format!("logic node '{}': invalid regex: {}", node.id, e),
                    };
                }
            },
            Condition::GreaterThan | Condition::LessThan => {
                match (value.parse::<f64>(), cfg.value.parse::<f64>()) {
                    (Ok(lhs), Ok(rhs)) => {
                        if cfg.op == Condition::GreaterThan {
                            lhs > rhs
                        } else {
                            lhs < rhs
                        }
                    }
                    _ => {
                        tracing::warn!(
                            node = %node.id,
                            "numeric comparison on non-numeric operands; evaluating false"
                        );
                        false
                    }
                }
            }
        };

        let branch = if matched { handle::TRUE } else { handle::FALSE };
        match ctx.campaign.graph.edge_for_handle(&node.id, branch) {
            Some(edge) => StepOutcome::Continue {
                next: edge.target.clone(),
            },
            None => StepOutcome::DeadEnd {
                reason: format!("logic node '{}' has no edge for handle '{}'", node.id, branch),
            },
        }
    }

    /// Checks each critical slot against accumulated variables. All
    /// filled routes through the qualified branch; otherwise the node
    /// re-prompts and awaits on itself, up to `max_turns`, after which it
    /// force-routes to a fallback edge if present.
    fn run_qualification(
        &self,
        node: &Node,
        cfg: &QualificationConfig,
        ctx: &mut NodeContext<'_>,
    ) -> StepOutcome {
        let mut all_filled = true;
        for slot in &cfg.slots {
            let filled = ctx
                .state
                .variables
                .get(slot)
                .is_some_and(|v| !v.is_empty());
            ctx.state.slots.insert(slot.clone(), filled);
            all_filled &= filled;
        }

        if all_filled {
            ctx.state.qualification_turns = 0;
            let edge = ctx
                .campaign
                .graph
                .edge_for_handle(&node.id, handle::QUALIFIED)
                .or_else(|| ctx.campaign.graph.default_edge(&node.id));
            return match edge {
                Some(edge) => StepOutcome::Continue {
                    next: edge.target.clone(),
                },
                None => StepOutcome::DeadEnd {
                    reason: format!("qualification node '{}' has no qualified edge", node.id),
                },
            };
        }

        let max_turns = if cfg.max_turns == 0 {
            self.tuning.default_max_turns
        } else {
            cfg.max_turns
        };
        ctx.state.qualification_turns += 1;
        if ctx.state.qualification_turns >= max_turns {
            ctx.state.qualification_turns = 0;
            return match ctx.campaign.graph.edge_for_handle(&node.id, handle::FALLBACK) {
                Some(edge) => StepOutcome::Continue {
                    next: edge.target.clone(),
                },
                None => StepOutcome::DeadEnd {
                    reason: format!(
                        "qualification node '{}' exceeded {} turns with no fallback edge",
                        node.id, max_turns
                    ),
                },
            };
        }

        if let Some(prompt) = &cfg.prompt {
            let text = template::render(prompt, &ctx.state.variables);
            ctx.actions.push(OutboundAction::SendText {
                session: ctx.session.to_string(),
                chat_id: ctx.state.chat_id.clone(),
                text: text.clone(),
            });
            ctx.state
                .push_turn(Role::Assistant, &text, self.tuning.history_limit);
        }
        StepOutcome::Await {
            next: node.id.clone(),
        }
    }

    fn run_closing(
        &self,
        _node: &Node,
        cfg: &ClosingConfig,
        ctx: &mut NodeContext<'_>,
    ) -> StepOutcome {
        ctx.actions.push(OutboundAction::Alert(
            RealtimeEvent::ConversationClosed {
                campaign_id: ctx.campaign.id,
                chat_id: ctx.state.chat_id.clone(),
                final_status: cfg.final_status.clone(),
                timestamp: chrono::Utc::now().timestamp(),
            },
        ));
        StepOutcome::Terminate {
            final_status: Some(cfg.final_status.clone()),
        }
    }
}
