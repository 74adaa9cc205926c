//! The graph interpreter — the engine's core state machine.
//!
//! One pass per admitted inbound message: load (or create) the chat's
//! conversation state, resume at its current node, execute node
//! executors until one yields await/terminate/dead-end, then persist the
//! resulting position and hand the emitted actions to the dispatcher.
//!
//! Concurrency: at most one pass per (campaign, chat) at a time via a
//! per-pair lock map; passes for different chats run in parallel. The
//! graph is read-only during execution — publishing is a separate path.

use crate::emotion::EmotionalEstimator;
use crate::nodes::{NodeContext, NodeExecutors, StepOutcome};
use crate::router::SessionRouter;
use funil_core::config::EngineTuning;
use funil_core::{
    Campaign, CampaignStatus, ConversationState, InboundMessage, OutboundAction, Phase,
    RealtimeEvent, Role, StateStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Alert operators once a chat hits this many consecutive
/// configuration-defect passes.
const CONFIG_ERROR_ALERT_THRESHOLD: u32 = 2;

#[derive(Default)]
struct ChatLocks {
    inner: Mutex<HashMap<(Uuid, String), Arc<Mutex<()>>>>,
}

impl ChatLocks {
    async fn acquire(&self, campaign_id: Uuid, chat_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().await;
        locks
            .entry((campaign_id, chat_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct Interpreter {
    store: Arc<dyn StateStore>,
    router: Arc<SessionRouter>,
    executors: NodeExecutors,
    estimator: EmotionalEstimator,
    tuning: EngineTuning,
    locks: ChatLocks,
}

impl Interpreter {
    pub fn new(
        store: Arc<dyn StateStore>,
        router: Arc<SessionRouter>,
        executors: NodeExecutors,
        tuning: EngineTuning,
    ) -> Self {
        Self {
            store,
            router,
            executors,
            estimator: EmotionalEstimator::default(),
            tuning,
            locks: ChatLocks::default(),
        }
    }

    /// Run one pass for an inbound message under its resolved campaign.
    /// Returns the outbound actions in emission order; the caller flushes
    /// them even when the pass ended on a defect.
    pub async fn process(
        &self,
        campaign: Arc<Campaign>,
        inbound: &InboundMessage,
    ) -> anyhow::Result<Vec<OutboundAction>> {
        let lock = self.locks.acquire(campaign.id, &inbound.chat_id).await;
        let _pass = lock.lock().await;

        // Paused campaigns admit and dedup traffic but execute nothing;
        // state is left untouched for later resumption.
        if campaign.status == CampaignStatus::Paused {
            tracing::debug!(campaign = %campaign.id, "campaign paused; acknowledging without executing");
            return Ok(Vec::new());
        }

        let mut state = match self.store.load(campaign.id, &inbound.chat_id).await? {
            Some(state) => state,
            None => ConversationState::new(campaign.id, &inbound.chat_id),
        };

        if state.is_terminal() {
            if campaign.reentry {
                tracing::debug!(
                    campaign = %campaign.id,
                    chat = %inbound.chat_id,
                    "closed conversation re-entering at the entry node"
                );
                state.reset_for_reentry();
            } else {
                tracing::debug!(
                    campaign = %campaign.id,
                    chat = %inbound.chat_id,
                    "closed conversation and re-entry disabled; acknowledging"
                );
                return Ok(Vec::new());
            }
        }

        let mut current = match &state.phase {
            Phase::AtNode { node_id } => node_id.clone(),
            Phase::AwaitingEntry | Phase::Terminal => {
                match campaign.graph.entry_node(inbound.origin()) {
                    Some(node) => node.id.clone(),
                    None => {
                        tracing::warn!(
                            campaign = %campaign.id,
                            "graph has no trigger node; dropping inbound"
                        );
                        return Ok(Vec::new());
                    }
                }
            }
        };

        state.pad = self.estimator.update(&state.pad, &inbound.body);
        state.push_turn(Role::User, &inbound.body, self.tuning.history_limit);
        state.last_activity_at = inbound.timestamp;

        let mut actions: Vec<OutboundAction> = Vec::new();
        let mut iterations = 0u32;
        let mut first = true;
        let mut persist = true;

        loop {
            iterations += 1;
            if iterations > self.tuning.iteration_cap {
                tracing::error!(
                    campaign = %campaign.id,
                    chat = %inbound.chat_id,
                    cap = self.tuning.iteration_cap,
                    "iteration cap exceeded; graph has a continue-only cycle"
                );
                actions.push(OutboundAction::Alert(RealtimeEvent::AgentConfigError {
                    campaign_id: Some(campaign.id),
                    campaign_name: Some(campaign.name.clone()),
                    session_name: inbound.session_name.clone(),
                    reason: format!("iteration cap ({}) exceeded", self.tuning.iteration_cap),
                    timestamp: chrono::Utc::now().timestamp(),
                }));
                // Leave stored state exactly as it was before the pass.
                persist = false;
                break;
            }

            let Some(node) = campaign.graph.node(&current) else {
                tracing::error!(
                    campaign = %campaign.id,
                    node = %current,
                    "current node missing from graph; freezing position"
                );
                state.config_error_streak += 1;
                state.phase = Phase::AtNode {
                    node_id: current.clone(),
                };
                break;
            };

            let outcome = {
                let mut ctx = NodeContext {
                    campaign: &campaign,
                    session: &inbound.session_name,
                    state: &mut state,
                    inbound: first.then_some(inbound),
                    actions: &mut actions,
                };
                self.executors.execute(node, &mut ctx).await
            };
            first = false;

            match outcome {
                StepOutcome::Continue { next } => {
                    current = next;
                }
                StepOutcome::Await { next } => {
                    state.config_error_streak = 0;
                    state.phase = Phase::AtNode { node_id: next };
                    break;
                }
                StepOutcome::Terminate { final_status } => {
                    state.config_error_streak = 0;
                    state.phase = Phase::Terminal;
                    state.final_status = final_status;
                    break;
                }
                StepOutcome::Handoff { target_campaign_id } => {
                    self.handoff(
                        &campaign,
                        inbound,
                        &mut state,
                        &mut actions,
                        target_campaign_id,
                        &current,
                    )
                    .await?;
                    break;
                }
                StepOutcome::DeadEnd { reason } => {
                    // A configuration defect, not a runtime fault: freeze
                    // position so the next inbound retries the same node.
                    tracing::warn!(
                        campaign = %campaign.id,
                        chat = %inbound.chat_id,
                        node = %current,
                        "pass dead-ended: {}",
                        reason
                    );
                    state.config_error_streak += 1;
                    state.phase = Phase::AtNode {
                        node_id: current.clone(),
                    };
                    if state.config_error_streak >= CONFIG_ERROR_ALERT_THRESHOLD {
                        actions.push(OutboundAction::Alert(RealtimeEvent::AgentConfigError {
                            campaign_id: Some(campaign.id),
                            campaign_name: Some(campaign.name.clone()),
                            session_name: inbound.session_name.clone(),
                            reason,
                            timestamp: chrono::Utc::now().timestamp(),
                        }));
                    }
                    break;
                }
            }
        }

        if persist {
            self.store.save(&state).await?;
        }
        Ok(actions)
    }

    /// Terminate the conversation under the current campaign and seed a
    /// fresh one under the target, carrying variables (and the emotional
    /// estimate) forward.
    async fn handoff(
        &self,
        campaign: &Campaign,
        inbound: &InboundMessage,
        state: &mut ConversationState,
        actions: &mut Vec<OutboundAction>,
        target_campaign_id: Uuid,
        current_node: &str,
    ) -> anyhow::Result<()> {
        match self
            .router
            .bind_chat(&inbound.session_name, &inbound.chat_id, target_campaign_id)
            .await
        {
            Ok(_target) => {
                let mut seeded = ConversationState::new(target_campaign_id, &inbound.chat_id);
                seeded.variables = state.variables.clone();
                seeded.pad = state.pad;
                seeded.history = state.history.clone();
                seeded.last_activity_at = inbound.timestamp;
                self.store.save(&seeded).await?;

                state.config_error_streak = 0;
                state.phase = Phase::Terminal;
                state.final_status = Some("handoff".to_string());
                actions.push(OutboundAction::Alert(RealtimeEvent::ConversationHandoff {
                    from_campaign_id: campaign.id,
                    to_campaign_id: target_campaign_id,
                    chat_id: inbound.chat_id.clone(),
                    timestamp: chrono::Utc::now().timestamp(),
                }));
                tracing::info!(
                    from = %campaign.id,
                    to = %target_campaign_id,
                    chat = %inbound.chat_id,
                    "chat handed off"
                );
            }
            Err(e) => {
                tracing::warn!(
                    campaign = %campaign.id,
                    target = %target_campaign_id,
                    "handoff target unavailable: {}",
                    e
                );
                state.config_error_streak += 1;
                state.phase = Phase::AtNode {
                    node_id: current_node.to_string(),
                };
                actions.push(OutboundAction::Alert(RealtimeEvent::AgentConfigError {
                    campaign_id: Some(campaign.id),
                    campaign_name: Some(campaign.name.clone()),
                    session_name: inbound.session_name.clone(),
                    reason: format!("handoff target unavailable: {e}"),
                    timestamp: chrono::Utc::now().timestamp(),
                }));
            }
        }
        Ok(())
    }
}
