//! Engine facade: the full inbound pipeline behind one call.
//!
//! `handle_inbound` runs guard → router → interpreter → dispatcher. The
//! idempotency check happens before any state mutation, and routing
//! failures are converted into drops (plus an operator alert for the
//! ambiguous case) rather than errors — provider traffic must always be
//! acknowledged.

use crate::dedup::IdempotencyGuard;
use crate::dispatch::Dispatcher;
use crate::interpreter::Interpreter;
use crate::nodes::NodeExecutors;
use crate::router::SessionRouter;
use funil_core::config::EngineTuning;
use funil_core::{
    CampaignStore, ChatModel, GenerationParams, InboundMessage, Realtime, RealtimeEvent,
    RoutingError, StateStore, Transport,
};
use std::sync::Arc;
use std::time::Duration;

pub struct Engine {
    guard: IdempotencyGuard,
    router: Arc<SessionRouter>,
    interpreter: Interpreter,
    dispatcher: Dispatcher,
}

impl Engine {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        states: Arc<dyn StateStore>,
        transport: Arc<dyn Transport>,
        model: Arc<dyn ChatModel>,
        realtime: Arc<dyn Realtime>,
        tuning: EngineTuning,
        params: GenerationParams,
    ) -> Self {
        let router = Arc::new(SessionRouter::new(campaigns));
        let executors = NodeExecutors::new(model, tuning.clone(), params);
        let interpreter = Interpreter::new(states, router.clone(), executors, tuning.clone());
        let dispatcher = Dispatcher::new(transport, realtime);
        Self {
            guard: IdempotencyGuard::new(Duration::from_secs(tuning.dedup_retention_secs)),
            router,
            interpreter,
            dispatcher,
        }
    }

    /// The session routing table, exposed for campaign lifecycle
    /// operations (activation, invalidation after edits).
    pub fn router(&self) -> Arc<SessionRouter> {
        self.router.clone()
    }

    /// Process one normalized inbound event end to end.
    pub async fn handle_inbound(&self, inbound: InboundMessage) -> anyhow::Result<()> {
        if inbound.from_me {
            tracing::trace!("ignoring own outbound echo");
            return Ok(());
        }
        if inbound.session_name.is_empty() || inbound.chat_id.is_empty() {
            tracing::warn!("dropping inbound with empty session or chat id");
            return Ok(());
        }

        // Deduplicate before touching any conversation state.
        if !self
            .guard
            .admit(&inbound.session_name, &inbound.provider_message_id)
        {
            tracing::debug!(
                session = %inbound.session_name,
                message_id = %inbound.provider_message_id,
                "duplicate delivery; ignoring"
            );
            return Ok(());
        }

        let campaign = match self
            .router
            .resolve_chat(&inbound.session_name, &inbound.chat_id)
            .await
        {
            Ok(campaign) => campaign,
            Err(e @ RoutingError::Ambiguous { .. }) => {
                tracing::warn!(session = %inbound.session_name, "{}", e);
                self.dispatcher.publish_alert(RealtimeEvent::AgentConfigError {
                    campaign_id: None,
                    campaign_name: None,
                    session_name: inbound.session_name.clone(),
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now().timestamp(),
                });
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(session = %inbound.session_name, "unroutable inbound: {}", e);
                return Ok(());
            }
        };

        let actions = self.interpreter.process(campaign, &inbound).await?;
        self.dispatcher.flush(actions).await;
        Ok(())
    }
}
