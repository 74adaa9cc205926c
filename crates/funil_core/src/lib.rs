pub mod campaign;
pub mod config;
pub mod error;
pub mod graph;
pub mod pad;
pub mod retry;
pub mod sentiment;
pub mod state;

pub use campaign::{Campaign, CampaignStatus};
pub use config::FunilConfig;
pub use error::{EngineError, RoutingError};
pub use graph::{CampaignGraph, Edge, Node, NodeKind};
pub use pad::{Band, Pad};
pub use state::{ConversationState, Phase, Role, Turn};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical inbound chat event, normalized from the provider payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub session_name: String,
    pub chat_id: String,
    pub from_me: bool,
    pub body: String,
    pub provider_message_id: String,
    pub referral: Option<Referral>,
    pub timestamp: i64, // Unix timestamp
}

/// Ad-click metadata attached by the provider when a contact arrives
/// through a click-to-WhatsApp advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub source_id: String,
    #[serde(default)]
    pub headline: Option<String>,
}

/// How the contact reached this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Organic,
    AdReferral,
}

impl InboundMessage {
    pub fn origin(&self) -> Origin {
        if self.referral.is_some() {
            Origin::AdReferral
        } else {
            Origin::Organic
        }
    }
}

/// Chat presence states the transport can signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Typing,
    Paused,
}

/// Actions produced by one interpreter pass, dispatched in emission order.
#[derive(Debug, Clone)]
pub enum OutboundAction {
    SendText {
        session: String,
        chat_id: String,
        text: String,
    },
    SetPresence {
        session: String,
        chat_id: String,
        presence: Presence,
    },
    Alert(RealtimeEvent),
}

/// Events pushed to the operator UI over the real-time channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RealtimeEvent {
    #[serde(rename = "agent.config_error")]
    AgentConfigError {
        campaign_id: Option<Uuid>,
        campaign_name: Option<String>,
        session_name: String,
        reason: String,
        timestamp: i64,
    },
    #[serde(rename = "conversation.closed")]
    ConversationClosed {
        campaign_id: Uuid,
        chat_id: String,
        final_status: String,
        timestamp: i64,
    },
    #[serde(rename = "conversation.handoff")]
    ConversationHandoff {
        from_campaign_id: Uuid,
        to_campaign_id: Uuid,
        chat_id: String,
        timestamp: i64,
    },
}

/// Reply from the generative model, with token accounting.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Sampling parameters for a single generation call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, session: &str, chat_id: &str, text: &str) -> anyhow::Result<()>;
    async fn set_presence(
        &self,
        session: &str,
        chat_id: &str,
        presence: Presence,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        history: &[Turn],
        params: GenerationParams,
    ) -> anyhow::Result<Reply>;
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, campaign_id: Uuid, chat_id: &str)
        -> anyhow::Result<Option<ConversationState>>;
    async fn save(&self, state: &ConversationState) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Campaign>>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Campaign>>;
    async fn upsert(&self, campaign: Campaign) -> anyhow::Result<()>;
    async fn set_status(&self, id: Uuid, status: CampaignStatus) -> anyhow::Result<()>;
}

/// Best-effort push channel to the operator UI.
pub trait Realtime: Send + Sync {
    fn publish(&self, event: RealtimeEvent);
}
