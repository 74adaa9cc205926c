//! In-memory implementations of the store traits.
//!
//! The durable relational record (Postgres) lives behind the same traits
//! in its own adapter; the engine itself only ever speaks to the traits.
//! These implementations back tests and single-node deployments.

use async_trait::async_trait;
use funil_core::{Campaign, CampaignStatus, CampaignStore, ConversationState, StateStore};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<(Uuid, String), ConversationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(
        &self,
        campaign_id: Uuid,
        chat_id: &str,
    ) -> anyhow::Result<Option<ConversationState>> {
        let states = self.states.read().await;
        Ok(states.get(&(campaign_id, chat_id.to_string())).cloned())
    }

    async fn save(&self, state: &ConversationState) -> anyhow::Result<()> {
        let mut states = self.states.write().await;
        states.insert(
            (state.campaign_id, state.chat_id.clone()),
            state.clone(),
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCampaignStore {
    campaigns: RwLock<HashMap<Uuid, Campaign>>,
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn list(&self) -> anyhow::Result<Vec<Campaign>> {
        let campaigns = self.campaigns.read().await;
        Ok(campaigns.values().cloned().collect())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Campaign>> {
        let campaigns = self.campaigns.read().await;
        Ok(campaigns.get(&id).cloned())
    }

    async fn upsert(&self, campaign: Campaign) -> anyhow::Result<()> {
        let mut campaigns = self.campaigns.write().await;
        campaigns.insert(campaign.id, campaign);
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: CampaignStatus) -> anyhow::Result<()> {
        let mut campaigns = self.campaigns.write().await;
        match campaigns.get_mut(&id) {
            Some(campaign) => {
                campaign.status = status;
                Ok(())
            }
            None => anyhow::bail!("campaign {} not found", id),
        }
    }
}
