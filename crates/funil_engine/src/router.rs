//! Session-to-campaign routing.
//!
//! Holds a queryable index from session name to the single active
//! campaign bound to it, rebuilt from the campaign store — never cached
//! indefinitely. Any campaign status change must call `invalidate()`.
//!
//! Handoff nodes rebind individual chats to another campaign; those
//! chat-level overrides live here too, consulted before the session
//! binding.

use arc_swap::ArcSwap;
use funil_core::{Campaign, CampaignStatus, CampaignStore, RoutingError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type SessionIndex = HashMap<String, Vec<Arc<Campaign>>>;

pub struct SessionRouter {
    campaigns: Arc<dyn CampaignStore>,
    /// session name → active campaigns. Swapped atomically on rebuild so
    /// readers never see a partially built index.
    index: ArcSwap<SessionIndex>,
    /// (session, chat) → campaign id overrides created by handoff nodes.
    chat_bindings: RwLock<HashMap<(String, String), Uuid>>,
}

impl SessionRouter {
    pub fn new(campaigns: Arc<dyn CampaignStore>) -> Self {
        Self {
            campaigns,
            index: ArcSwap::from_pointee(SessionIndex::new()),
            chat_bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild the session index from the store. Paused campaigns keep
    /// their binding — they still accept (and acknowledge) traffic, the
    /// interpreter just declines to execute node logic for them.
    pub async fn rebuild(&self) -> anyhow::Result<()> {
        let mut index = SessionIndex::new();
        for campaign in self.campaigns.list().await? {
            if campaign.is_routable() {
                index
                    .entry(campaign.session_name.clone())
                    .or_default()
                    .push(Arc::new(campaign));
            }
        }
        for group in index.values_mut() {
            group.sort_by_key(|c| c.id);
        }
        self.index.store(Arc::new(index));
        Ok(())
    }

    /// Call after any campaign status change.
    pub async fn invalidate(&self) -> anyhow::Result<()> {
        self.rebuild().await
    }

    /// Resolve the single active campaign bound to a session. No side
    /// effects; zero matches and multiple matches are both routing
    /// errors the caller surfaces.
    pub fn resolve(&self, session_name: &str) -> Result<Arc<Campaign>, RoutingError> {
        if session_name.is_empty() {
            return Err(RoutingError::EmptySession);
        }
        let index = self.index.load();
        let Some(bound) = index.get(session_name).filter(|g| !g.is_empty()) else {
            return Err(RoutingError::NotFound(session_name.to_string()));
        };
        let actives: Vec<&Arc<Campaign>> = bound.iter().filter(|c| c.is_active()).collect();
        match actives.as_slice() {
            [single] => Ok(Arc::clone(single)),
            // Only paused bindings: route to the first so the pass-entry
            // pause check acknowledges the traffic.
            [] => Ok(Arc::clone(&bound[0])),
            many => Err(RoutingError::Ambiguous {
                session: session_name.to_string(),
                count: many.len(),
            }),
        }
    }

    /// Resolve for a specific chat: a handoff override takes precedence
    /// over the session binding. A stale override (target no longer
    /// active) is cleared and routing falls back to the session.
    pub async fn resolve_chat(
        &self,
        session_name: &str,
        chat_id: &str,
    ) -> Result<Arc<Campaign>, RoutingError> {
        let key = (session_name.to_string(), chat_id.to_string());
        let bound = {
            let bindings = self.chat_bindings.read().await;
            bindings.get(&key).copied()
        };
        if let Some(campaign_id) = bound {
            match self.active_campaign(campaign_id).await {
                Ok(campaign) => return Ok(campaign),
                Err(_) => {
                    tracing::warn!(
                        %campaign_id,
                        chat_id,
                        "chat binding targets an inactive campaign; falling back to session routing"
                    );
                    self.chat_bindings.write().await.remove(&key);
                }
            }
        }
        self.resolve(session_name)
    }

    /// Rebind a chat to another campaign (handoff).
    pub async fn bind_chat(
        &self,
        session_name: &str,
        chat_id: &str,
        campaign_id: Uuid,
    ) -> Result<Arc<Campaign>, RoutingError> {
        let campaign = self.active_campaign(campaign_id).await?;
        let mut bindings = self.chat_bindings.write().await;
        bindings.insert(
            (session_name.to_string(), chat_id.to_string()),
            campaign_id,
        );
        Ok(campaign)
    }

    /// Look up a campaign by id, requiring it to be active.
    pub async fn active_campaign(&self, campaign_id: Uuid) -> Result<Arc<Campaign>, RoutingError> {
        match self.campaigns.get(campaign_id).await {
            Ok(Some(campaign)) if campaign.is_active() => Ok(Arc::new(campaign)),
            Ok(_) => Err(RoutingError::UnknownCampaign(campaign_id)),
            Err(e) => {
                tracing::error!("campaign store lookup failed: {}", e);
                Err(RoutingError::UnknownCampaign(campaign_id))
            }
        }
    }

    /// Activate a campaign, enforcing the single-active-binding
    /// invariant: if another active campaign already binds the session,
    /// activation fails and the existing binding is left untouched.
    pub async fn activate(&self, campaign_id: Uuid) -> anyhow::Result<()> {
        let campaign = self
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or(RoutingError::UnknownCampaign(campaign_id))?;

        for other in self.campaigns.list().await? {
            if other.id != campaign_id
                && other.is_active()
                && other.session_name == campaign.session_name
            {
                return Err(RoutingError::AlreadyBound {
                    session: campaign.session_name,
                    bound: other.id,
                }
                .into());
            }
        }

        self.campaigns
            .set_status(campaign_id, CampaignStatus::Active)
            .await?;
        self.invalidate().await
    }
}
