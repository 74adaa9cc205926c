use crate::graph::CampaignGraph;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

fn default_reentry() -> bool {
    true
}

/// A tenant-configured automation bound to one WhatsApp session, carrying
/// one published graph. At most one active campaign may bind a session at
/// a time; the session router enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub session_name: String,
    /// Whether a message arriving after a closing node restarts the
    /// conversation at the entry trigger. When false such messages are
    /// acknowledged and ignored.
    #[serde(default = "default_reentry")]
    pub reentry: bool,
    pub graph: CampaignGraph,
}

impl Campaign {
    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }

    /// Whether the campaign holds a session binding. Paused campaigns
    /// stay bound so inbound traffic is still acknowledged and deduped.
    pub fn is_routable(&self) -> bool {
        matches!(self.status, CampaignStatus::Active | CampaignStatus::Paused)
    }
}
