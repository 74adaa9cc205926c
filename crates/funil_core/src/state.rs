//! Per-(campaign, chat) conversation state.
//!
//! Created on the first inbound message, mutated only by the interpreter
//! while holding the chat's pass lock, and never deleted automatically —
//! closing nodes mark it terminal but retain history for audit.

use crate::pad::Pad;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Where the chat currently sits in its campaign's graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// No position yet: first contact, or freshly seeded by a handoff.
    AwaitingEntry,
    /// Resumed position; the previous pass ended on a node that needs
    /// fresh input.
    AtNode { node_id: String },
    /// A closing node was reached.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub campaign_id: Uuid,
    pub chat_id: String,
    pub phase: Phase,
    /// Named outputs accumulated by nodes (e.g. an agent's classification).
    pub variables: BTreeMap<String, String>,
    /// Qualification slot fill state.
    pub slots: BTreeMap<String, bool>,
    /// Turns spent on the current qualification node.
    pub qualification_turns: u32,
    /// Consecutive passes that ended on a graph configuration defect.
    pub config_error_streak: u32,
    pub pad: Pad,
    /// Bounded transcript, newest last.
    pub history: Vec<Turn>,
    pub final_status: Option<String>,
    pub last_activity_at: i64,
}

impl ConversationState {
    pub fn new(campaign_id: Uuid, chat_id: &str) -> Self {
        Self {
            campaign_id,
            chat_id: chat_id.to_string(),
            phase: Phase::AwaitingEntry,
            variables: BTreeMap::new(),
            slots: BTreeMap::new(),
            qualification_turns: 0,
            config_error_streak: 0,
            pad: Pad::default(),
            history: Vec::new(),
            final_status: None,
            last_activity_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }

    /// Append a turn, trimming the transcript to `limit` entries.
    pub fn push_turn(&mut self, role: Role, text: &str, limit: usize) {
        self.history.push(Turn {
            role,
            text: text.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        });
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    /// Reset graph position and accumulated outputs for re-entry after a
    /// closing node. Emotional estimate and transcript carry over — it is
    /// the same human on the other side.
    pub fn reset_for_reentry(&mut self) {
        self.phase = Phase::AwaitingEntry;
        self.variables.clear();
        self.slots.clear();
        self.qualification_turns = 0;
        self.config_error_streak = 0;
        self.final_status = None;
    }
}
