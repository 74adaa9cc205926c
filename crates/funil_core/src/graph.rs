//! Campaign graph: an arena of typed nodes plus an adjacency index of
//! edges grouped by source. Nodes never hold direct pointers to each
//! other, so the structure stays serializable and cycle handling reduces
//! to the interpreter's iteration cap.
//!
//! The persisted wire format matches the dashboard's flow editor:
//! `{nodes: [{id, type, position, data}], edges: [{id, source,
//! sourceHandle?, target, type}]}`. `position` and the visual edge `type`
//! (e.g. "smoothstep") are carried through round-trips but ignored by the
//! interpreter; only `data` and topology are load-bearing.

use crate::Origin;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Well-known branch handles.
pub mod handle {
    pub const TRUE: &str = "true";
    pub const FALSE: &str = "false";
    pub const QUALIFIED: &str = "qualified";
    pub const FALLBACK: &str = "fallback";
    pub const ERROR: &str = "error";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Flow-editor coordinates. Presentation-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<serde_json::Value>,
}

/// Closed set of node types. Each variant carries its strictly-typed
/// config payload; dispatch is an exhaustive match, so adding a node type
/// is a compile-time-checked change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum NodeKind {
    Trigger(TriggerConfig),
    Broadcast(BroadcastConfig),
    Agentic(AgenticConfig),
    Logic(LogicConfig),
    Qualification(QualificationConfig),
    Handoff(HandoffConfig),
    Closing(ClosingConfig),
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Trigger(_) => "trigger",
            NodeKind::Broadcast(_) => "broadcast",
            NodeKind::Agentic(_) => "agentic",
            NodeKind::Logic(_) => "logic",
            NodeKind::Qualification(_) => "qualification",
            NodeKind::Handoff(_) => "handoff",
            NodeKind::Closing(_) => "closing",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Origins this trigger accepts. Empty accepts everything.
    pub allowed_sources: Vec<Origin>,
}

impl TriggerConfig {
    pub fn accepts(&self, origin: Origin) -> bool {
        self.allowed_sources.is_empty() || self.allowed_sources.contains(&origin)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Message template: `{{var}}` substitution plus `{a|b|c}` spintax.
    pub message: String,
    /// Signal a typing presence before the text goes out.
    pub typing: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgenticConfig {
    /// Variable that receives the model output.
    pub variable: String,
    /// The agent's static instructions ("DNA").
    pub instructions: String,
    /// Per-node system prompt override, appended after the DNA.
    pub system_prompt: Option<String>,
    /// When true the node's output drives an immediate branch decision
    /// (`Continue`); otherwise the pass awaits the user's next reply.
    pub decide_immediately: bool,
    /// When true the model output is also sent to the lead as a message.
    pub send_reply: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicConfig {
    pub variable: String,
    #[serde(default)]
    pub op: Condition,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Equals,
    NotEquals,
    Contains,
    Matches,
    GreaterThan,
    LessThan,
}

fn default_max_turns() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualificationConfig {
    /// Critical slots that must be filled before the lead qualifies
    /// (budget, authority, need, timeline, ...).
    pub slots: Vec<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Re-prompt sent while slots are missing.
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    pub target_campaign_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosingConfig {
    pub final_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    #[serde(
        rename = "sourceHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
    pub target: String,
    /// Visual edge type from the flow editor. Presentation-only.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

/// Wire representation of a published graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDoc {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Published campaign graph. Immutable once built; edited only through a
/// separate publish path, never mid-pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphDoc", into = "GraphDoc")]
pub struct CampaignGraph {
    nodes: Vec<Node>,
    by_id: HashMap<String, usize>,
    /// Outgoing edges grouped by source node, sorted by edge id so that
    /// tie-breaks are deterministic.
    edges_by_source: HashMap<String, Vec<Edge>>,
}

impl TryFrom<GraphDoc> for CampaignGraph {
    type Error = String;

    fn try_from(doc: GraphDoc) -> Result<Self, Self::Error> {
        let mut by_id = HashMap::with_capacity(doc.nodes.len());
        for (i, node) in doc.nodes.iter().enumerate() {
            if by_id.insert(node.id.clone(), i).is_some() {
                return Err(format!("duplicate node id '{}'", node.id));
            }
        }
        let mut edges_by_source: HashMap<String, Vec<Edge>> = HashMap::new();
        for edge in doc.edges {
            edges_by_source
                .entry(edge.source.clone())
                .or_default()
                .push(edge);
        }
        for group in edges_by_source.values_mut() {
            group.sort_by(|a, b| a.id.cmp(&b.id));
        }
        Ok(Self {
            nodes: doc.nodes,
            by_id,
            edges_by_source,
        })
    }
}

impl From<CampaignGraph> for GraphDoc {
    fn from(graph: CampaignGraph) -> GraphDoc {
        let mut edges: Vec<Edge> = graph
            .edges_by_source
            .into_values()
            .flatten()
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        GraphDoc {
            nodes: graph.nodes,
            edges,
        }
    }
}

impl CampaignGraph {
    pub fn parse(json: &str) -> Result<Self, String> {
        let doc: GraphDoc = serde_json::from_str(json).map_err(|e| e.to_string())?;
        Self::try_from(doc)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.by_id.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The designated entry node for an inbound origin: the first trigger
    /// (in document order) whose `allowed_sources` accept it, falling back
    /// to the first trigger when none specialize.
    pub fn entry_node(&self, origin: Origin) -> Option<&Node> {
        let mut first_trigger = None;
        for node in &self.nodes {
            if let NodeKind::Trigger(cfg) = &node.kind {
                if first_trigger.is_none() {
                    first_trigger = Some(node);
                }
                if cfg.accepts(origin) {
                    return Some(node);
                }
            }
        }
        first_trigger
    }

    pub fn edges_from(&self, source: &str) -> &[Edge] {
        self.edges_by_source
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First outgoing edge whose handle matches, by edge-id lexical order.
    /// Multiple edges on one handle is a graph authoring error; the engine
    /// warns and picks the first rather than blocking traffic.
    pub fn edge_for_handle(&self, source: &str, handle: &str) -> Option<&Edge> {
        let mut matches = self
            .edges_from(source)
            .iter()
            .filter(|e| e.source_handle.as_deref() == Some(handle));
        let first = matches.next();
        if matches.next().is_some() {
            tracing::warn!(
                source,
                handle,
                "multiple edges share one handle; picking first by edge id"
            );
        }
        first
    }

    /// The default successor of a non-branching node: first outgoing edge
    /// by id, regardless of handle.
    pub fn default_edge(&self, source: &str) -> Option<&Edge> {
        let edges = self.edges_from(source);
        if edges.len() > 1 {
            tracing::warn!(
                source,
                count = edges.len(),
                "non-branching node has multiple outgoing edges; picking first by edge id"
            );
        }
        edges.first()
    }

    /// Publish-time lint. Returns human-readable defects; the interpreter
    /// still degrades gracefully (dead-end) when these are ignored.
    pub fn validate(&self) -> Vec<String> {
        let mut defects = Vec::new();
        for node in &self.nodes {
            let terminal = matches!(node.kind, NodeKind::Closing(_) | NodeKind::Handoff(_));
            if !terminal && self.edges_from(&node.id).is_empty() {
                defects.push(format!(
                    "{} node '{}' has no outgoing edge",
                    node.kind.type_name(),
                    node.id
                ));
            }
        }
        for edges in self.edges_by_source.values() {
            for edge in edges {
                if !self.by_id.contains_key(&edge.target) {
                    defects.push(format!(
                        "edge '{}' targets unknown node '{}'",
                        edge.id, edge.target
                    ));
                }
                if !self.by_id.contains_key(&edge.source) {
                    defects.push(format!(
                        "edge '{}' leaves unknown node '{}'",
                        edge.id, edge.source
                    ));
                }
            }
        }
        defects
    }
}
