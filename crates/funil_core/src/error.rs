use thiserror::Error;
use uuid::Uuid;

/// Session-to-campaign resolution failures. These are configuration
/// problems, not runtime faults, and are surfaced to operators.
#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    #[error("session name must not be empty")]
    EmptySession,

    #[error("no active campaign bound to session '{0}'")]
    NotFound(String),

    #[error("{count} active campaigns bound to session '{session}'")]
    Ambiguous { session: String, count: usize },

    #[error("session '{session}' is already bound to active campaign {bound}")]
    AlreadyBound { session: String, bound: Uuid },

    #[error("campaign {0} not found or not active")]
    UnknownCampaign(Uuid),
}

/// Engine-level error taxonomy. Node-level failures never cross the pass
/// boundary; a pass always completes with its state either advanced,
/// awaiting, or frozen at the last good node.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("duplicate event '{provider_message_id}' on session '{session}'")]
    DuplicateEvent {
        session: String,
        provider_message_id: String,
    },

    #[error("graph configuration error: {0}")]
    GraphConfig(String),

    #[error("transient provider failure: {0}")]
    ProviderTransient(String),

    #[error("invalid inbound payload: {0}")]
    Validation(String),
}
