//! # Funil Engine
//!
//! The campaign conversation orchestration engine. One inbound WhatsApp
//! event flows through:
//!
//! 1. Idempotency guard — drop provider redeliveries
//! 2. Session router — find the single active campaign for the session
//! 3. Graph interpreter — resume the chat's position and execute typed
//!    nodes until the graph needs fresh input (or terminates)
//! 4. Outbound dispatcher — flush emitted actions in order
//!
//! Each (campaign, chat) pair runs at most one pass at a time; passes for
//! different chats execute in parallel. The interpreter performs no
//! blocking I/O beyond the LLM and transport calls made by node
//! executors.

pub mod dedup;
pub mod dispatch;
pub mod emotion;
pub mod engine;
pub mod interpreter;
pub mod nodes;
pub mod router;
pub mod store;
pub mod template;

pub use dedup::IdempotencyGuard;
pub use dispatch::Dispatcher;
pub use emotion::EmotionalEstimator;
pub use engine::Engine;
pub use interpreter::Interpreter;
pub use nodes::{NodeExecutors, StepOutcome};
pub use router::SessionRouter;
pub use store::{MemoryCampaignStore, MemoryStateStore};
