pub mod client;
pub mod event;

pub use client::WahaClient;
pub use event::{normalize, MessagePayload, WahaWebhookEvent};
