//! Outbound dispatcher.
//!
//! Flushes the actions produced by a pass, in emission order, against
//! the transport adapter, and forwards alerts to the real-time channel.
//! Transport failures retry with backoff; a permanently failed send is
//! logged and dropped — the lead simply does not receive that turn, and
//! the conversation does not advance past awaiting their reply.

use funil_core::retry::{with_backoff, Fault, RetryConfig};
use funil_core::{OutboundAction, Realtime, RealtimeEvent, Transport};
use std::sync::Arc;

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    realtime: Arc<dyn Realtime>,
    retry: RetryConfig,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, realtime: Arc<dyn Realtime>) -> Self {
        Self {
            transport,
            realtime,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Dispatch actions in the order the nodes produced them. Never
    /// fails: each action is attempted regardless of earlier failures.
    pub async fn flush(&self, actions: Vec<OutboundAction>) {
        for action in actions {
            match action {
                OutboundAction::SendText {
                    session,
                    chat_id,
                    text,
                } => {
                    let result = with_backoff(&self.retry, "waha sendText", || async {
                        self.transport
                            .send_text(&session, &chat_id, &text)
                            .await
                            .map_err(Fault::Transient)
                    })
                    .await;
                    if let Err(e) = result {
                        tracing::error!(
                            session,
                            chat_id,
                            "dropping outbound text after retries: {}",
                            e
                        );
                    }
                }
                OutboundAction::SetPresence {
                    session,
                    chat_id,
                    presence,
                } => {
                    // Presence is cosmetic; one attempt, no retry.
                    if let Err(e) = self
                        .transport
                        .set_presence(&session, &chat_id, presence)
                        .await
                    {
                        tracing::debug!(session, chat_id, "presence update failed: {}", e);
                    }
                }
                OutboundAction::Alert(event) => self.publish_alert(event),
            }
        }
    }

    pub fn publish_alert(&self, event: RealtimeEvent) {
        self.realtime.publish(event);
    }
}
