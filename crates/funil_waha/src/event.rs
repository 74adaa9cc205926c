//! WAHA webhook payload types and the event normalizer.
//!
//! Maps provider-shaped JSON into the canonical `InboundMessage`.
//! Unknown event types normalize to `None` — they must be acknowledged,
//! never rejected, to avoid provider retry storms.

use funil_core::{EngineError, InboundMessage, Referral};
use serde::{Deserialize, Serialize};

/// Envelope delivered to `POST /webhook/waha`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WahaWebhookEvent {
    pub event: String,
    pub session: String,
    pub payload: serde_json::Value,
}

/// The message-shaped payload WAHA sends for `message` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub body: String,
    pub timestamp: i64,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
    #[serde(default)]
    pub referral: Option<ReferralPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralPayload {
    #[serde(rename = "sourceId")]
    pub source_id: String,
    #[serde(default)]
    pub headline: Option<String>,
}

/// Normalize one webhook event.
///
/// `Ok(None)` means a non-message event (status updates, acks, ...) the
/// engine does not consume; `Err` means a message event whose payload
/// is malformed — dropped with ack, not retried.
pub fn normalize(event: WahaWebhookEvent) -> Result<Option<InboundMessage>, EngineError> {
    match event.event.as_str() {
        "message" | "message.any" => {
            let payload: MessagePayload = serde_json::from_value(event.payload)
                .map_err(|e| EngineError::Validation(format!("malformed message payload: {e}")))?;
            Ok(Some(InboundMessage {
                session_name: event.session,
                chat_id: payload.from,
                from_me: payload.from_me,
                body: payload.body,
                provider_message_id: payload.id,
                referral: payload.referral.map(|r| Referral {
                    source_id: r.source_id,
                    headline: r.headline,
                }),
                timestamp: payload.timestamp,
            }))
        }
        other => {
            tracing::trace!(event = other, "ignoring non-message webhook event");
            Ok(None)
        }
    }
}
