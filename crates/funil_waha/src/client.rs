//! WAHA REST client.
//!
//! Fire-and-confirm calls against the WhatsApp HTTP API; retry policy is
//! owned by the dispatcher, so each method performs exactly one attempt
//! and reports failures upward.

use anyhow::{Context, Result};
use async_trait::async_trait;
use funil_core::{Presence, Transport};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use url::Url;

pub struct WahaClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl WahaClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url).context("Invalid WAHA base URL")?;
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            base_url,
            api_key,
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid WAHA path")?;
        let mut request = self.client.post(url.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }
        let response = request.send().await.context("WAHA request failed")?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("WAHA {} returned {}: {}", url.path(), status, error_text);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for WahaClient {
    async fn send_text(&self, session: &str, chat_id: &str, text: &str) -> Result<()> {
        self.post(
            "api/sendText",
            json!({
                "session": session,
                "chatId": chat_id,
                "text": text,
            }),
        )
        .await
    }

    async fn set_presence(&self, session: &str, chat_id: &str, presence: Presence) -> Result<()> {
        let presence = match presence {
            Presence::Typing => "typing",
            Presence::Paused => "paused",
        };
        self.post(
            &format!("api/{session}/presence"),
            json!({
                "chatId": chat_id,
                "presence": presence,
            }),
        )
        .await
    }
}
