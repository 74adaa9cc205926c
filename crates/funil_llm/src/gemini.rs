//! Gemini generateContent client.
//!
//! The literal API key "mock" switches the client into offline mode: a
//! short sleep and a canned reply, so the full pipeline can run without
//! credentials (demos, CI).

use anyhow::{Context, Result};
use async_trait::async_trait;
use funil_core::config::LlmConfig;
use funil_core::retry::{with_backoff, Fault, RetryConfig};
use funil_core::{ChatModel, GenerationParams, Reply, Role, TokenUsage, Turn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            retry: RetryConfig::default(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

/// Build the generateContent request body. Gemini expects alternating
/// user/model turns and a separate system instruction block.
fn build_request_body(system: &str, history: &[Turn], params: &GenerationParams) -> Value {
    let contents: Vec<Value> = history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({"role": role, "parts": [{"text": turn.text}]})
        })
        .collect();

    json!({
        "system_instruction": {"parts": [{"text": system}]},
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": params.max_tokens,
            "temperature": params.temperature,
        }
    })
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

fn parse_response(response: GenerateContentResponse) -> Reply {
    let text = response
        .candidates
        .first()
        .map(|c| {
            c.content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let usage = response.usage_metadata.unwrap_or_default();
    Reply {
        text,
        usage: TokenUsage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        },
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(
        &self,
        system: &str,
        history: &[Turn],
        params: GenerationParams,
    ) -> Result<Reply> {
        if self.api_key == "mock" {
            tokio::time::sleep(Duration::from_millis(200)).await;
            return Ok(Reply {
                text: "(Mock Gemini response) I received your prompt.".to_string(),
                usage: TokenUsage::default(),
            });
        }

        let body = build_request_body(system, history, &params);
        let url = self.endpoint();

        let response = with_backoff(&self.retry, "gemini", || async {
            let result = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .context("Gemini request failed");
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        Ok(response)
                    } else {
                        let error_text = response.text().await.unwrap_or_default();
                        let err =
                            anyhow::anyhow!("Gemini API error ({}): {}", status, error_text);
                        if is_retryable_status(status) {
                            Err(Fault::Transient(err))
                        } else {
                            Err(Fault::Fatal(err))
                        }
                    }
                }
                // Network errors (timeout, DNS, connection refused).
                Err(e) => Err(Fault::Transient(e)),
            }
        })
        .await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("Gemini response was not valid JSON")?;
        let reply = parse_response(parsed);
        tracing::debug!(
            input_tokens = reply.usage.input_tokens,
            output_tokens = reply.usage.output_tokens,
            "gemini call complete"
        );
        Ok(reply)
    }
}
