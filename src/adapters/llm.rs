//! Chat-completion client used to generate trading signals
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. The prompt is a
//! fixed template filled with the latest prices and spikes; the reply must
//! contain a single JSON object describing the signal.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::domain::{PricePoint, SignalDraft, Spike};
use crate::error::{GorillionaireError, Result};

/// Market context handed to the model
#[derive(Debug, Clone, Default)]
pub struct SignalContext {
    pub prices: Vec<PricePoint>,
    pub spikes: Vec<Spike>,
}

#[async_trait]
pub trait SignalModel: Send + Sync {
    async fn generate(&self, context: &SignalContext) -> Result<SignalDraft>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

const SYSTEM_PROMPT: &str = "You are a crypto trading analyst. \
Answer with exactly one JSON object and nothing else: \
{\"symbol\": string, \"action\": \"BUY\" | \"SELL\", \"confidence\": number between 0 and 1, \"reasoning\": string}.";

/// Render the user prompt for a context
pub fn build_prompt(context: &SignalContext) -> String {
    let mut prompt = String::from("Latest prices (USD):\n");
    if context.prices.is_empty() {
        prompt.push_str("- none available\n");
    }
    for price in &context.prices {
        let _ = writeln!(prompt, "- {}: {}", price.symbol, price.price_usd);
    }

    prompt.push_str("\nTransfer activity spikes in the last hour:\n");
    if context.spikes.is_empty() {
        prompt.push_str("- none\n");
    }
    for spike in &context.spikes {
        let _ = writeln!(
            prompt,
            "- {} ({}): {} -> {} transfers (+{:.1}%) over {}s",
            spike.token_symbol,
            spike.token_address,
            spike.previous_count,
            spike.current_count,
            spike.change_pct,
            spike.window_secs
        );
    }

    prompt.push_str("\nPick the single best trade among the listed tokens.");
    prompt
}

/// Pull the JSON object out of a model reply, tolerating code fences and prose
pub fn parse_draft(reply: &str) -> Result<SignalDraft> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &reply[s..=e],
        _ => {
            return Err(GorillionaireError::upstream(
                "llm",
                "reply does not contain a JSON object",
            ))
        }
    };

    serde_json::from_str::<SignalDraft>(json)
        .map_err(|e| GorillionaireError::upstream("llm", format!("unparseable signal: {}", e)))
}

/// OpenAI-compatible chat client
pub struct ChatSignalModel {
    config: LlmConfig,
    http: Client,
}

impl ChatSignalModel {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GorillionaireError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn chat(&self, prompt: &str) -> Result<String> {
        if !self.is_configured() {
            return Err(GorillionaireError::NotConfigured(
                "LLM API key not configured".to_string(),
            ));
        }

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: 500,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!("Sending signal request to {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API error: {} - {}", status, body);
            return Err(GorillionaireError::upstream(
                "llm",
                format!("chat completion returned {}", status),
            ));
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GorillionaireError::upstream("llm", "empty choices"))
    }
}

#[async_trait]
impl SignalModel for ChatSignalModel {
    async fn generate(&self, context: &SignalContext) -> Result<SignalDraft> {
        let reply = self.chat(&build_prompt(context)).await?;
        parse_draft(&reply)
    }
}
