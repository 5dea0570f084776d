//! Grok (xAI) integration.
//!
//! The xAI API is OpenAI-compatible, so this is a chat-completions client
//! pointed at `api.x.ai` with live search switched on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ModelProvider, SYSTEM_PROMPT};
use crate::types::Provider;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const XAI_API_URL: &str = "https://api.x.ai/v1/chat/completions";
const DEFAULT_MODEL: &str = "grok-4";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f64 = 0.2;
const DEFAULT_SEED: u64 = 12345;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    seed: u64,
    messages: Vec<ChatMessage>,
    search_parameters: SearchParameters,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct SearchParameters {
    mode: String,
    sources: Vec<SearchSource>,
}

#[derive(Debug, Serialize)]
struct SearchSource {
    #[serde(rename = "type")]
    source_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GrokClient {
    http: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    seed: u64,
}

impl GrokClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f64>,
        seed: Option<u64>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .context("Failed to build xAI HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            seed: seed.unwrap_or(DEFAULT_SEED),
        })
    }

    fn build_request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            seed: self.seed,
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
            search_parameters: SearchParameters {
                mode: "on".to_string(),
                sources: ["x", "news", "web"]
                    .into_iter()
                    .map(|s| SearchSource {
                        source_type: s.to_string(),
                    })
                    .collect(),
            },
        }
    }
}

#[async_trait]
impl ModelProvider for GrokClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = self.build_request(prompt);
        debug!(model = %self.model, "Sending xAI chat request");

        let response = self
            .http
            .post(XAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("xAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("xAI API error {status}: {error_text}");
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse xAI response")?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default())
    }

    fn provider(&self) -> Provider {
        Provider::Xai
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let client = GrokClient::new("key".into(), None, None, None, None).unwrap();
        assert_eq!(client.model_name(), "grok-4");
        assert_eq!(client.provider(), Provider::Xai);
        assert!((client.temperature - 0.2).abs() < 1e-12);
        assert_eq!(client.seed, 12345);
    }

    #[test]
    fn test_request_enables_search() {
        let client = GrokClient::new("key".into(), None, Some(256), Some(0.0), Some(7)).unwrap();
        let json = serde_json::to_value(client.build_request("predict")).unwrap();
        assert_eq!(json["search_parameters"]["mode"], "on");
        assert_eq!(json["search_parameters"]["sources"][1]["type"], "news");
        assert_eq!(json["messages"][1]["content"], "predict");
        assert_eq!(json["seed"], 7);
        assert_eq!(json["max_tokens"], 256);
    }
}
