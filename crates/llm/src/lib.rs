use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Any endpoint speaking the OpenAI chat-completions protocol
    /// (NVIDIA integrate, OpenAI, vLLM, ...).
    #[default]
    #[serde(alias = "nvidia", alias = "openai-compatible")]
    OpenAi,
    /// Deterministic offline responder.
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "openai" | "nvidia" | "openai-compatible" => Some(LlmProvider::OpenAi),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }
}

/// Endpoint settings for the completion API. Built by the caller and handed
/// to [`LlmClient::new`]; nothing here is read from the process environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl LlmConfig {
    pub fn local() -> Self {
        Self {
            provider: LlmProvider::Local,
            model: "local".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    OpenAi(OpenAiConfig),
    Local,
}

#[derive(Clone)]
struct OpenAiConfig {
    api_key: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl LlmClient {
    pub fn new(settings: &LlmConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().context("failed to build http client")?;
        let config = match settings.provider {
            LlmProvider::OpenAi => {
                if settings.model.trim().is_empty() {
                    return Err(anyhow!("llm model name is not configured"));
                }
                if settings.base_url.trim().is_empty() {
                    return Err(anyhow!("llm base url is not configured"));
                }
                let api_key = settings
                    .api_key
                    .clone()
                    .ok_or_else(|| anyhow!("llm api key is not configured"))?;
                validate_api_key(&api_key)?;
                ProviderConfig::OpenAi(OpenAiConfig {
                    api_key,
                    base_url: settings.base_url.clone(),
                    max_tokens: settings.max_tokens,
                    temperature: settings.temperature,
                })
            }
            LlmProvider::Local => ProviderConfig::Local,
        };
        Ok(Self {
            http,
            provider: settings.provider,
            model: settings.model.clone(),
            config,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        match &self.config {
            ProviderConfig::OpenAi(cfg) => self.chat_openai(cfg, req).await,
            ProviderConfig::Local => Ok(self.chat_local(req)),
        }
    }

    async fn chat_openai(&self, cfg: &OpenAiConfig, req: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({"role": "system", "content": system }));
        }
        messages.push(json!({"role": "user", "content": req.user }));
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(max_tokens) = cfg.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = cfg.temperature {
            payload["temperature"] = json!(temperature);
        }
        debug!(model = %self.model, url = %url, "sending chat completion");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("chat completion request to {url} failed"))?;
        let value = decode_openai_body(response).await?;
        let content = extract_openai_text(&value)
            .ok_or_else(|| anyhow!("missing text in chat completion response"))?;
        let usage: OpenAiUsage = value
            .get("usage")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        Ok(LlmResponse {
            content,
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    fn chat_local(&self, req: &LlmRequest) -> LlmResponse {
        let content = synthesize_local_response(req);
        LlmResponse {
            content,
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }
}

/// Marker lines used by retrieval prompts; the local responder answers from
/// the text between them.
pub const CONTEXT_START: &str = "=== CONTEXT START ===";
pub const CONTEXT_END: &str = "=== CONTEXT END ===";

fn synthesize_local_response(req: &LlmRequest) -> String {
    let context = extract_context_block(&req.user, CONTEXT_START, CONTEXT_END);
    let question = extract_context_block(&req.user, "Question:", "Answer:");
    let budget = requested_token_budget(&question).unwrap_or(80).clamp(10, 120);
    if context.is_empty() {
        return summarize_text(&question, budget);
    }
    let passages: String = context
        .lines()
        .filter(|line| !line.starts_with("[SOURCE"))
        .collect::<Vec<&str>>()
        .join(" ");
    summarize_text(&passages, budget)
}

/// Reads "should not exceed N tokens" out of a prompt.
fn requested_token_budget(text: &str) -> Option<usize> {
    let marker = "should not exceed ";
    let idx = text.find(marker)?;
    text[idx + marker.len()..]
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

async fn decode_openai_body(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(format!(
            "chat completion returned error (status {}): {}",
            status, body
        )));
    }
    serde_json::from_str(&body).context("failed to decode chat completion response")
}

fn extract_context_block(text: &str, start_marker: &str, stop_marker: &str) -> String {
    if let Some(start_idx) = text.find(start_marker) {
        let after = &text[start_idx + start_marker.len()..];
        if let Some(end_idx) = after.find(stop_marker) {
            return after[..end_idx].trim().to_string();
        }
        return after.trim().to_string();
    }
    String::new()
}

fn summarize_text(text: &str, max_words: usize) -> String {
    if max_words == 0 {
        return String::new();
    }
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<&str>>()
        .join(" ")
}

fn validate_api_key(value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("llm api key is empty"));
    }
    if trimmed.to_lowercase().starts_with("your ") {
        return Err(anyhow!("llm api key is still the placeholder value"));
    }
    Ok(())
}

fn extract_openai_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if let Some(message) = choice.get("message") {
        if let Some(content) = message.get("content") {
            if let Some(text) = content.as_str() {
                return Some(text.to_string());
            }
            if let Some(parts) = content.as_array() {
                for part in parts {
                    if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                        return Some(text.to_string());
                    }
                }
            }
        }
    }
    choice
        .get("text")
        .and_then(|t| t.as_str())
        .map(|text| text.to_string())
}

#[derive(Default, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}
