//! Answer generation through hosted chat-completion models.
//!
//! [`ChatModel`] takes a fully rendered prompt and returns the model's text
//! verbatim. Providers mirror the embedding side: Gemini (default,
//! `gemini-2.5-flash`), OpenAI chat completions, and Ollama `/api/chat`.
//! Every provider sends the prompt as a single user turn.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::upstream::{join_url, resolve_api_key, UpstreamClient};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// A text-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Create the [`ChatModel`] selected by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Gemini ============

pub struct GeminiChat {
    http: UpstreamClient,
    model: String,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
}

impl GeminiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "gemini-2.5-flash".to_string());
        Ok(Self {
            http: UpstreamClient::new("Gemini", config.timeout_secs, config.max_retries)?,
            model: model.trim_start_matches("models/").to_string(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: resolve_api_key(config.api_key_env.as_deref(), "GOOGLE_API_KEY")?,
            temperature: config.temperature,
        })
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_reply(json: &serde_json::Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let Some(candidate) = candidate else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
            .unwrap_or("no candidates returned");
        bail!("Gemini returned no answer: {}", reason);
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing content parts"))?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        if let Some(t) = self.temperature {
            body["generationConfig"] = serde_json::json!({ "temperature": t });
        }
        let url = join_url(
            &self.base_url,
            &format!("v1beta/models/{}:generateContent", self.model),
        );
        let json = self
            .http
            .post_json(&url, &[("x-goog-api-key", self.api_key.as_str())], &body)
            .await?;
        parse_gemini_reply(&json)
    }
}

// ============ OpenAI ============

pub struct OpenAIChat {
    http: UpstreamClient,
    model: String,
    base_url: String,
    auth_header: String,
    temperature: Option<f32>,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(config.api_key_env.as_deref(), "OPENAI_API_KEY")?;
        Ok(Self {
            http: UpstreamClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            auth_header: format!("Bearer {}", api_key),
            temperature: config.temperature,
        })
    }
}

fn parse_openai_reply(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        let json = self
            .http
            .post_json(
                &join_url(&self.base_url, "v1/chat/completions"),
                &[("Authorization", self.auth_header.as_str())],
                &body,
            )
            .await?;
        parse_openai_reply(&json)
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    http: UpstreamClient,
    model: String,
    url: String,
    temperature: Option<f32>,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http: UpstreamClient::new("Ollama", config.timeout_secs, config.max_retries)?,
            model: config.model.clone().unwrap_or_else(|| "llama3.2".to_string()),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            temperature: config.temperature,
        })
    }
}

fn parse_ollama_reply(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = serde_json::json!({ "temperature": t });
        }
        let json = self
            .http
            .post_json(&join_url(&self.url, "api/chat"), &[], &body)
            .await
            .map_err(|e| anyhow!("{} (is Ollama running at {}?)", e, self.url))?;
        parse_ollama_reply(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_reply_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [ { "text": "Paris" }, { "text": " is the capital." } ] }
            }]
        });
        assert_eq!(parse_gemini_reply(&json).unwrap(), "Paris is the capital.");
    }

    #[test]
    fn test_gemini_reply_blocked() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_gemini_reply(&json).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_openai_reply() {
        let json = serde_json::json!({
            "choices": [ { "message": { "role": "assistant", "content": "I don't know." } } ]
        });
        assert_eq!(parse_openai_reply(&json).unwrap(), "I don't know.");
        assert!(parse_openai_reply(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_ollama_reply() {
        let json = serde_json::json!({ "message": { "role": "assistant", "content": "42" } });
        assert_eq!(parse_ollama_reply(&json).unwrap(), "42");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "eliza".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_chat_model(&config).is_err());
    }
}
