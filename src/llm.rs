//! Chat model abstraction.
//!
//! The assistant and the notifier only need two things from an LLM: free
//! text, and JSON that follows a response schema. [`ChatModel`] captures
//! exactly that; [`GeminiChat`] implements it over the Gemini
//! `generateContent` endpoint using `responseSchema` for structured output.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::http;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A single-turn prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
        }
    }

    pub fn with_system(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: user.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate free text.
    async fn generate(&self, prompt: &Prompt, temperature: f32) -> Result<String>;

    /// Generate a JSON value conforming to `schema` (OpenAPI-style subset).
    async fn generate_json(&self, prompt: &Prompt, schema: &Value, temperature: f32)
        -> Result<Value>;
}

/// Run a structured-output call and deserialize the result.
pub async fn structured<T: DeserializeOwned>(
    model: &dyn ChatModel,
    prompt: &Prompt,
    schema: &Value,
    temperature: f32,
) -> Result<T> {
    let value = model.generate_json(prompt, schema, temperature).await?;
    Ok(serde_json::from_value(value)?)
}

// ============ Disabled ============

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &Prompt, _temperature: f32) -> Result<String> {
        bail!("LLM provider is disabled")
    }

    async fn generate_json(
        &self,
        _prompt: &Prompt,
        _schema: &Value,
        _temperature: f32,
    ) -> Result<Value> {
        bail!("LLM provider is disabled")
    }
}

// ============ Gemini ============

pub struct GeminiChat {
    model: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.trim_start_matches("models/").to_string(),
            api_key: http::api_key(&config.api_key_env)?,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn call(&self, body: Value) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", GEMINI_BASE, self.model);
        let json = http::post_json(
            &self.client,
            &url,
            &[("x-goog-api-key", self.api_key.as_str())],
            &body,
            self.max_retries,
            "Gemini",
        )
        .await?;
        parse_candidate_text(&json)
    }
}

fn request_body(prompt: &Prompt, generation_config: Value) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
        "generationConfig": generation_config,
    });
    if let Some(system) = &prompt.system {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

/// Concatenates the text parts of the first candidate.
fn parse_candidate_text(json: &Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            anyhow::anyhow!("Invalid Gemini response: {}", reason)
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        bail!("Gemini returned an empty response");
    }
    Ok(text)
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, temperature: f32) -> Result<String> {
        let body = request_body(prompt, json!({ "temperature": temperature }));
        Ok(self.call(body).await?.trim().to_string())
    }

    async fn generate_json(
        &self,
        prompt: &Prompt,
        schema: &Value,
        temperature: f32,
    ) -> Result<Value> {
        let body = request_body(
            prompt,
            json!({
                "temperature": temperature,
                "responseMimeType": "application/json",
                "responseSchema": schema,
            }),
        );
        let text = self.call(body).await?;
        serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| anyhow::anyhow!("Gemini returned invalid JSON: {}", e))
    }
}

/// Models occasionally wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledChat)),
        "gemini" => Ok(Box::new(GeminiChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
