//! Chat-completions backend.
//!
//! Talks to any service exposing the OpenAI-compatible `/chat/completions`
//! endpoint and exposes the hosted JSON-mode switch (`response_format`).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::{
    error::{Result, ResultExt, StructuredError},
    generator::TextGenerator,
    schema::Schema,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Output format requested from the hosted model.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResponseFormat {
    /// Free text; the prompt alone asks for JSON.
    Text,
    /// The service's JSON mode: output is guaranteed to parse, shape is not.
    #[default]
    JsonObject,
    /// Schema-guided output.
    JsonSchema {
        name: String,
        schema: Value,
        strict: bool,
    },
}

impl ResponseFormat {
    /// Schema-guided format for `schema`. Non-strict, so extra fields remain legal.
    pub fn json_schema(schema: &Schema) -> Self {
        Self::JsonSchema {
            name: schema.title().unwrap_or("response").to_string(),
            schema: schema.to_json_schema(),
            strict: false,
        }
    }

    fn to_value(&self) -> Option<Value> {
        match self {
            Self::Text => None,
            Self::JsonObject => Some(json!({ "type": "json_object" })),
            Self::JsonSchema {
                name,
                schema,
                strict,
            } => Some(json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema, "strict": strict }
            })),
        }
    }
}

/// Connection and sampling settings for [`ChatBackend`].
#[derive(Clone, Debug)]
pub struct ChatBackendConfig {
    pub api_key: String,
    /// Base URL without the `/chat/completions` suffix (default: OpenAI)
    pub base_url: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub seed: Option<u64>,
    pub response_format: ResponseFormat,
    /// HTTP request timeout (default: 60s)
    pub request_timeout: Duration,
}

impl ChatBackendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            temperature: None,
            seed: None,
            response_format: ResponseFormat::default(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Read `OPENAI_API_KEY` plus optional `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            StructuredError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config = config.with_model(model);
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    /// Toggle the hosted JSON mode flag.
    pub fn with_json_mode(self, enabled: bool) -> Self {
        let format = if enabled {
            ResponseFormat::JsonObject
        } else {
            ResponseFormat::Text
        };
        self.with_response_format(format)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// [`TextGenerator`] backed by an OpenAI-compatible chat-completions API.
#[derive(Clone, Debug)]
pub struct ChatBackend {
    http: reqwest::Client,
    config: ChatBackendConfig,
}

impl ChatBackend {
    pub fn new(config: ChatBackendConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(StructuredError::Config("API key must not be empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn config(&self) -> &ChatBackendConfig {
        &self.config
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &self.config.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(seed) = self.config.seed {
            body["seed"] = json!(seed);
        }
        if let Some(format) = self.config.response_format.to_value() {
            body["response_format"] = format;
        }
        body
    }
}

#[async_trait]
impl TextGenerator for ChatBackend {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Err(StructuredError::from_status(
                status.as_u16(),
                &body,
                retry_after.as_deref(),
            ));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .with_context("decoding chat completion")?;
        if let Some(usage) = &completion.usage {
            debug!(
                model = completion.model.as_deref().unwrap_or_default(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(StructuredError::EmptyResponse)?;
        if let Some(refusal) = choice.message.refusal {
            return Err(StructuredError::Backend(format!("model refused: {refusal}")));
        }
        debug!(finish_reason = ?choice.finish_reason, "Chat completion finished");
        choice.message.content.ok_or(StructuredError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn backend(config: ChatBackendConfig) -> ChatBackend {
        ChatBackend::new(config).unwrap()
    }

    #[test]
    fn json_mode_sets_response_format() {
        let body = backend(ChatBackendConfig::new("k").with_model("gpt-4-1106-preview"))
            .request_body("Tell me a joke in JSON.");
        assert_eq!(body["model"], "gpt-4-1106-preview");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn text_mode_omits_response_format() {
        let body = backend(
            ChatBackendConfig::new("k")
                .with_json_mode(false)
                .with_system_prompt("You are terse.")
                .with_seed(7),
        )
        .request_body("hi");
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"][0]["content"], "You are terse.");
        assert_eq!(body["seed"], 7);
    }

    #[test]
    fn json_schema_format_embeds_schema() {
        let schema = Schema::builder()
            .title("Joke")
            .field("setup", FieldType::String, "")
            .build()
            .unwrap();
        let body = backend(
            ChatBackendConfig::new("k").with_response_format(ResponseFormat::json_schema(&schema)),
        )
        .request_body("hi");
        let format = &body["response_format"];
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "Joke");
        assert_eq!(format["json_schema"]["strict"], false);
        assert_eq!(format["json_schema"]["schema"]["required"], json!(["setup"]));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(ChatBackend::new(ChatBackendConfig::new(" ")).is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ChatBackendConfig::new("k").with_base_url("http://localhost:8080/v1/");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
    }
}
