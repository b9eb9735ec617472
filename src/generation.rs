//! Generation provider implementations.
//!
//! - **[`OpenAIGenerator`]**: OpenAI chat completions.
//! - **[`OllamaGenerator`]**: a local Ollama instance's `/api/generate`.
//! - **[`DisabledGenerator`]**: always fails permanently, so every answer
//!   takes the fallback path.
//!
//! Providers make exactly one request per [`generate`] call. Retries,
//! backoff and fallback are owned by the
//! [`AnswerAssembler`](crate::answer::AnswerAssembler); providers only
//! classify failures as transient or permanent.
//!
//! [`generate`]: GenerationProvider::generate

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use talk_to_docs_core::generation::{GenerationError, GenerationProvider};
use talk_to_docs_core::prompt::SYSTEM_INSTRUCTIONS;
use talk_to_docs_core::{Error, Result};

use crate::config::GenerationConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMPTY_RESPONSE: &str = "No response generated.";

/// Map an HTTP status to the matching failure class.
fn classify(status: reqwest::StatusCode, label: &str, body: &str) -> GenerationError {
    let message = format!("{} API error {}: {}", label, status, body);
    if status.as_u16() == 429 || status.is_server_error() {
        GenerationError::Transient(message)
    } else {
        GenerationError::Permanent(message)
    }
}

fn network_error(label: &str, e: reqwest::Error) -> GenerationError {
    GenerationError::Transient(format!("{} request failed: {}", label, e))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::invalid_config(format!("failed to build HTTP client: {}", e)))
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    name: String,
    model: String,
    temperature: f32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if no model is configured or
    /// `OPENAI_API_KEY` is unset.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::invalid_config("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::invalid_config("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            name: format!("openai:{}", model),
            model,
            temperature: config.temperature,
            api_key,
            client: http_client(config.timeout())?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": SYSTEM_INSTRUCTIONS},
                {"role": "user", "content": prompt},
            ],
        });

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify(status, "OpenAI", &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Transient(format!("OpenAI returned invalid JSON: {}", e)))?;
        Ok(parse_chat_response(&json))
    }
}

fn parse_chat_response(json: &serde_json::Value) -> String {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(EMPTY_RESPONSE)
        .to_string()
}

// ============ Ollama ============

pub struct OllamaGenerator {
    name: String,
    model: String,
    url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::invalid_config("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            name: format!("ollama:{}", model),
            model,
            url,
            temperature: config.temperature,
            client: http_client(config.timeout())?,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "system": SYSTEM_INSTRUCTIONS,
            "prompt": prompt,
            "stream": false,
            "options": {"temperature": self.temperature},
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("Ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify(status, "Ollama", &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Transient(format!("Ollama returned invalid JSON: {}", e)))?;
        Ok(json
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(EMPTY_RESPONSE)
            .to_string())
    }
}

// ============ Disabled ============

/// Stand-in used when no generation backend is configured or usable.
pub struct DisabledGenerator {
    reason: String,
}

impl DisabledGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationError> {
        Err(GenerationError::Permanent(self.reason.clone()))
    }
}

/// Create the generator named by `config.provider`.
///
/// A remote provider that cannot start (for example, because
/// `OPENAI_API_KEY` is missing) is replaced by a [`DisabledGenerator`]
/// carrying the reason, so `ask` still returns fallback answers.
pub fn create_generator(config: &GenerationConfig) -> Arc<dyn GenerationProvider> {
    let built: Result<Arc<dyn GenerationProvider>> = match config.provider.as_str() {
        "openai" => OpenAIGenerator::new(config).map(|g| Arc::new(g) as Arc<dyn GenerationProvider>),
        "ollama" => OllamaGenerator::new(config).map(|g| Arc::new(g) as Arc<dyn GenerationProvider>),
        "disabled" => Ok(Arc::new(DisabledGenerator::new("generation provider is disabled"))),
        other => Err(Error::invalid_config(format!(
            "unknown generation provider: {}",
            other
        ))),
    };

    match built {
        Ok(generator) => generator,
        Err(e) => {
            tracing::warn!(error = %e, "generation provider unavailable, answers will use fallback mode");
            Arc::new(DisabledGenerator::new(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        let t = classify(reqwest::StatusCode::TOO_MANY_REQUESTS, "X", "");
        assert!(t.is_transient());
        let t = classify(reqwest::StatusCode::BAD_GATEWAY, "X", "");
        assert!(t.is_transient());
        let p = classify(reqwest::StatusCode::UNAUTHORIZED, "X", "bad key");
        assert!(!p.is_transient());
    }

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "  Paris [1]  "}}]
        });
        assert_eq!(parse_chat_response(&json), "Paris [1]");
        assert_eq!(parse_chat_response(&serde_json::json!({})), EMPTY_RESPONSE);
    }

    #[tokio::test]
    async fn test_disabled_is_permanent() {
        let g = DisabledGenerator::new("off");
        let err = g.generate("hi").await.unwrap_err();
        assert_eq!(err, GenerationError::Permanent("off".to_string()));
    }

    #[test]
    fn test_default_config_yields_disabled() {
        let g = create_generator(&GenerationConfig::default());
        assert_eq!(g.name(), "disabled");
    }
}
