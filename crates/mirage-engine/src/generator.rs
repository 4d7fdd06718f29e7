//! Text generation backends behind a provider chain.
//!
//! Providers are tried in priority order at chain construction: the first
//! one with a configured credential handles every request. Exactly one
//! provider is used per request; there is no fan-out and no racing.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use mirage_core::config::GeneratorConfig;

use crate::error::{EngineError, Result};

/// Role of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One prior conversation turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Request to a text generation provider: system instructions, prior turns,
/// and the single new user turn.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Trait for text generators.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// A generation provider identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
}

/// One configured provider in the chain.
#[derive(Clone)]
pub struct ProviderEntry {
    pub provider: Provider,
    pub model: String,
    api_key: String,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The key never appears in Debug output.
        f.debug_struct("ProviderEntry")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish()
    }
}

/// Ordered list of configured providers; the head serves all requests.
#[derive(Debug, Clone, Default)]
pub struct ProviderChain {
    entries: Vec<ProviderEntry>,
}

impl ProviderChain {
    /// Build the chain from the environment in priority order: Anthropic
    /// first, then OpenAI. A provider joins the chain only when its key
    /// variable is set and non-empty.
    pub fn from_env(config: &GeneratorConfig) -> Self {
        let mut entries = Vec::new();
        if let Some(key) = read_key(&config.anthropic_key_env) {
            entries.push(ProviderEntry {
                provider: Provider::Anthropic,
                model: config.anthropic_model.clone(),
                api_key: key,
            });
        }
        if let Some(key) = read_key(&config.openai_key_env) {
            entries.push(ProviderEntry {
                provider: Provider::OpenAi,
                model: config.openai_model.clone(),
                api_key: key,
            });
        }
        Self { entries }
    }

    /// Build a chain from explicit entries (tests, unusual deployments).
    pub fn from_entries(entries: Vec<ProviderEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The provider that will serve requests, if any is configured.
    pub fn active(&self) -> Option<&ProviderEntry> {
        self.entries.first()
    }
}

impl ProviderEntry {
    pub fn new(provider: Provider, model: &str, api_key: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

fn read_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.is_empty())
}

// ---------------------------------------------------------------------------
// HTTP generator (real API calls)
// ---------------------------------------------------------------------------

pub struct HttpGenerator {
    http: reqwest::Client,
    chain: ProviderChain,
}

impl HttpGenerator {
    /// Build an HTTP generator with a bounded per-request timeout.
    pub fn new(chain: ProviderChain, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("building HTTP client");
        Self { http, chain }
    }

    async fn call_anthropic(
        &self,
        entry: &ProviderEntry,
        request: &GenerationRequest,
    ) -> Result<String> {
        let mut messages: Vec<serde_json::Value> = request
            .history
            .iter()
            .map(|t| serde_json::json!({ "role": t.role.as_str(), "content": t.content }))
            .collect();
        messages.push(serde_json::json!({ "role": "user", "content": request.user_prompt }));

        let body = serde_json::json!({
            "model": entry.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system_prompt,
            "messages": messages,
        });

        let resp = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("anthropic-version", "2023-06-01")
            .header("x-api-key", &entry.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        let resp = resp
            .error_for_status()
            .map_err(|e| EngineError::Generation(e.to_string()))?;
        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        Ok(parsed
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default())
    }

    async fn call_openai(
        &self,
        entry: &ProviderEntry,
        request: &GenerationRequest,
    ) -> Result<String> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        for turn in &request.history {
            messages.push(serde_json::json!({ "role": turn.role.as_str(), "content": turn.content }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.user_prompt }));

        let body = serde_json::json!({
            "model": entry.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", entry.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        let resp = resp
            .error_for_status()
            .map_err(|e| EngineError::Generation(e.to_string()))?;
        let parsed: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        Ok(parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let entry = self
            .chain
            .active()
            .ok_or(EngineError::GenerationUnavailable)?;
        debug!(provider = ?entry.provider, model = %entry.model, "dispatching generation request");
        match entry.provider {
            Provider::Anthropic => self.call_anthropic(entry, request).await,
            Provider::OpenAi => self.call_openai(entry, request).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Mock generator (for testing)
// ---------------------------------------------------------------------------

/// Scripted generator: returns queued responses in order, recording every
/// request. An empty queue yields a fixed placeholder response.
#[derive(Default)]
pub struct MockGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn push_response(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: EngineError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// All requests made to this mock.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok("Query OK, 0 rows affected.".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// API response types (serde)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "sys".to_string(),
            history: Vec::new(),
            user_prompt: "SELECT 1".to_string(),
            max_tokens: 256,
            temperature: 0.0,
        }
    }

    #[test]
    fn chain_prefers_first_configured_entry() {
        let chain = ProviderChain::from_entries(vec![
            ProviderEntry::new(Provider::Anthropic, "claude-sonnet-4-20250514", "k1"),
            ProviderEntry::new(Provider::OpenAi, "gpt-4o-mini", "k2"),
        ]);
        assert_eq!(chain.active().unwrap().provider, Provider::Anthropic);
    }

    #[test]
    fn empty_chain_has_no_active_provider() {
        let chain = ProviderChain::default();
        assert!(chain.is_empty());
        assert!(chain.active().is_none());
    }

    #[test]
    fn provider_entry_debug_hides_key() {
        let entry = ProviderEntry::new(Provider::OpenAi, "gpt-4o-mini", "sk-secret");
        let debug = format!("{entry:?}");
        assert!(!debug.contains("sk-secret"));
    }

    #[tokio::test]
    async fn http_generator_without_providers_is_unavailable() {
        let generator = HttpGenerator::new(ProviderChain::default(), Duration::from_secs(1));
        let err = generator.generate(&make_request()).await.unwrap_err();
        assert!(matches!(err, EngineError::GenerationUnavailable));
    }

    #[tokio::test]
    async fn mock_returns_queued_responses_in_order() {
        let mock = MockGenerator::new();
        mock.push_response("first");
        mock.push_response("second");
        assert_eq!(mock.generate(&make_request()).await.unwrap(), "first");
        assert_eq!(mock.generate(&make_request()).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn mock_records_calls() {
        let mock = MockGenerator::new();
        mock.generate(&make_request()).await.unwrap();
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user_prompt, "SELECT 1");
    }

    #[tokio::test]
    async fn mock_propagates_queued_errors() {
        let mock = MockGenerator::new();
        mock.push_error(EngineError::Generation("boom".to_string()));
        let err = mock.generate(&make_request()).await.unwrap_err();
        assert!(matches!(err, EngineError::Generation(_)));
    }
}
