mod ollama;
mod openai;

use async_trait::async_trait;
use std::time::Duration;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Request to generate a batch of trivia questions
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Instructions describing the output format and tone
    pub system_prompt: String,
    /// The prompt text
    pub prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    /// Timeout for the request
    pub timeout: Duration,
    /// Optional model override (e.g., "gpt-4o" instead of configured model)
    pub model_override: Option<String>,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    /// Provider-specific metadata (model used, tokens consumed, etc.)
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate text for the given request
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Manager for multiple LLM providers
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
}

impl LlmManager {
    /// Create a new LLM manager with the given providers
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Generate from all available providers concurrently.
    /// Returns (provider_name, response) pairs for successful generations.
    ///
    /// Each call is raced against `request.timeout` here as well, so a provider
    /// that ignores the timeout cannot hold up the batch.
    pub async fn generate_from_all(
        &self,
        request: GenerateRequest,
    ) -> Vec<(String, GenerateResponse)> {
        let mut tasks = Vec::new();

        for provider in &self.providers {
            let req = request.clone();
            let provider_name = provider.name().to_string();
            let provider_ref = provider.as_ref();
            let timeout = request.timeout;

            tasks.push(async move {
                match tokio::time::timeout(timeout, provider_ref.generate(req)).await {
                    Ok(Ok(response)) => Some((provider_name, response)),
                    Ok(Err(e)) => {
                        tracing::error!("Provider {} failed: {}", provider_name, e);
                        None
                    }
                    Err(_) => {
                        tracing::error!("Provider {} timed out after {:?}", provider_name, timeout);
                        None
                    }
                }
            });
        }

        // Wait for all to complete and collect successes
        futures::future::join_all(tasks)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Default timeout for LLM requests
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: Some("http://localhost:11434".to_string()),
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(12),
            default_max_tokens: 4000,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ollama_base_url = match std::env::var("OLLAMA_BASE_URL") {
            Ok(url) => {
                let trimmed = url.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(_) => defaults.ollama_base_url,
        };

        Self {
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            openai_model: non_empty_env("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_base_url,
            ollama_model: non_empty_env("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: std::env::var("LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_max_tokens),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        // Add OpenAI if API key is available
        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        // Add Ollama if base URL is available
        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
            ));
        }

        Ok(LlmManager::new(providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct Slow;

    #[async_trait]
    impl LlmProvider for Slow {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(LlmError::ApiError("unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Ok(GenerateResponse {
                text: request.prompt,
                metadata: ResponseMetadata {
                    provider: "echo".to_string(),
                    model: "echo-1".to_string(),
                    tokens_used: None,
                    latency_ms: 0,
                },
            })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn request(timeout: Duration) -> GenerateRequest {
        GenerateRequest {
            system_prompt: String::new(),
            prompt: "hello".to_string(),
            temperature: 0.9,
            max_tokens: None,
            timeout,
            model_override: None,
        }
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.ollama_model, "llama3.2");
        assert_eq!(config.default_timeout, Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_from_all_drops_slow_providers() {
        let manager = LlmManager::new(vec![Box::new(Slow), Box::new(Echo)]);
        let results = manager
            .generate_from_all(request(Duration::from_secs(10)))
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "echo");
        assert_eq!(results[0].1.text, "hello");
    }

    #[test]
    #[serial]
    fn test_from_env_trims_and_disables_ollama() {
        std::env::set_var("OPENAI_API_KEY", "  sk-test  ");
        std::env::set_var("OLLAMA_BASE_URL", "   ");
        let config = LlmConfig::from_env();
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("OLLAMA_BASE_URL");

        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert!(config.ollama_base_url.is_none());
        assert_eq!(config.build_manager().unwrap().len(), 1);
    }
}
