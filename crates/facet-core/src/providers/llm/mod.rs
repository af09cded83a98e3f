//! Language-model scoring clients.

mod fake;
mod openai;

pub use fake::FakeClient;
pub use openai::OpenAiChatClient;

use crate::errors::ConfigError;
use async_trait::async_trait;
use std::str::FromStr;

/// Fixed system instruction for every scoring exchange.
pub const SYSTEM_PROMPT: &str =
    "You are a software engineering assistant. Analyze GitHub issues.";

/// Deterministic sampling for reproducible verdicts.
pub const SCORING_TEMPERATURE: f32 = 0.2;

/// Supported inference providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Deepseek,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "deepseek" => Ok(Provider::Deepseek),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Resolved base endpoint + credential for a provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: String,
}

impl Provider {
    pub fn tag(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Deepseek => "deepseek",
        }
    }

    /// Resolves the provider to its chat endpoint and credential.
    /// Called once during config assembly; components never touch the
    /// environment themselves.
    pub fn resolve_from_env(self) -> Result<ProviderEndpoint, ConfigError> {
        match self {
            Provider::OpenAi => Ok(ProviderEndpoint {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: std::env::var("OPENAI_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("OPENAI_API_KEY"))?,
            }),
            Provider::Deepseek => Ok(ProviderEndpoint {
                base_url: std::env::var("DEEPSEEK_API_BASE")
                    .unwrap_or_else(|_| "https://api.deepseek.com/v1".to_string()),
                api_key: std::env::var("DEEPSEEK_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("DEEPSEEK_API_KEY"))?,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// One network call per invocation, no retries at this layer; retry
/// policy, if any, belongs to the orchestrator.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse>;

    fn provider_name(&self) -> &'static str;
}
