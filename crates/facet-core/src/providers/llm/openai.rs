use super::{LlmClient, LlmResponse, ProviderEndpoint, SCORING_TEMPERATURE, SYSTEM_PROMPT};
use async_trait::async_trait;
use serde_json::json;

/// Chat-completions client for any OpenAI-compatible endpoint (OpenAI
/// itself, DeepSeek via its base URL).
pub struct OpenAiChatClient {
    endpoint: ProviderEndpoint,
    model: String,
    provider_tag: &'static str,
    client: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new(endpoint: ProviderEndpoint, model: String, provider_tag: &'static str) -> Self {
        Self {
            endpoint,
            model,
            provider_tag,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let url = format!(
            "{}/chat/completions",
            self.endpoint.base_url.trim_end_matches('/')
        );

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "stream": false,
            "temperature": SCORING_TEMPERATURE,
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_else(|_| String::new());
            anyhow::bail!("chat API error (status {}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("chat API response missing content"))?
            .trim()
            .to_string();

        Ok(LlmResponse {
            text,
            provider: self.provider_tag.to_string(),
            model: self.model.clone(),
        })
    }

    fn provider_name(&self) -> &'static str {
        self.provider_tag
    }
}
