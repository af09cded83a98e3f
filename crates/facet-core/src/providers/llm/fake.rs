use super::{LlmClient, LlmResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Offline client for tests: replies with a fixed response and counts
/// calls so tests can assert how many scoring exchanges happened.
#[derive(Debug)]
pub struct FakeClient {
    fixed_response: String,
    calls: Arc<AtomicU32>,
}

impl FakeClient {
    pub fn new(fixed_response: impl Into<String>) -> Self {
        Self {
            fixed_response: fixed_response.into(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(LlmResponse {
            text: self.fixed_response.clone(),
            provider: "fake".to_string(),
            model: "fake".to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
