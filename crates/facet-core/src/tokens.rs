//! Token-budget bounding for scoring prompts.

use anyhow::Context;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Total token budget for one prompt (instruction + issue body).
pub const DEFAULT_TOKEN_BUDGET: usize = 60_000;

/// Bounds the issue body so that instruction + body stay within a fixed
/// token budget. Tokenization is cl100k_base, so composition is
/// deterministic for a given tokenizer version.
pub struct TokenBudgetTruncator {
    bpe: CoreBPE,
    budget: usize,
}

impl TokenBudgetTruncator {
    pub fn new(budget: usize) -> anyhow::Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().context("failed to load cl100k_base tokenizer")?;
        Ok(Self { bpe, budget })
    }

    pub fn with_default_budget() -> anyhow::Result<Self> {
        Self::new(DEFAULT_TOKEN_BUDGET)
    }

    /// Combines `instruction` with `body`, truncating the body's token
    /// sequence from the start to `budget - tokens(instruction)` when it
    /// would overflow. The body is fenced with a fixed separator so the
    /// model can tell evidence apart from instruction.
    pub fn compose(&self, instruction: &str, body: &str) -> anyhow::Result<String> {
        let instruction = instruction.trim();
        let instruction_tokens = self.bpe.encode_with_special_tokens(instruction);
        let available = self.budget.saturating_sub(instruction_tokens.len());

        let mut body_tokens = self.bpe.encode_with_special_tokens(body);
        let safe_body = if body_tokens.len() > available {
            warn!(
                original = body_tokens.len(),
                truncated = available,
                "truncating issue text to fit token budget"
            );
            body_tokens.truncate(available);
            self.bpe
                .decode(body_tokens)
                .context("failed to decode truncated token sequence")?
        } else {
            body.to_string()
        };

        Ok(format!("{}\n\n---\n{}\n---", instruction, safe_body.trim()))
    }

    /// Token count of `text` under the truncator's tokenizer.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}
