//! Model-response validation.

use crate::errors::ValidationError;
use crate::model::ScoredExcerpt;
use regex::Regex;

/// Parses a raw model reply into a [`ScoredExcerpt`].
///
/// Replies are expected to be a bare JSON object, optionally wrapped in
/// a fenced code block. Strict mode additionally enforces the output
/// contract: both properties present and `score` within [-1, 1].
pub struct ResponseValidator {
    strict: bool,
    fence: Regex,
}

impl ResponseValidator {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            // Leading ```json / ``` marker and trailing ``` fence.
            fence: Regex::new(r"(?i)^```(?:json)?|```$").expect("static regex"),
        }
    }

    pub fn validate(
        &self,
        raw: &str,
        issue_number: i64,
    ) -> Result<ScoredExcerpt, ValidationError> {
        let cleaned = self.fence.replace_all(raw.trim(), "");
        let cleaned = cleaned.trim();

        let value: serde_json::Value = serde_json::from_str(cleaned)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

        let reason = value.get("reason").and_then(|v| v.as_str());
        let score = value.get("score").and_then(serde_json::Value::as_f64);

        if self.strict {
            let reason = reason.ok_or(ValidationError::MissingProperty("reason"))?;
            let score = score.ok_or(ValidationError::MissingProperty("score"))?;
            if !(-1.0..=1.0).contains(&score) {
                return Err(ValidationError::ScoreOutOfRange(score));
            }
            return Ok(ScoredExcerpt {
                reason: reason.to_string(),
                score,
                issue_number,
            });
        }

        // Lenient mode mirrors the historical behavior: anything that
        // parses as JSON is accepted, defaults filling the gaps.
        Ok(ScoredExcerpt {
            reason: reason.unwrap_or_default().to_string(),
            score: score.unwrap_or_default(),
            issue_number,
        })
    }
}
