//! Scoring-instruction construction.

use crate::model::{Attribute, Issue};
use crate::tokens::TokenBudgetTruncator;

/// Builds the scoring instruction for an (attribute, issue) pair and
/// delegates budget enforcement to [`TokenBudgetTruncator`].
pub struct PromptBuilder {
    truncator: TokenBudgetTruncator,
}

impl PromptBuilder {
    pub fn new(truncator: TokenBudgetTruncator) -> Self {
        Self { truncator }
    }

    pub fn build(&self, attribute: &Attribute, issue: &Issue) -> anyhow::Result<String> {
        let instruction = instruction_for(attribute);
        self.truncator.compose(&instruction, &issue.text)
    }
}

/// The instruction is a pure function of (criterion, definition) so the
/// same attribute always produces the same prompt text.
pub(crate) fn instruction_for(attribute: &Attribute) -> String {
    let criterion = &attribute.criterion;
    format!(
        "'{criterion}' defines as \"{definition}\" \
         Extract the exact excerpt related to '{criterion}' from the following issue text. \
         Return only a JSON object with two properties: 'reason' and 'score'. \
         'reason' should contain the most relevant excerpt, with no explanation. \
         'score' should be a sentiment value with two decimal places between -1 and +1. \
         -1 means the entire provided issue text speaks negatively about the project in relation to '{criterion}', \
         and +1 means the project is described as having the best features related to '{criterion}'.",
        definition = attribute.definition,
    )
}
