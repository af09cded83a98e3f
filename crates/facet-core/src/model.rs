use serde::{Deserialize, Serialize};

/// A software-quality attribute from the catalog. Immutable reference
/// data, unique by `criterion`, loaded once per run in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub criterion: String,
    pub definition: String,
    pub synonyms: Vec<String>,
}

impl Attribute {
    /// Search keywords in fallback order: the criterion itself, then
    /// each synonym.
    pub fn keywords(&self) -> Vec<String> {
        let mut kws = Vec::with_capacity(1 + self.synonyms.len());
        kws.push(self.criterion.clone());
        kws.extend(self.synonyms.iter().cloned());
        kws
    }
}

/// A candidate evidence unit. `size` is the body length in characters
/// and is used only for prioritization (larger first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub issue_id: String,
    pub number: i64,
    pub text: String,
    pub size: i64,
}

/// One validated model verdict for an (attribute, issue) pair.
///
/// `score` is a sentiment in [-1, +1]: -1 means the issue speaks
/// maximally negatively about the project with respect to the
/// criterion, +1 maximally positively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredExcerpt {
    pub reason: String,
    pub score: f64,
    pub issue_number: i64,
}
