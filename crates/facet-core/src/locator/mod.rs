//! Candidate-issue discovery strategies.

mod query;
mod ui;

pub use query::QueryLocator;
pub use ui::UiLocator;

use crate::errors::AcquisitionError;
use crate::model::{Attribute, Issue};
use async_trait::async_trait;

/// Finds candidate issues for one (project, attribute) pair.
///
/// `Ok(None)` is the terminal "this project has no issues at all"
/// signal; the orchestrator stops trying further attributes for the
/// project. `Ok(Some(vec![]))` only means nothing matched this
/// attribute's keywords.
#[async_trait]
pub trait IssueLocator: Send {
    async fn find(
        &mut self,
        project_id: &str,
        attribute: &Attribute,
    ) -> Result<Option<Vec<Issue>>, AcquisitionError>;

    /// Releases any long-lived acquisition resources (e.g. the browser
    /// session). Called once when the run ends.
    async fn shutdown(&mut self) -> Result<(), AcquisitionError> {
        Ok(())
    }
}

/// Candidate issues must be larger than this many characters.
pub const MIN_ISSUE_SIZE: i64 = 1000;

/// At most this many candidates per (project, attribute) pair.
pub const MAX_CANDIDATES: u32 = 4;
