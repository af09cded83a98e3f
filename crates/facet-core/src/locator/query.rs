use super::{IssueLocator, MAX_CANDIDATES, MIN_ISSUE_SIZE};
use crate::errors::AcquisitionError;
use crate::model::{Attribute, Issue};
use crate::storage::Store;
use async_trait::async_trait;

/// Locates candidate issues by structured search over the stored issue
/// corpus: any keyword as a case-insensitive substring, size floor,
/// largest first, capped.
pub struct QueryLocator {
    store: Store,
}

impl QueryLocator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IssueLocator for QueryLocator {
    async fn find(
        &mut self,
        project_id: &str,
        attribute: &Attribute,
    ) -> Result<Option<Vec<Issue>>, AcquisitionError> {
        let keywords = attribute.keywords();
        let issues = self
            .store
            .find_issues(project_id, &keywords, MIN_ISSUE_SIZE, MAX_CANDIDATES)
            .map_err(|e| AcquisitionError::Corpus(e.to_string()))?;
        Ok(Some(issues))
    }
}
