//! End-to-end orchestration: page projects, locate evidence per
//! attribute, score it, and merge validated verdicts.

use crate::locator::IssueLocator;
use crate::model::Attribute;
use crate::prompt::PromptBuilder;
use crate::providers::llm::LlmClient;
use crate::storage::{MergeOutcome, Store};
use crate::validate::ResponseValidator;
use crate::window::TimeWindowGovernor;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunPolicy {
    pub page_size: u32,
    /// Catalog cap; the reference data carries at most this many
    /// attributes per run.
    pub catalog_limit: u32,
    /// Projects at or below this issue volume are not paged in.
    pub min_project_issues: i64,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            page_size: 10,
            catalog_limit: 10,
            min_project_issues: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    StoppedByWindow,
}

#[derive(Debug)]
pub struct RunArtifacts {
    pub outcome: RunOutcome,
    pub projects_processed: u64,
    pub excerpts_merged: u64,
}

pub struct Runner {
    pub store: Store,
    pub client: Arc<dyn LlmClient>,
    pub locator: Box<dyn IssueLocator>,
    pub prompts: PromptBuilder,
    pub validator: ResponseValidator,
    pub governor: TimeWindowGovernor,
    pub policy: RunPolicy,
}

impl Runner {
    /// Runs the whole pipeline: waits for the processing window to
    /// open (when governed), then pages through projects until a page
    /// comes back empty or the window closes.
    pub async fn run(&mut self) -> anyhow::Result<RunArtifacts> {
        self.governor.wait_for_open().await;
        let artifacts = self.run_pages().await?;
        if let Err(e) = self.locator.shutdown().await {
            warn!(error = %e, "locator shutdown failed");
        }
        Ok(artifacts)
    }

    pub(crate) async fn run_pages(&mut self) -> anyhow::Result<RunArtifacts> {
        let catalog = self.store.load_attributes(self.policy.catalog_limit)?;
        info!(attributes = catalog.len(), "loaded attribute catalog");

        let mut artifacts = RunArtifacts {
            outcome: RunOutcome::Completed,
            projects_processed: 0,
            excerpts_merged: 0,
        };

        let mut offset: u64 = 0;
        loop {
            let projects = self.store.page_projects(
                self.policy.min_project_issues,
                self.policy.page_size,
                offset,
            )?;
            if projects.is_empty() {
                break;
            }

            for project_id in projects {
                // Window check is per project: a boundary crossed
                // mid-project finishes that project first.
                let now = Utc::now();
                if !self.governor.may_continue(now) {
                    info!(%now, "processing window closed, stopping run");
                    artifacts.outcome = RunOutcome::StoppedByWindow;
                    return Ok(artifacts);
                }

                info!(project_id, %now, "processing project");
                artifacts.excerpts_merged +=
                    self.process_project(&project_id, &catalog).await?;
                artifacts.projects_processed += 1;
            }

            offset += u64::from(self.policy.page_size);
        }

        Ok(artifacts)
    }

    /// One project: every catalog attribute, in order, skipping pairs
    /// that already have a result record.
    async fn process_project(
        &mut self,
        project_id: &str,
        catalog: &[Attribute],
    ) -> anyhow::Result<u64> {
        let mut merged = 0;
        for attribute in catalog {
            let criterion = attribute.criterion.as_str();
            if self.store.has_result(project_id, criterion)? {
                debug!(project_id, criterion, "result exists, skipping");
                continue;
            }

            let issues = match self.locator.find(project_id, attribute).await {
                Ok(Some(issues)) => issues,
                Ok(None) => {
                    debug!(project_id, "project has no issues, skipping remaining attributes");
                    break;
                }
                Err(e) => {
                    warn!(project_id, criterion, error = %e, "issue acquisition failed");
                    continue;
                }
            };
            if issues.is_empty() {
                continue;
            }

            info!(project_id, criterion, candidates = issues.len(), "scoring candidates");
            for issue in &issues {
                let prompt = self.prompts.build(attribute, issue)?;
                let response = self.client.complete(&prompt).await?;
                match self.validator.validate(&response.text, issue.number) {
                    Ok(excerpt) => {
                        let outcome =
                            self.store.merge_result(project_id, criterion, &excerpt)?;
                        if outcome != MergeOutcome::Duplicate {
                            merged += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            project_id,
                            criterion,
                            issue_id = issue.issue_id.as_str(),
                            error = %e,
                            "model reply failed validation, skipping issue"
                        );
                    }
                }
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AcquisitionError;
    use crate::model::Issue;
    use crate::providers::llm::FakeClient;
    use crate::tokens::TokenBudgetTruncator;
    use crate::window::WindowConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;

    /// Scripted locator that records which (project, criterion) pairs
    /// were asked for.
    struct StubLocator {
        outcomes: VecDeque<Option<Vec<Issue>>>,
        calls: Arc<std::sync::Mutex<Vec<(String, String)>>>,
    }

    impl StubLocator {
        fn new(
            outcomes: impl Into<VecDeque<Option<Vec<Issue>>>>,
        ) -> (Self, Arc<std::sync::Mutex<Vec<(String, String)>>>) {
            let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
            (
                Self {
                    outcomes: outcomes.into(),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl IssueLocator for StubLocator {
        async fn find(
            &mut self,
            project_id: &str,
            attribute: &Attribute,
        ) -> Result<Option<Vec<Issue>>, AcquisitionError> {
            self.calls
                .lock()
                .unwrap()
                .push((project_id.to_string(), attribute.criterion.clone()));
            Ok(self.outcomes.pop_front().unwrap_or(Some(vec![])))
        }
    }

    fn issue(number: i64) -> Issue {
        Issue {
            issue_id: format!("i-{number}"),
            number,
            text: format!("issue body {number}"),
            size: 1200,
        }
    }

    fn seeded_store() -> Store {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        store
            .insert_attribute("security", "resists attack", &["vuln"], 1)
            .unwrap();
        store
            .insert_attribute("performance", "stays fast", &[], 2)
            .unwrap();
        store.insert_issue("seed", "p1", 1, "body").unwrap();
        store
    }

    fn runner_with(
        store: Store,
        client: Arc<dyn LlmClient>,
        locator: Box<dyn IssueLocator>,
        window: WindowConfig,
    ) -> Runner {
        Runner {
            store,
            client,
            locator,
            prompts: PromptBuilder::new(TokenBudgetTruncator::new(4000).unwrap()),
            validator: ResponseValidator::new(true),
            governor: TimeWindowGovernor::new(window),
            policy: RunPolicy {
                min_project_issues: 0,
                ..RunPolicy::default()
            },
        }
    }

    fn open_window() -> WindowConfig {
        WindowConfig {
            enabled: false,
            ..WindowConfig::default()
        }
    }

    /// A governed window that is closed no matter when the test runs.
    fn closed_window() -> WindowConfig {
        let t = Utc::now().time();
        WindowConfig {
            enabled: true,
            start: t - chrono::Duration::hours(2),
            stop: t - chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn closed_window_means_zero_project_processing() {
        let fake = FakeClient::new(r#"{"reason":"x","score":0.5}"#);
        let calls = fake.call_counter();
        let (locator, _) = StubLocator::new(VecDeque::new());
        let mut runner = runner_with(
            seeded_store(),
            Arc::new(fake),
            Box::new(locator),
            closed_window(),
        );

        let artifacts = runner.run_pages().await.unwrap();
        assert_eq!(artifacts.outcome, RunOutcome::StoppedByWindow);
        assert_eq!(artifacts.projects_processed, 0);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn terminal_none_short_circuits_remaining_attributes() {
        let fake = FakeClient::new(r#"{"reason":"x","score":0.5}"#);
        let (locator, calls) = StubLocator::new([None]);
        let mut runner = runner_with(
            seeded_store(),
            Arc::new(fake),
            Box::new(locator),
            open_window(),
        );

        let artifacts = runner.run_pages().await.unwrap();
        assert_eq!(artifacts.outcome, RunOutcome::Completed);
        assert_eq!(artifacts.excerpts_merged, 0);

        // The catalog has two attributes but only the first was asked
        // for: the terminal signal skipped "performance".
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "security");
    }

    #[tokio::test]
    async fn existing_result_is_never_reprocessed() {
        let store = seeded_store();
        for criterion in ["security", "performance"] {
            store
                .merge_result(
                    "p1",
                    criterion,
                    &crate::model::ScoredExcerpt {
                        reason: "done".into(),
                        score: 0.1,
                        issue_number: 1,
                    },
                )
                .unwrap();
        }

        let fake = FakeClient::new(r#"{"reason":"x","score":0.5}"#);
        let scoring_calls = fake.call_counter();
        let (locator, locator_calls) = StubLocator::new(VecDeque::new());
        let mut runner = runner_with(store, Arc::new(fake), Box::new(locator), open_window());

        let artifacts = runner.run_pages().await.unwrap();
        assert_eq!(artifacts.projects_processed, 1);
        assert_eq!(artifacts.excerpts_merged, 0);
        assert_eq!(scoring_calls.load(Ordering::Relaxed), 0);
        assert!(locator_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_model_output_skips_without_store_mutation() {
        let fake = FakeClient::new("not json");
        let calls = fake.call_counter();
        let (locator, _) = StubLocator::new([Some(vec![issue(1), issue(2)]), Some(vec![])]);
        let store = seeded_store();
        let mut runner = runner_with(
            store.clone(),
            Arc::new(fake),
            Box::new(locator),
            open_window(),
        );

        let artifacts = runner.run_pages().await.unwrap();
        assert_eq!(artifacts.outcome, RunOutcome::Completed);
        assert_eq!(artifacts.excerpts_merged, 0);
        // Both candidates were still attempted.
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert!(store.get_result("p1", "security").unwrap().is_none());
    }
}
