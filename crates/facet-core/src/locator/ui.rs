use super::{IssueLocator, MAX_CANDIDATES};
use crate::errors::AcquisitionError;
use crate::model::{Attribute, Issue};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// CSS selectors for the live issue tracker. Brittle by construction:
/// a tracker UI change breaks these first, and every use is guarded so
/// a miss is a per-issue skip, never a run abort.
const RESULT_COUNT_SEL: &str = ".table-list-header-toggle a.btn-link.selected";
const ISSUE_LINK_SEL: &str = "div[aria-label='Issues'] a.Link--primary";
const ISSUE_BODY_SEL: &str = ".markdown-body";

/// Fixed settle delay after navigation before the page is queried.
const SETTLE: Duration = Duration::from_millis(750);
/// Polls when waiting for an element to render.
const RENDER_POLLS: u32 = 8;

/// One keyword search against some result source.
#[async_trait]
trait KeywordSearch {
    type Hit;

    async fn search(&mut self, keyword: &str) -> Result<Vec<Self::Hit>, AcquisitionError>;
}

/// Tries keywords in order and returns the first non-empty result set.
/// Keywords past the first hit are never searched; all-empty yields an
/// empty set, not an error.
async fn search_with_fallback<S>(
    searcher: &mut S,
    keywords: &[String],
) -> Result<Vec<S::Hit>, AcquisitionError>
where
    S: KeywordSearch + Send,
    S::Hit: Send,
{
    for keyword in keywords {
        let hits = searcher.search(keyword).await?;
        if !hits.is_empty() {
            return Ok(hits);
        }
    }
    Ok(Vec::new())
}

/// Locates candidate issues by driving a browser against the live issue
/// tracker. One WebDriver session is held for the whole run.
pub struct UiLocator {
    client: Client,
    base: Url,
}

impl UiLocator {
    /// Connects to a WebDriver endpoint (e.g. chromedriver/geckodriver).
    pub async fn connect(webdriver_url: &str, tracker_base: &str) -> anyhow::Result<Self> {
        let client = ClientBuilder::rustls()
            .connect(webdriver_url)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open webdriver session: {e}"))?;
        let base = Url::parse(tracker_base)?;
        Ok(Self { client, base })
    }

    fn listing_url(&self, project_id: &str) -> Result<Url, AcquisitionError> {
        self.base
            .join(&format!("{}/issues", project_id.trim_matches('/')))
            .map_err(|e| AcquisitionError::Driver(e.to_string()))
    }

    fn search_url(&self, project_id: &str, keyword: &str) -> Result<Url, AcquisitionError> {
        let mut url = self.listing_url(project_id)?;
        let query = format!("is:issue sort:created-desc {keyword}");
        url.query_pairs_mut().append_pair("q", &query);
        Ok(url)
    }

    /// Reads the listing's result-count indicator. Zero is the terminal
    /// "project has no issues at all" signal.
    async fn total_issue_count(&mut self, project_id: &str) -> Result<u64, AcquisitionError> {
        let url = self.listing_url(project_id)?;
        self.client.goto(url.as_str()).await?;
        tokio::time::sleep(SETTLE).await;
        let counter = self.wait_for(RESULT_COUNT_SEL).await?;
        let text = counter.text().await?;
        Ok(parse_count(&text))
    }

    /// Runs one keyword search and collects candidate issue links.
    async fn search_issue_links(
        &mut self,
        project_id: &str,
        keyword: &str,
    ) -> Result<Vec<Url>, AcquisitionError> {
        let url = self.search_url(project_id, keyword)?;
        self.client.goto(url.as_str()).await?;
        tokio::time::sleep(SETTLE).await;

        let mut links = Vec::new();
        for element in self.client.find_all(Locator::Css(ISSUE_LINK_SEL)).await? {
            if links.len() as u32 >= MAX_CANDIDATES {
                break;
            }
            let Some(href) = element.attr("href").await? else {
                continue;
            };
            match self.base.join(&href) {
                Ok(resolved) => links.push(resolved),
                Err(e) => warn!(href, error = %e, "skipping unparseable issue link"),
            }
        }
        Ok(links)
    }

    /// Opens `link` in an isolated tab, waits for the body to render,
    /// extracts its visible text, and returns to the listing tab.
    async fn fetch_issue_text(&mut self, link: &Url) -> Result<String, AcquisitionError> {
        let origin = self.client.window().await?;
        let tab = self.client.new_window(true).await?;
        self.client.switch_to_window(tab.handle).await?;

        let extracted = self.extract_body(link).await;

        // Best-effort tab teardown; the listing tab must come back
        // regardless of how extraction went.
        if let Err(e) = self.client.close_window().await {
            warn!(error = %e, "failed to close issue tab");
        }
        self.client.switch_to_window(origin).await?;

        extracted
    }

    async fn extract_body(&mut self, link: &Url) -> Result<String, AcquisitionError> {
        self.client.goto(link.as_str()).await?;
        tokio::time::sleep(SETTLE).await;
        let body = self.wait_for(ISSUE_BODY_SEL).await?;
        Ok(body.text().await?)
    }

    /// Polls for an element. Only "not there yet" is retried; any other
    /// driver failure (dead session, lost connection) surfaces at once.
    async fn wait_for(
        &mut self,
        selector: &str,
    ) -> Result<fantoccini::elements::Element, AcquisitionError> {
        for _ in 0..RENDER_POLLS {
            match self.client.find(Locator::Css(selector)).await {
                Ok(element) => return Ok(element),
                Err(CmdError::NoSuchElement(_)) => tokio::time::sleep(SETTLE).await,
                Err(other) => return Err(other.into()),
            }
        }
        Err(AcquisitionError::ElementNotFound(selector.to_string()))
    }
}

/// Adapter binding a keyword search to one project's issue listing.
struct TrackerSearch<'a> {
    locator: &'a mut UiLocator,
    project_id: &'a str,
}

#[async_trait]
impl KeywordSearch for TrackerSearch<'_> {
    type Hit = Url;

    async fn search(&mut self, keyword: &str) -> Result<Vec<Url>, AcquisitionError> {
        self.locator
            .search_issue_links(self.project_id, keyword)
            .await
    }
}

#[async_trait]
impl IssueLocator for UiLocator {
    async fn find(
        &mut self,
        project_id: &str,
        attribute: &Attribute,
    ) -> Result<Option<Vec<Issue>>, AcquisitionError> {
        if self.total_issue_count(project_id).await? == 0 {
            debug!(project_id, "tracker reports zero issues");
            return Ok(None);
        }

        // Criterion first; synonyms only as fallback, stopping at the
        // first keyword that yields results.
        let keywords = attribute.keywords();
        let links = {
            let mut searcher = TrackerSearch {
                locator: self,
                project_id,
            };
            search_with_fallback(&mut searcher, &keywords).await?
        };

        let mut issues = Vec::new();
        for link in &links {
            match self.fetch_issue_text(link).await {
                Ok(text) => match issue_from_link(link, text) {
                    Some(issue) => issues.push(issue),
                    // A zero or guessed number would collide in the
                    // result record; an unnumberable issue is dropped.
                    None => warn!(link = %link, "skipping issue without a numeric link tail"),
                },
                // One unrenderable issue must not abort the others.
                Err(e) => warn!(link = %link, error = %e, "skipping issue"),
            }
        }
        Ok(Some(issues))
    }

    async fn shutdown(&mut self) -> Result<(), AcquisitionError> {
        // Client is a cloneable handle; closing one handle ends the
        // webdriver session.
        self.client.clone().close().await?;
        Ok(())
    }
}

/// "1,234 Open" style indicator text to a number.
fn parse_count(text: &str) -> u64 {
    text.split_whitespace()
        .next()
        .map(|tok| tok.replace(',', ""))
        .and_then(|tok| tok.parse().ok())
        .unwrap_or(0)
}

fn issue_number_from_url(link: &Url) -> Option<i64> {
    link.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()?
        .parse()
        .ok()
}

/// Builds an [`Issue`] from a fetched page, or `None` when the link's
/// tail carries no issue number.
fn issue_from_link(link: &Url, text: String) -> Option<Issue> {
    let number = issue_number_from_url(link)?;
    let size = text.chars().count() as i64;
    Some(Issue {
        issue_id: link.to_string(),
        number,
        text,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted searcher: fixed hits per keyword, records search order.
    struct ScriptedSearch {
        hits: Vec<(&'static str, Vec<&'static str>)>,
        searched: Vec<String>,
    }

    impl ScriptedSearch {
        fn new(hits: Vec<(&'static str, Vec<&'static str>)>) -> Self {
            Self {
                hits,
                searched: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl KeywordSearch for ScriptedSearch {
        type Hit = &'static str;

        async fn search(&mut self, keyword: &str) -> Result<Vec<&'static str>, AcquisitionError> {
            self.searched.push(keyword.to_string());
            Ok(self
                .hits
                .iter()
                .find(|(k, _)| *k == keyword)
                .map(|(_, hits)| hits.clone())
                .unwrap_or_default())
        }
    }

    fn keywords(kws: &[&str]) -> Vec<String> {
        kws.iter().map(|k| (*k).to_string()).collect()
    }

    #[tokio::test]
    async fn fallback_stops_at_first_keyword_with_results() {
        let mut searcher =
            ScriptedSearch::new(vec![("exploit", vec!["issues/1", "issues/2"])]);
        let hits = search_with_fallback(&mut searcher, &keywords(&["security", "vuln", "exploit"]))
            .await
            .unwrap();
        // Criterion and first synonym came up empty; the second
        // synonym's result set is returned as-is.
        assert_eq!(hits, vec!["issues/1", "issues/2"]);
        assert_eq!(searcher.searched, ["security", "vuln", "exploit"]);
    }

    #[tokio::test]
    async fn criterion_hit_skips_synonym_searches() {
        let mut searcher = ScriptedSearch::new(vec![
            ("security", vec!["issues/9"]),
            ("vuln", vec!["issues/4"]),
        ]);
        let hits = search_with_fallback(&mut searcher, &keywords(&["security", "vuln"]))
            .await
            .unwrap();
        assert_eq!(hits, vec!["issues/9"]);
        assert_eq!(searcher.searched, ["security"]);
    }

    #[tokio::test]
    async fn exhausted_keywords_yield_an_empty_set() {
        let mut searcher = ScriptedSearch::new(vec![]);
        let hits = search_with_fallback(&mut searcher, &keywords(&["security", "vuln"]))
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(searcher.searched, ["security", "vuln"]);
    }

    #[test]
    fn count_indicator_parses_with_thousands_separator() {
        assert_eq!(parse_count("1,234 Open"), 1234);
        assert_eq!(parse_count("0 Open"), 0);
        assert_eq!(parse_count("no results"), 0);
    }

    #[test]
    fn issue_number_is_the_last_path_segment() {
        let link = Url::parse("https://github.com/acme/widget/issues/417").unwrap();
        assert_eq!(issue_number_from_url(&link), Some(417));
        let odd = Url::parse("https://github.com/acme/widget/issues/not-a-number").unwrap();
        assert_eq!(issue_number_from_url(&odd), None);
    }

    #[test]
    fn unnumbered_links_are_dropped_not_zeroed() {
        let link = Url::parse("https://github.com/acme/widget/issues/417").unwrap();
        let issue = issue_from_link(&link, "a body".to_string()).unwrap();
        assert_eq!(issue.number, 417);
        assert_eq!(issue.size, 6);

        // A non-numeric tail used to collapse to number 0, where a
        // second such issue would be deduplicated away on merge.
        let odd = Url::parse("https://github.com/acme/widget/issues/draft").unwrap();
        assert!(issue_from_link(&odd, "another body".to_string()).is_none());
    }

    #[test]
    fn keywords_put_the_criterion_before_synonyms() {
        let attribute = Attribute {
            criterion: "security".into(),
            definition: "def".into(),
            synonyms: vec!["vuln".into(), "exploit".into()],
        };
        assert_eq!(attribute.keywords(), vec!["security", "vuln", "exploit"]);
    }
}
