use crate::config::{Config, DbKind};
use crate::model::{Attribute, Issue, ScoredExcerpt};
use anyhow::Context;
use rusqlite::{OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// What a merge did to the (project, criterion) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Appended,
    /// An excerpt for this issue number was already present; the record
    /// was left untouched.
    Duplicate,
}

enum DbConn {
    Sqlite(Arc<Mutex<rusqlite::Connection>>),
    Postgres(Arc<Mutex<postgres::Client>>),
}

impl Clone for DbConn {
    fn clone(&self) -> Self {
        match self {
            DbConn::Sqlite(c) => DbConn::Sqlite(Arc::clone(c)),
            DbConn::Postgres(c) => DbConn::Postgres(Arc::clone(c)),
        }
    }
}

/// Access to the issue corpus, the attribute catalog, and the result
/// table, over either backend. The connection is long-lived and shared
/// for the whole run.
#[derive(Clone)]
pub struct Store {
    conn: DbConn,
}

impl Store {
    pub fn open(cfg: &Config) -> anyhow::Result<Self> {
        match cfg.db_kind {
            DbKind::Sqlite => {
                let path = cfg
                    .db
                    .path
                    .as_deref()
                    .context("DB_PATH is required for the sqlite backend")?;
                Self::open_sqlite(path)
            }
            DbKind::Postgres => {
                let params = format!(
                    "host={} port={} dbname={} user={} password={}",
                    cfg.db.host.as_deref().unwrap_or("localhost"),
                    cfg.db.port.as_deref().unwrap_or("5432"),
                    cfg.db.name.as_deref().unwrap_or_default(),
                    cfg.db.user.as_deref().unwrap_or_default(),
                    cfg.db.password.as_deref().unwrap_or_default(),
                );
                let client = postgres::Client::connect(&params, postgres::NoTls)
                    .context("failed to connect to postgres")?;
                Ok(Self {
                    conn: DbConn::Postgres(Arc::new(Mutex::new(client))),
                })
            }
        }
    }

    pub fn open_sqlite(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path).context("failed to open sqlite db")?;
        Ok(Self {
            conn: DbConn::Sqlite(Arc::new(Mutex::new(conn))),
        })
    }

    /// In-memory SQLite store, used by tests.
    pub fn memory() -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: DbConn::Sqlite(Arc::new(Mutex::new(conn))),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        match &self.conn {
            DbConn::Sqlite(c) => {
                let conn = c.lock().unwrap();
                conn.execute_batch(super::schema::SQLITE_DDL)?;
            }
            DbConn::Postgres(c) => {
                let mut client = c.lock().unwrap();
                client.batch_execute(super::schema::POSTGRES_DDL)?;
            }
        }
        Ok(())
    }

    /// Ordered attribute catalog, capped to `limit` entries.
    pub fn load_attributes(&self, limit: u32) -> anyhow::Result<Vec<Attribute>> {
        let sql_sqlite = "SELECT criterion, definition, synonyms FROM quality_attributes \
                          ORDER BY rank ASC LIMIT ?1";
        let sql_pg = "SELECT criterion, definition, synonyms FROM quality_attributes \
                      ORDER BY rank ASC LIMIT $1";
        match &self.conn {
            DbConn::Sqlite(c) => {
                let conn = c.lock().unwrap();
                let mut stmt = conn.prepare(sql_sqlite)?;
                let rows = stmt.query_map([i64::from(limit)], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?;
                let mut attrs = Vec::new();
                for row in rows {
                    let (criterion, definition, synonyms) = row?;
                    attrs.push(attribute_from_row(criterion, definition, synonyms)?);
                }
                Ok(attrs)
            }
            DbConn::Postgres(c) => {
                let mut client = c.lock().unwrap();
                let rows = client.query(sql_pg, &[&i64::from(limit)])?;
                let mut attrs = Vec::new();
                for row in rows {
                    attrs.push(attribute_from_row(
                        row.get::<_, String>(0),
                        row.get::<_, String>(1),
                        row.get::<_, Option<String>>(2),
                    )?);
                }
                Ok(attrs)
            }
        }
    }

    /// One page of project ids, largest issue volume first. Projects at
    /// or below `min_issues` issues are not candidates.
    pub fn page_projects(
        &self,
        min_issues: i64,
        limit: u32,
        offset: u64,
    ) -> anyhow::Result<Vec<String>> {
        let sql_sqlite = "SELECT project_id, COUNT(issue_id) AS issue_count FROM issues \
                          GROUP BY project_id HAVING COUNT(issue_id) > ?1 \
                          ORDER BY issue_count DESC LIMIT ?2 OFFSET ?3";
        let sql_pg = "SELECT project_id, COUNT(issue_id) AS issue_count FROM issues \
                      GROUP BY project_id HAVING COUNT(issue_id) > $1 \
                      ORDER BY issue_count DESC LIMIT $2 OFFSET $3";
        match &self.conn {
            DbConn::Sqlite(c) => {
                let conn = c.lock().unwrap();
                let mut stmt = conn.prepare(sql_sqlite)?;
                let rows = stmt.query_map(
                    rusqlite::params![min_issues, i64::from(limit), offset as i64],
                    |row| row.get::<_, String>(0),
                )?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
            }
            DbConn::Postgres(c) => {
                let mut client = c.lock().unwrap();
                let rows = client.query(
                    sql_pg,
                    &[&min_issues, &i64::from(limit), &(offset as i64)],
                )?;
                Ok(rows
                    .into_iter()
                    .map(|row| row.get::<_, String>(0))
                    .collect())
            }
        }
    }

    /// Issues of `project_id` larger than `min_size` whose body contains
    /// any keyword (case-insensitive substring), largest first, capped
    /// to `limit`.
    pub fn find_issues(
        &self,
        project_id: &str,
        keywords: &[String],
        min_size: i64,
        limit: u32,
    ) -> anyhow::Result<Vec<Issue>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        match &self.conn {
            DbConn::Sqlite(c) => {
                let mut sql = String::from(
                    "SELECT issue_id, number, body, size FROM issues \
                     WHERE project_id = ?1 AND size > ?2 AND (",
                );
                for i in 0..keywords.len() {
                    if i > 0 {
                        sql.push_str(" OR ");
                    }
                    sql.push_str(&format!("body LIKE ?{}", i + 3));
                }
                sql.push_str(&format!(
                    ") ORDER BY size DESC LIMIT ?{}",
                    keywords.len() + 3
                ));

                let mut params: Vec<rusqlite::types::Value> =
                    vec![project_id.to_string().into(), min_size.into()];
                for kw in keywords {
                    params.push(format!("%{}%", kw).into());
                }
                params.push(i64::from(limit).into());

                let conn = c.lock().unwrap();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                    Ok(Issue {
                        issue_id: row.get(0)?,
                        number: row.get(1)?,
                        text: row.get(2)?,
                        size: row.get(3)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
            }
            DbConn::Postgres(c) => {
                let mut sql = String::from(
                    "SELECT issue_id, number, body, size FROM issues \
                     WHERE project_id = $1 AND size > $2 AND (",
                );
                for i in 0..keywords.len() {
                    if i > 0 {
                        sql.push_str(" OR ");
                    }
                    sql.push_str(&format!("body ILIKE ${}", i + 3));
                }
                sql.push_str(&format!(
                    ") ORDER BY size DESC LIMIT ${}",
                    keywords.len() + 3
                ));

                let patterns: Vec<String> =
                    keywords.iter().map(|kw| format!("%{}%", kw)).collect();
                let project_id = project_id.to_string();
                let limit = i64::from(limit);
                let mut params: Vec<&(dyn postgres::types::ToSql + Sync)> =
                    vec![&project_id, &min_size];
                for p in &patterns {
                    params.push(p);
                }
                params.push(&limit);

                let mut client = c.lock().unwrap();
                let rows = client.query(&sql, &params)?;
                Ok(rows
                    .into_iter()
                    .map(|row| Issue {
                        issue_id: row.get(0),
                        number: row.get(1),
                        text: row.get(2),
                        size: row.get(3),
                    })
                    .collect())
            }
        }
    }

    /// Completion marker: a (project, criterion) pair with a record is
    /// never reprocessed.
    pub fn has_result(&self, project_id: &str, criterion: &str) -> anyhow::Result<bool> {
        Ok(self.get_result(project_id, criterion)?.is_some())
    }

    pub fn get_result(
        &self,
        project_id: &str,
        criterion: &str,
    ) -> anyhow::Result<Option<Vec<ScoredExcerpt>>> {
        let raw = match &self.conn {
            DbConn::Sqlite(c) => {
                let conn = c.lock().unwrap();
                conn.query_row(
                    "SELECT excerpts FROM project_attribute_results \
                     WHERE project_id = ?1 AND criterion = ?2",
                    rusqlite::params![project_id, criterion],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
            }
            DbConn::Postgres(c) => {
                let mut client = c.lock().unwrap();
                client
                    .query_opt(
                        "SELECT excerpts FROM project_attribute_results \
                         WHERE project_id = $1 AND criterion = $2",
                        &[&project_id, &criterion],
                    )?
                    .map(|row| row.get::<_, String>(0))
            }
        };
        match raw {
            Some(json) => {
                let excerpts: Vec<ScoredExcerpt> = serde_json::from_str(&json)
                    .context("corrupt excerpts JSON in result table")?;
                Ok(Some(excerpts))
            }
            None => Ok(None),
        }
    }

    /// Appends `excerpt` to the (project, criterion) record, creating it
    /// if absent, inside a single transaction. An excerpt for an issue
    /// number already present is skipped so crash-reruns cannot
    /// duplicate entries.
    pub fn merge_result(
        &self,
        project_id: &str,
        criterion: &str,
        excerpt: &ScoredExcerpt,
    ) -> anyhow::Result<MergeOutcome> {
        let outcome = match &self.conn {
            DbConn::Sqlite(c) => {
                let mut conn = c.lock().unwrap();
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT excerpts FROM project_attribute_results \
                         WHERE project_id = ?1 AND criterion = ?2",
                        rusqlite::params![project_id, criterion],
                        |row| row.get(0),
                    )
                    .optional()?;
                let (payload, outcome) = merged_payload(existing.as_deref(), excerpt)?;
                if let Some(payload) = payload {
                    match outcome {
                        MergeOutcome::Inserted => {
                            tx.execute(
                                "INSERT INTO project_attribute_results \
                                 (project_id, criterion, excerpts) VALUES (?1, ?2, ?3)",
                                rusqlite::params![project_id, criterion, payload],
                            )?;
                        }
                        _ => {
                            tx.execute(
                                "UPDATE project_attribute_results SET excerpts = ?1 \
                                 WHERE project_id = ?2 AND criterion = ?3",
                                rusqlite::params![payload, project_id, criterion],
                            )?;
                        }
                    }
                }
                tx.commit()?;
                outcome
            }
            DbConn::Postgres(c) => {
                let mut client = c.lock().unwrap();
                let mut tx = client.transaction()?;
                let existing: Option<String> = tx
                    .query_opt(
                        "SELECT excerpts FROM project_attribute_results \
                         WHERE project_id = $1 AND criterion = $2 FOR UPDATE",
                        &[&project_id, &criterion],
                    )?
                    .map(|row| row.get(0));
                let (payload, outcome) = merged_payload(existing.as_deref(), excerpt)?;
                if let Some(payload) = payload {
                    match outcome {
                        MergeOutcome::Inserted => {
                            tx.execute(
                                "INSERT INTO project_attribute_results \
                                 (project_id, criterion, excerpts) VALUES ($1, $2, $3)",
                                &[&project_id, &criterion, &payload],
                            )?;
                        }
                        _ => {
                            tx.execute(
                                "UPDATE project_attribute_results SET excerpts = $1 \
                                 WHERE project_id = $2 AND criterion = $3",
                                &[&payload, &project_id, &criterion],
                            )?;
                        }
                    }
                }
                tx.commit()?;
                outcome
            }
        };
        debug!(project_id, criterion, ?outcome, "merged scored excerpt");
        Ok(outcome)
    }
}

impl Store {
    /// Ingest/fixture helper: adds one issue to the corpus.
    pub fn insert_issue(
        &self,
        issue_id: &str,
        project_id: &str,
        number: i64,
        body: &str,
    ) -> anyhow::Result<()> {
        let size = body.chars().count() as i64;
        match &self.conn {
            DbConn::Sqlite(c) => {
                let conn = c.lock().unwrap();
                conn.execute(
                    "INSERT INTO issues (issue_id, project_id, number, body, size) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![issue_id, project_id, number, body, size],
                )?;
            }
            DbConn::Postgres(c) => {
                let mut client = c.lock().unwrap();
                client.execute(
                    "INSERT INTO issues (issue_id, project_id, number, body, size) \
                     VALUES ($1, $2, $3, $4, $5)",
                    &[&issue_id, &project_id, &number, &body, &size],
                )?;
            }
        }
        Ok(())
    }

    /// Ingest/fixture helper: adds one catalog attribute.
    pub fn insert_attribute(
        &self,
        criterion: &str,
        definition: &str,
        synonyms: &[&str],
        rank: i64,
    ) -> anyhow::Result<()> {
        let synonyms = serde_json::to_string(synonyms)?;
        match &self.conn {
            DbConn::Sqlite(c) => {
                let conn = c.lock().unwrap();
                conn.execute(
                    "INSERT INTO quality_attributes (criterion, definition, synonyms, rank) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![criterion, definition, synonyms, rank],
                )?;
            }
            DbConn::Postgres(c) => {
                let mut client = c.lock().unwrap();
                client.execute(
                    "INSERT INTO quality_attributes (criterion, definition, synonyms, rank) \
                     VALUES ($1, $2, $3, $4)",
                    &[&criterion, &definition, &synonyms, &rank],
                )?;
            }
        }
        Ok(())
    }
}

fn attribute_from_row(
    criterion: String,
    definition: String,
    synonyms: Option<String>,
) -> anyhow::Result<Attribute> {
    let synonyms = match synonyms {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Vec<String>>(&raw)
            .context("corrupt synonyms JSON in attribute catalog")?
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    Ok(Attribute {
        criterion: criterion.trim().to_string(),
        definition: definition.trim().to_string(),
        synonyms,
    })
}

/// Computes the rewritten collection. Returns `None` payload when the
/// record should be left as-is (duplicate issue number).
fn merged_payload(
    existing: Option<&str>,
    excerpt: &ScoredExcerpt,
) -> anyhow::Result<(Option<String>, MergeOutcome)> {
    match existing {
        None => {
            let payload = serde_json::to_string(&vec![excerpt])?;
            Ok((Some(payload), MergeOutcome::Inserted))
        }
        Some(raw) => {
            let mut excerpts: Vec<ScoredExcerpt> =
                serde_json::from_str(raw).context("corrupt excerpts JSON in result table")?;
            if excerpts.iter().any(|e| e.issue_number == excerpt.issue_number) {
                return Ok((None, MergeOutcome::Duplicate));
            }
            excerpts.push(excerpt.clone());
            Ok((Some(serde_json::to_string(&excerpts)?), MergeOutcome::Appended))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> Store {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        store
    }

    fn excerpt(issue_number: i64, score: f64) -> ScoredExcerpt {
        ScoredExcerpt {
            reason: format!("excerpt for {issue_number}"),
            score,
            issue_number,
        }
    }

    #[test]
    fn merge_inserts_then_appends_in_call_order() {
        let store = seeded_store();
        assert_eq!(
            store.merge_result("p1", "security", &excerpt(1, -0.5)).unwrap(),
            MergeOutcome::Inserted
        );
        assert_eq!(
            store.merge_result("p1", "security", &excerpt(2, 0.25)).unwrap(),
            MergeOutcome::Appended
        );

        let stored = store.get_result("p1", "security").unwrap().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].issue_number, 1);
        assert_eq!(stored[1].issue_number, 2);
    }

    #[test]
    fn merge_skips_duplicate_issue_numbers() {
        let store = seeded_store();
        store.merge_result("p1", "security", &excerpt(1, -0.5)).unwrap();
        assert_eq!(
            store.merge_result("p1", "security", &excerpt(1, 0.9)).unwrap(),
            MergeOutcome::Duplicate
        );
        let stored = store.get_result("p1", "security").unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].score, -0.5);
    }

    #[test]
    fn has_result_reflects_record_existence() {
        let store = seeded_store();
        assert!(!store.has_result("p1", "security").unwrap());
        store.merge_result("p1", "security", &excerpt(1, 0.0)).unwrap();
        assert!(store.has_result("p1", "security").unwrap());
        assert!(!store.has_result("p1", "performance").unwrap());
    }

    #[test]
    fn attributes_come_back_in_rank_order_and_capped() {
        let store = seeded_store();
        for (criterion, rank) in [("security", 2), ("performance", 1), ("usability", 3)] {
            store
                .insert_attribute(criterion, "def", &[" vuln "], rank)
                .unwrap();
        }
        let attrs = store.load_attributes(2).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].criterion, "performance");
        assert_eq!(attrs[1].criterion, "security");
        assert_eq!(attrs[0].synonyms, vec!["vuln".to_string()]);
    }

    #[test]
    fn find_issues_filters_orders_and_caps() {
        let store = seeded_store();
        let filler = "x".repeat(1500);
        store
            .insert_issue("a", "p1", 1, &format!("a SECURITY flaw {filler}"))
            .unwrap();
        store
            .insert_issue("b", "p1", 2, &format!("{filler}{filler} security hole"))
            .unwrap();
        store.insert_issue("c", "p1", 3, "security but tiny").unwrap();
        store
            .insert_issue("d", "p2", 4, &format!("security {filler}"))
            .unwrap();
        store
            .insert_issue("e", "p1", 5, &format!("unrelated {filler}"))
            .unwrap();

        let found = store
            .find_issues("p1", &["security".to_string()], 1000, 4)
            .unwrap();
        assert_eq!(
            found.iter().map(|i| i.issue_id.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
    }

    #[test]
    fn find_issues_matches_any_keyword() {
        let store = seeded_store();
        let filler = "y".repeat(1200);
        store
            .insert_issue("a", "p1", 1, &format!("a vuln report {filler}"))
            .unwrap();
        let kws = vec!["security".to_string(), "vuln".to_string()];
        let found = store.find_issues("p1", &kws, 1000, 4).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].number, 1);
    }

    #[test]
    fn page_projects_orders_by_volume_and_pages() {
        let store = seeded_store();
        for n in 0..5 {
            store.insert_issue(&format!("p1-{n}"), "p1", n, "body").unwrap();
        }
        for n in 0..3 {
            store.insert_issue(&format!("p2-{n}"), "p2", n, "body").unwrap();
        }
        store.insert_issue("p3-0", "p3", 0, "body").unwrap();

        let first = store.page_projects(0, 2, 0).unwrap();
        assert_eq!(first, vec!["p1".to_string(), "p2".to_string()]);
        let second = store.page_projects(0, 2, 2).unwrap();
        assert_eq!(second, vec!["p3".to_string()]);
        let third = store.page_projects(0, 2, 4).unwrap();
        assert!(third.is_empty());

        // threshold excludes low-volume projects
        let gated = store.page_projects(3, 10, 0).unwrap();
        assert_eq!(gated, vec!["p1".to_string()]);
    }

    #[test]
    fn sqlite_file_store_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("facet.db");
        {
            let store = Store::open_sqlite(&path).unwrap();
            store.init_schema().unwrap();
            store.merge_result("p1", "security", &excerpt(1, -0.25)).unwrap();
        }
        let reopened = Store::open_sqlite(&path).unwrap();
        let stored = reopened.get_result("p1", "security").unwrap().unwrap();
        assert_eq!(stored[0].issue_number, 1);
    }
}
