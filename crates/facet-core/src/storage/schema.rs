//! Schema of the issue corpus, attribute catalog, and result table.
//!
//! `synonyms` and `excerpts` are JSON text in both dialects so rows
//! round-trip identically regardless of the active backend.

pub const SQLITE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS quality_attributes (
    criterion   TEXT PRIMARY KEY,
    definition  TEXT NOT NULL,
    synonyms    TEXT,
    rank        INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS issues (
    issue_id    TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    number      INTEGER NOT NULL,
    body        TEXT NOT NULL,
    size        INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_project_size ON issues(project_id, size);

CREATE TABLE IF NOT EXISTS project_attribute_results (
    project_id  TEXT NOT NULL,
    criterion   TEXT NOT NULL,
    excerpts    TEXT NOT NULL,
    PRIMARY KEY (project_id, criterion)
);
"#;

pub const POSTGRES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS quality_attributes (
    criterion   TEXT PRIMARY KEY,
    definition  TEXT NOT NULL,
    synonyms    TEXT,
    rank        BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS issues (
    issue_id    TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    number      BIGINT NOT NULL,
    body        TEXT NOT NULL,
    size        BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_project_size ON issues(project_id, size);

CREATE TABLE IF NOT EXISTS project_attribute_results (
    project_id  TEXT NOT NULL,
    criterion   TEXT NOT NULL,
    excerpts    TEXT NOT NULL,
    PRIMARY KEY (project_id, criterion)
);
"#;
