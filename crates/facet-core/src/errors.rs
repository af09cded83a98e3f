use thiserror::Error;

/// Fatal startup errors. Nothing has been processed when one of these
/// is raised; the process exits non-zero.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported database kind: {0}")]
    UnsupportedDb(String),
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("unsupported locator: {0}")]
    UnsupportedLocator(String),
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Recoverable per-item failure: the model reply did not honor the
/// output contract. The offending issue is skipped and the run
/// continues.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),
    #[error("missing required property '{0}'")]
    MissingProperty(&'static str),
    #[error("score {0} outside [-1, 1]")]
    ScoreOutOfRange(f64),
}

/// Recoverable locator failure: a query or page read that did not
/// produce issues. Skipped and logged, never fatal to the run.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("issue corpus query failed: {0}")]
    Corpus(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("webdriver command failed: {0}")]
    Driver(String),
}

impl From<fantoccini::error::CmdError> for AcquisitionError {
    fn from(e: fantoccini::error::CmdError) -> Self {
        match e {
            fantoccini::error::CmdError::NoSuchElement(inner) => {
                AcquisitionError::ElementNotFound(inner.to_string())
            }
            other => AcquisitionError::Driver(other.to_string()),
        }
    }
}
