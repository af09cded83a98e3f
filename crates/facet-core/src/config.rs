//! Process-wide configuration, read once at startup and passed by
//! reference into each component's constructor. No module reads the
//! environment after this point.

use crate::errors::ConfigError;
use crate::providers::llm::Provider;
use crate::window::WindowConfig;
use std::env;
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

impl FromStr for DbKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SQLITE" => Ok(DbKind::Sqlite),
            "POSTGRES" => Ok(DbKind::Postgres),
            other => Err(ConfigError::UnsupportedDb(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    /// Structured search over the stored issue corpus.
    Query,
    /// Browser-driven search against the live issue tracker.
    Ui,
}

impl FromStr for LocatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(LocatorKind::Query),
            "ui" => Ok(LocatorKind::Ui),
            other => Err(ConfigError::UnsupportedLocator(other.to_string())),
        }
    }
}

/// Connection settings for whichever database kind is active.
#[derive(Debug, Clone, Default)]
pub struct DbSettings {
    /// SQLite file path.
    pub path: Option<String>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_kind: DbKind,
    pub db: DbSettings,
    pub page_size: u32,
    /// Debug runs skip window governance entirely.
    pub debug: bool,
    pub provider: Provider,
    pub model: String,
    pub locator: LocatorKind,
    pub webdriver_url: String,
    pub window: WindowConfig,
    /// When false, the validator only requires parseable JSON and does
    /// not enforce the score range or property presence.
    pub strict_validation: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_kind: DbKind = env::var("ACTIVE_DB")
            .map_err(|_| ConfigError::MissingEnv("ACTIVE_DB"))?
            .parse()?;

        let page_size = match env::var("PAGE_SIZE") {
            Ok(raw) => raw.trim().parse::<u32>().map_err(|_| ConfigError::Invalid {
                key: "PAGE_SIZE",
                value: raw.clone(),
            })?,
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        let debug = to_bool(&env::var("DEBUG_MODE").unwrap_or_default());

        let provider: Provider = env::var("FACET_PROVIDER")
            .unwrap_or_else(|_| "deepseek".to_string())
            .parse()?;

        let locator: LocatorKind = env::var("FACET_LOCATOR")
            .unwrap_or_else(|_| "query".to_string())
            .parse()?;

        let defaults = WindowConfig::default();
        let window = WindowConfig {
            enabled: !debug,
            start: match env::var("FACET_WINDOW_START") {
                Ok(raw) => parse_hhmm("FACET_WINDOW_START", &raw)?,
                Err(_) => defaults.start,
            },
            stop: match env::var("FACET_WINDOW_STOP") {
                Ok(raw) => parse_hhmm("FACET_WINDOW_STOP", &raw)?,
                Err(_) => defaults.stop,
            },
        };

        Ok(Config {
            db_kind,
            db: DbSettings {
                path: env::var("DB_PATH").ok(),
                name: env::var("DB_NAME").ok(),
                user: env::var("DB_USER").ok(),
                password: env::var("DB_PASSWORD").ok(),
                host: env::var("DB_HOST").ok(),
                port: env::var("DB_PORT").ok(),
            },
            page_size,
            debug,
            provider,
            model: env::var("FACET_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            locator,
            webdriver_url: env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:4444".to_string()),
            window,
            strict_validation: !to_bool(&env::var("FACET_LENIENT").unwrap_or_default()),
        })
    }
}

pub fn to_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn parse_hhmm(key: &'static str, raw: &str) -> Result<chrono::NaiveTime, ConfigError> {
    chrono::NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}
