use clap::Parser;
use facet_core::config::{Config, LocatorKind};
use facet_core::engine::{RunArtifacts, RunOutcome, RunPolicy, Runner};
use facet_core::errors::ConfigError;
use facet_core::locator::{IssueLocator, QueryLocator, UiLocator};
use facet_core::prompt::PromptBuilder;
use facet_core::providers::llm::OpenAiChatClient;
use facet_core::storage::Store;
use facet_core::tokens::TokenBudgetTruncator;
use facet_core::validate::ResponseValidator;
use facet_core::window::TimeWindowGovernor;
use std::sync::Arc;
use tracing::info;

mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

/// Attribute-scoped issue analysis. Process-wide settings come from the
/// environment (see `.env`); flags override a few of them.
#[derive(Debug, Parser)]
#[command(name = "facet", version, about)]
struct Cli {
    /// Locator strategy: "query" (stored corpus) or "ui" (live tracker)
    #[arg(long)]
    locator: Option<String>,

    /// Skip window governance and start immediately
    #[arg(long)]
    debug: bool,

    /// Projects per page
    #[arg(long)]
    page_size: Option<u32>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(artifacts) => {
            info!(
                outcome = ?artifacts.outcome,
                projects = artifacts.projects_processed,
                merged = artifacts.excerpts_merged,
                "run finished"
            );
            exit_codes::OK
        }
        Err(e) if e.is::<ConfigError>() => {
            eprintln!("config error: {e}");
            exit_codes::CONFIG_ERROR
        }
        Err(e) => {
            eprintln!("fatal: {e:?}");
            exit_codes::RUN_ERROR
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<RunArtifacts> {
    let mut cfg = Config::from_env()?;
    if let Some(raw) = cli.locator.as_deref() {
        cfg.locator = raw.parse::<LocatorKind>()?;
    }
    if cli.debug {
        cfg.debug = true;
        cfg.window.enabled = false;
    }
    if let Some(page_size) = cli.page_size {
        cfg.page_size = page_size;
    }

    let store = Store::open(&cfg)?;

    let endpoint = cfg.provider.resolve_from_env()?;
    let client = Arc::new(OpenAiChatClient::new(
        endpoint,
        cfg.model.clone(),
        cfg.provider.tag(),
    ));

    let locator: Box<dyn IssueLocator> = match cfg.locator {
        LocatorKind::Query => Box::new(QueryLocator::new(store.clone())),
        LocatorKind::Ui => Box::new(
            UiLocator::connect(&cfg.webdriver_url, "https://github.com/").await?,
        ),
    };

    let mut runner = Runner {
        store,
        client,
        locator,
        prompts: PromptBuilder::new(TokenBudgetTruncator::with_default_budget()?),
        validator: ResponseValidator::new(cfg.strict_validation),
        governor: TimeWindowGovernor::new(cfg.window),
        policy: RunPolicy {
            page_size: cfg.page_size,
            ..RunPolicy::default()
        },
    };

    let artifacts = runner.run().await?;
    if artifacts.outcome == RunOutcome::StoppedByWindow {
        info!("stopped at window boundary; re-run tomorrow to continue");
    }
    Ok(artifacts)
}
