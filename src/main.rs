//! review-context: assemble review context for a local diff.
//!
//! Prints the context bundle as JSON on stdout; logs and optional metrics go
//! to stderr.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use review_context::collectors::{self, CollectorSources};
use review_context::config::{Args, Config};
use review_context::context::{BuildParams, ContextEngine};
use review_context::error::{Error, Result};
use review_context::filters::{self, TokenLimitFilter};
use review_context::metrics::Metrics;
use review_context::sources::{LineSymbolAnalyzer, LocalWorkspace};
use review_context::tokens::{
    CompositeTokenCounter, EncoderTokenCounter, RemoteTokenCounter, TokenCounter,
};
use review_context::types::{PullRequestInfo, RepositoryRef};
use review_context::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config: Config = Args::parse().into();

    init_tracing(&config)?;

    info!("review-context v{}", VERSION);
    info!("Workspace: {:?}", config.workspace);

    let diff = tokio::fs::read_to_string(&config.diff).await.map_err(|e| {
        Error::Config(format!("cannot read diff {}: {}", config.diff.display(), e))
    })?;
    let pull_request = load_pull_request(&config).await?;

    let mut workspace = LocalWorkspace::new(&config.workspace).with_diff(diff);
    if let Some(path) = &config.review_config {
        workspace = workspace.with_review_config(path);
    }
    let workspace = Arc::new(workspace);

    let metrics = Metrics::new();
    let remote = match &config.anthropic_base_url {
        Some(url) => RemoteTokenCounter::with_base_url(url)?,
        None => RemoteTokenCounter::new()?,
    }
    .with_metrics(metrics.clone());
    let counter: Arc<dyn TokenCounter> =
        Arc::new(CompositeTokenCounter::new(EncoderTokenCounter::new(), remote));

    let mut engine = ContextEngine::new()
        .with_metrics(metrics.clone())
        .with_token_counter(counter.clone());
    collectors::register_defaults(
        &mut engine,
        &CollectorSources {
            repository: workspace.clone(),
            analyzer: Arc::new(LineSymbolAnalyzer::new()),
            history: Some(workspace.clone()),
            search: Some(workspace),
        },
    );
    filters::register_defaults(
        &mut engine,
        TokenLimitFilter::new(counter)
            .with_max_tokens(config.token_budget)
            .with_context(config.token_counter_context()),
    );
    info!(
        collectors = ?engine.collector_names(),
        filters = ?engine.filter_names(),
        "Pipeline ready"
    );

    let mut repository = RepositoryRef::new(&config.repository);
    repository.default_branch = Some(pull_request.base_branch.clone());
    // The budget goes to the filter directly; metadata overrides are floored at 8000
    let mut params = BuildParams::new(repository, pull_request);
    if let Some(provider) = config.provider {
        params = params.with_token_counter(provider, config.model.clone());
    }

    let bundle = engine.build(&params).await;
    println!("{}", serde_json::to_string_pretty(&bundle)?);

    if config.metrics {
        eprintln!("{}", metrics.to_prometheus());
    }
    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Internal(format!("Failed to set tracing subscriber: {}", e)))
}

/// Pull request metadata from `--pull-request`, or a stand-in for the local diff.
async fn load_pull_request(config: &Config) -> Result<PullRequestInfo> {
    let Some(path) = &config.pull_request else {
        return Ok(PullRequestInfo {
            number: 1,
            title: "Local changes".to_string(),
            head_branch: "HEAD".to_string(),
            head_sha: "HEAD".to_string(),
            base_branch: "main".to_string(),
            repository_full_name: config.repository.clone(),
            ..PullRequestInfo::default()
        });
    };

    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Config(format!("cannot read pull request {}: {}", path.display(), e))
    })?;
    let mut pull_request: PullRequestInfo = serde_json::from_str(&text)?;
    if pull_request.repository_full_name.is_empty() {
        pull_request.repository_full_name = config.repository.clone();
    }
    Ok(pull_request)
}
