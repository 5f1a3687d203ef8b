//! Configuration for the `review-context` binary.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::tokens::{Provider, TokenCountMode, TokenCounterContext};
use crate::DEFAULT_TOKEN_BUDGET;

/// Repository name used when none is given.
pub const DEFAULT_REPOSITORY: &str = "local/workspace";

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "review-context")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Assemble budgeted, redacted review context for a pull request")]
pub struct Args {
    /// Unified diff of the pull request
    #[arg(long, env = "REVIEW_CONTEXT_DIFF")]
    pub diff: PathBuf,

    /// Pull request metadata as JSON
    #[arg(long, env = "REVIEW_CONTEXT_PULL_REQUEST")]
    pub pull_request: Option<PathBuf>,

    /// Repository checkout (defaults to the current directory)
    #[arg(short, long, env = "REVIEW_CONTEXT_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Repository name as owner/name
    #[arg(long, default_value = DEFAULT_REPOSITORY, env = "REVIEW_CONTEXT_REPOSITORY")]
    pub repository: String,

    /// Review configuration file (overrides .review-context.yaml)
    #[arg(long, env = "REVIEW_CONTEXT_CONFIG")]
    pub review_config: Option<PathBuf>,

    /// Token budget for the assembled context, used as given
    #[arg(long, default_value = "80000", env = "REVIEW_CONTEXT_TOKEN_BUDGET")]
    pub token_budget: usize,

    /// Provider the context is counted for
    #[arg(long, value_enum, env = "REVIEW_CONTEXT_PROVIDER")]
    pub provider: Option<Provider>,

    /// Model the context is counted for
    #[arg(long, env = "REVIEW_CONTEXT_MODEL")]
    pub model: Option<String>,

    /// Count tokens with the provider's counting API when possible
    #[arg(long, env = "REVIEW_CONTEXT_PRECISE")]
    pub precise: bool,

    /// Anthropic API key for precise counting
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Anthropic API URL
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    pub anthropic_base_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "REVIEW_CONTEXT_DEBUG")]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long, env = "REVIEW_CONTEXT_JSON_LOGS")]
    pub json_logs: bool,

    /// Print Prometheus metrics to stderr after the build
    #[arg(long, env = "REVIEW_CONTEXT_METRICS")]
    pub metrics: bool,
}

/// Resolved configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Repository checkout
    pub workspace: PathBuf,
    /// Unified diff file
    #[serde(default)]
    pub diff: PathBuf,
    /// Pull request metadata file
    pub pull_request: Option<PathBuf>,
    /// Repository name
    pub repository: String,
    /// Review configuration override
    pub review_config: Option<PathBuf>,
    /// Token budget
    pub token_budget: usize,
    /// Counting mode
    pub token_mode: TokenCountMode,
    /// Counting provider
    pub provider: Option<Provider>,
    /// Counting model
    pub model: Option<String>,
    /// Anthropic API key
    #[serde(skip_serializing, default)]
    pub anthropic_api_key: Option<String>,
    /// Anthropic API URL
    pub anthropic_base_url: Option<String>,
    /// Debug mode
    pub debug: bool,
    /// JSON logs
    pub json_logs: bool,
    /// Metrics output enabled
    pub metrics: bool,
}

impl Config {
    /// Counting context for the configured provider, model and mode.
    pub fn token_counter_context(&self) -> TokenCounterContext {
        TokenCounterContext::new(self.provider, self.model.clone())
            .with_mode(self.token_mode, self.anthropic_api_key.clone())
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            workspace: args.workspace.unwrap_or_else(|| PathBuf::from(".")),
            diff: args.diff,
            pull_request: args.pull_request,
            repository: args.repository,
            review_config: args.review_config,
            token_budget: args.token_budget,
            token_mode: if args.precise {
                TokenCountMode::Precise
            } else {
                TokenCountMode::Estimate
            },
            provider: args.provider,
            model: args.model.filter(|m| !m.is_empty()),
            anthropic_api_key: args.anthropic_api_key.filter(|k| !k.is_empty()),
            anthropic_base_url: args.anthropic_base_url,
            debug: args.debug,
            json_logs: args.json_logs,
            metrics: args.metrics,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            diff: PathBuf::new(),
            pull_request: None,
            repository: DEFAULT_REPOSITORY.to_string(),
            review_config: None,
            token_budget: DEFAULT_TOKEN_BUDGET,
            token_mode: TokenCountMode::Estimate,
            provider: None,
            model: None,
            anthropic_api_key: None,
            anthropic_base_url: None,
            debug: false,
            json_logs: false,
            metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.workspace, PathBuf::from("."));
        assert_eq!(config.diff, PathBuf::new());
        assert_eq!(config.repository, DEFAULT_REPOSITORY);
        assert_eq!(config.token_budget, 80_000);
        assert_eq!(config.token_mode, TokenCountMode::Estimate);
        assert!(config.provider.is_none());
        assert!(!config.debug);
        assert!(!config.metrics);
    }

    #[test]
    fn test_args_parse_to_config() {
        let args = Args::try_parse_from([
            "review-context",
            "--diff",
            "changes.diff",
            "--workspace",
            "/repo",
            "--provider",
            "anthropic",
            "--model",
            "claude-sonnet-4-5",
            "--precise",
            "--anthropic-api-key",
            "sk-test",
            "--token-budget",
            "120000",
            "--metrics",
        ])
        .unwrap();

        let config: Config = args.into();

        assert_eq!(config.diff, PathBuf::from("changes.diff"));
        assert_eq!(config.workspace, PathBuf::from("/repo"));
        assert_eq!(config.provider, Some(Provider::Anthropic));
        assert_eq!(config.token_mode, TokenCountMode::Precise);
        assert_eq!(config.token_budget, 120_000);
        assert!(config.metrics);

        let context = config.token_counter_context();
        assert!(context.is_precise());
        assert_eq!(context.api_key(), Some("sk-test"));
        assert_eq!(context.model(), Some("claude-sonnet-4-5"));
    }

    #[test]
    fn test_args_require_diff() {
        assert!(Args::try_parse_from(["review-context"]).is_err());
    }

    #[test]
    fn test_args_reject_unknown_provider() {
        let result = Args::try_parse_from([
            "review-context",
            "--diff",
            "x.diff",
            "--provider",
            "unknown",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialization_omits_api_key() {
        let config = Config {
            provider: Some(Provider::OpenAi),
            anthropic_api_key: Some("sk-secret".to_string()),
            ..Config::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"provider\":\"openai\""));
        assert!(json.contains("\"token_mode\":\"estimate\""));
        assert!(!json.contains("sk-secret"));

        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.provider, Some(Provider::OpenAi));
        assert!(restored.anthropic_api_key.is_none());
    }
}
