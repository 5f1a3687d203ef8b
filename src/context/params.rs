//! Parameters for one `build()` call.

use serde_json::Value;
use std::collections::HashMap;

use crate::tokens::Provider;
use crate::types::{PullRequestInfo, RepositoryRef};

/// What to assemble context for.
///
/// Collectors read what they need and decide in `should_collect` whether
/// the parameters are sufficient for them.
#[derive(Debug, Clone, Default)]
pub struct BuildParams {
    pub repository: Option<RepositoryRef>,
    pub pull_request: Option<PullRequestInfo>,
    /// Overrides the budget filter's configured maximum
    pub token_budget: Option<usize>,
    /// Provider the final prompt is counted for
    pub token_provider: Option<Provider>,
    /// Model the final prompt is counted for
    pub token_model: Option<String>,
    /// Anything else a custom collector needs
    pub extra: HashMap<String, Value>,
}

impl BuildParams {
    pub fn new(repository: RepositoryRef, pull_request: PullRequestInfo) -> Self {
        Self {
            repository: Some(repository),
            pull_request: Some(pull_request),
            ..Self::default()
        }
    }

    pub fn with_token_budget(mut self, budget: usize) -> Self {
        self.token_budget = Some(budget);
        self
    }

    pub fn with_token_counter(mut self, provider: Provider, model: Option<String>) -> Self {
        self.token_provider = Some(provider);
        self.token_model = model;
        self
    }

    /// Pull request number, when a valid one was supplied.
    pub fn pr_number(&self) -> Option<u64> {
        self.pull_request
            .as_ref()
            .map(|pr| pr.number)
            .filter(|n| *n > 0)
    }

    /// Head commit of the pull request, when known.
    pub fn head_sha(&self) -> Option<&str> {
        self.pull_request
            .as_ref()
            .map(|pr| pr.head_sha.as_str())
            .filter(|sha| !sha.is_empty())
    }

    /// True when both a repository and a numbered pull request are present.
    pub fn has_pull_request(&self) -> bool {
        self.repository.is_some() && self.pr_number().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_have_no_pull_request() {
        let params = BuildParams::default();
        assert!(!params.has_pull_request());
        assert_eq!(params.pr_number(), None);
        assert_eq!(params.head_sha(), None);
    }

    #[test]
    fn test_pr_accessors() {
        let pr = PullRequestInfo {
            number: 42,
            head_sha: "abc123".to_string(),
            ..PullRequestInfo::default()
        };
        let params = BuildParams::new(RepositoryRef::new("acme/widgets"), pr)
            .with_token_budget(20_000)
            .with_token_counter(Provider::OpenAi, Some("gpt-4o".to_string()));

        assert!(params.has_pull_request());
        assert_eq!(params.pr_number(), Some(42));
        assert_eq!(params.head_sha(), Some("abc123"));
        assert_eq!(params.token_budget, Some(20_000));
        assert_eq!(params.token_provider, Some(Provider::OpenAi));
    }

    #[test]
    fn test_zero_pr_number_is_invalid() {
        let params = BuildParams::new(RepositoryRef::new("a/b"), PullRequestInfo::default());
        assert_eq!(params.pr_number(), None);
        assert!(!params.has_pull_request());
    }
}
