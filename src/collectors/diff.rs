//! Pull request metadata, changed files and review configuration.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::pull_request_target;
use crate::context::{metadata_keys, BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::RepositorySource;
use crate::types::{RepositoryRef, ReviewConfig};

/// Fills `pull_request`, `files` and `metrics`, and records the review
/// configuration and token settings in metadata.
pub struct DiffCollector {
    source: Arc<dyn RepositorySource>,
}

impl DiffCollector {
    pub fn new(source: Arc<dyn RepositorySource>) -> Self {
        Self { source }
    }

    /// Try the base branch, then the default branch.
    async fn load_review_config(
        &self,
        repo: &RepositoryRef,
        base_branch: &str,
    ) -> Option<(ReviewConfig, String)> {
        let mut branches: Vec<&str> = vec![base_branch];
        if let Some(default_branch) = repo.default_branch.as_deref() {
            branches.push(default_branch);
        }
        branches.retain(|b| !b.is_empty());
        branches.dedup();

        for branch in &branches {
            match self.source.review_config(repo, branch).await {
                Ok(Some(config)) => {
                    debug!(branch = %branch, "Found review config");
                    return Some((config, branch.to_string()));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(branch = %branch, error = %e, "Failed to load review config");
                }
            }
        }

        debug!(tried_branches = ?branches, "No review config found");
        None
    }
}

#[async_trait]
impl Collector for DiffCollector {
    fn name(&self) -> &str {
        "diff"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request()
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, pr)) = pull_request_target(params) else {
            return Ok(());
        };

        let mut pull_request = pr.clone();
        if pull_request.repository_full_name.is_empty() {
            pull_request.repository_full_name = repo.full_name.clone();
        }
        bundle.pull_request = Some(pull_request);

        bundle.files = self.source.pull_request_files(repo, pr.number).await?;
        bundle.recompute_metrics();

        let config_branch = match self.load_review_config(repo, &pr.base_branch).await {
            Some((config, branch)) => {
                bundle.set_metadata(metadata_keys::PATHS_CONFIG, &config.paths)?;
                bundle.set_metadata(metadata_keys::REVIEW_CONFIG, &config)?;
                Some(branch)
            }
            None => None,
        };
        bundle.set_metadata(metadata_keys::CONFIG_FROM_BRANCH, &config_branch)?;

        if let Some(budget) = params.token_budget {
            bundle.set_metadata(metadata_keys::CONTEXT_TOKEN_BUDGET, &budget)?;
        }
        if let Some(provider) = params.token_provider {
            bundle.metadata.insert(
                metadata_keys::TOKEN_COUNTER_PROVIDER.to_string(),
                Value::from(provider.as_str()),
            );
        }
        if let Some(model) = params.token_model.as_deref().filter(|m| !m.is_empty()) {
            bundle.metadata.insert(
                metadata_keys::TOKEN_COUNTER_MODEL.to_string(),
                Value::from(model),
            );
        }

        info!(
            repository = %repo.full_name,
            pr_number = pr.number,
            files_count = bundle.files.len(),
            files_with_patches = bundle.files_with_patch_count(),
            config_from_branch = ?config_branch,
            "Collected PR data"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{sample_params, StubRepository};
    use crate::tokens::Provider;
    use crate::types::FileChange;

    fn repository_with_files() -> StubRepository {
        StubRepository {
            files: vec![
                FileChange::new("src/lib.rs", 10, 2).with_patch("@@ -1 +1 @@\n+a"),
                FileChange::new("README.md", 1, 1),
            ],
            ..StubRepository::default()
        }
    }

    #[tokio::test]
    async fn test_collects_pull_request_and_metrics() {
        let collector = DiffCollector::new(Arc::new(repository_with_files()));
        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();

        let pr = bundle.pull_request.as_ref().unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(bundle.files.len(), 2);
        assert_eq!(bundle.metrics.files_changed, 2);
        assert_eq!(bundle.metrics.lines_added, 11);
        assert_eq!(bundle.metrics.lines_deleted, 3);
        assert_eq!(bundle.files_with_patch_count(), 1);
        assert_eq!(bundle.metadata.get(metadata_keys::CONFIG_FROM_BRANCH), Some(&Value::Null));
        assert!(bundle.review_config().is_none());
    }

    #[tokio::test]
    async fn test_config_falls_back_to_default_branch() {
        let mut source = repository_with_files();
        source.configs.insert(
            "main".to_string(),
            "paths:\n  ignore:\n    - \"docs/**\"\nguidelines:\n  - path: docs/STYLE.md\n".to_string(),
        );
        let source = Arc::new(source);
        let collector = DiffCollector::new(source.clone());

        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();

        assert_eq!(bundle.metadata_str(metadata_keys::CONFIG_FROM_BRANCH), Some("main"));
        assert_eq!(bundle.paths_config().unwrap().ignore, vec!["docs/**"]);
        assert_eq!(bundle.review_config().unwrap().guidelines.len(), 1);

        let requests = source.requests();
        assert_eq!(
            requests,
            vec![".review-context.yaml@develop", ".review-context.yaml@main"]
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_skipped() {
        let mut source = repository_with_files();
        source
            .configs
            .insert("develop".to_string(), "paths: [unclosed".to_string());
        source.configs.insert("main".to_string(), "paths: {}\n".to_string());
        let collector = DiffCollector::new(Arc::new(source));

        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();
        assert_eq!(bundle.metadata_str(metadata_keys::CONFIG_FROM_BRANCH), Some("main"));
    }

    #[tokio::test]
    async fn test_records_token_settings() {
        let collector = DiffCollector::new(Arc::new(repository_with_files()));
        let params = sample_params()
            .with_token_budget(20_000)
            .with_token_counter(Provider::Anthropic, Some("claude-sonnet-4-5".to_string()));

        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &params).await.unwrap();

        assert_eq!(bundle.metadata_u64(metadata_keys::CONTEXT_TOKEN_BUDGET), Some(20_000));
        assert_eq!(
            bundle.metadata_str(metadata_keys::TOKEN_COUNTER_PROVIDER),
            Some("anthropic")
        );
        assert_eq!(
            bundle.metadata_str(metadata_keys::TOKEN_COUNTER_MODEL),
            Some("claude-sonnet-4-5")
        );
    }

    #[tokio::test]
    async fn test_file_listing_failure_propagates() {
        let source = StubRepository {
            fail_files: true,
            ..StubRepository::default()
        };
        let collector = DiffCollector::new(Arc::new(source));
        let mut bundle = ContextBundle::new();
        assert!(collector.collect(&mut bundle, &sample_params()).await.is_err());
        assert!(bundle.pull_request.is_some());
    }

    #[test]
    fn test_requires_pull_request() {
        let collector = DiffCollector::new(Arc::new(StubRepository::default()));
        assert!(collector.should_collect(&sample_params()));
        assert!(!collector.should_collect(&BuildParams::default()));
    }
}
