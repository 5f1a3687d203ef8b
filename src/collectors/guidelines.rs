//! Team guideline documents named by the review configuration.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{pull_request_target, truncate_at_boundary};
use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::RepositorySource;
use crate::types::{Guideline, RepositoryRef};

const MAX_GUIDELINES: usize = 5;
const MAX_FILE_BYTES: usize = 51_200;
const ALLOWED_EXTENSIONS: &[&str] = &[".md", ".mdx"];

fn is_allowed_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn truncate_guideline(content: &str, path: &str) -> String {
    let char_limit = MAX_FILE_BYTES * 9 / 10;
    let truncated = truncate_at_boundary(content, char_limit);
    let filename = path.rsplit('/').next().unwrap_or(path);
    format!("{}\n\n[{} truncated due to size limit]", truncated, filename)
}

/// Fills `guidelines`.
pub struct GuidelinesCollector {
    source: Arc<dyn RepositorySource>,
}

impl GuidelinesCollector {
    pub fn new(source: Arc<dyn RepositorySource>) -> Self {
        Self { source }
    }

    async fn fetch(&self, repo: &RepositoryRef, path: &str) -> Option<String> {
        match self.source.file_content(repo, path, None).await {
            Ok(Some(content)) if content.len() > MAX_FILE_BYTES => {
                info!(
                    path = %path,
                    original_size = content.len(),
                    max_size = MAX_FILE_BYTES,
                    "Truncating oversized guideline"
                );
                Some(truncate_guideline(&content, path))
            }
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path, error = %e, "Failed to fetch guideline");
                None
            }
        }
    }
}

#[async_trait]
impl Collector for GuidelinesCollector {
    fn name(&self) -> &str {
        "guidelines"
    }

    fn priority(&self) -> i32 {
        45
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request()
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, _)) = pull_request_target(params) else {
            return Ok(());
        };
        let configured = bundle
            .review_config()
            .map(|config| config.guidelines)
            .unwrap_or_default();
        if configured.is_empty() {
            debug!("No guidelines configured");
            return Ok(());
        }

        let mut guidelines = Vec::new();
        for reference in &configured {
            if guidelines.len() >= MAX_GUIDELINES {
                info!(
                    limit = MAX_GUIDELINES,
                    total_configured = configured.len(),
                    "Maximum guidelines limit reached"
                );
                break;
            }
            if !is_allowed_file(&reference.path) {
                debug!(path = %reference.path, "Skipping unsupported guideline file type");
                continue;
            }
            if let Some(content) = self.fetch(repo, &reference.path).await {
                guidelines.push(Guideline {
                    path: reference.path.clone(),
                    description: reference.description.clone(),
                    content,
                });
            }
        }

        info!(
            repository = %repo.full_name,
            configured = configured.len(),
            fetched = guidelines.len(),
            "Collected guidelines"
        );
        bundle.guidelines = guidelines;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{sample_params, StubRepository};
    use crate::context::metadata_keys;
    use crate::types::{GuidelineRef, ReviewConfig};

    fn bundle_with_guidelines(paths: &[&str]) -> ContextBundle {
        let config = ReviewConfig {
            guidelines: paths
                .iter()
                .map(|p| GuidelineRef {
                    path: p.to_string(),
                    description: Some(format!("About {}", p)),
                })
                .collect(),
            ..ReviewConfig::default()
        };
        let mut bundle = ContextBundle::new();
        bundle
            .set_metadata(metadata_keys::REVIEW_CONFIG, &config)
            .unwrap();
        bundle
    }

    #[test]
    fn test_allowed_file_types() {
        assert!(is_allowed_file("docs/STYLE.md"));
        assert!(is_allowed_file("docs/Guide.MDX"));
        assert!(!is_allowed_file("docs/style.txt"));
        assert!(!is_allowed_file("docs/mdfile"));
    }

    #[tokio::test]
    async fn test_collects_configured_guidelines() {
        let source = StubRepository::default()
            .with_content("docs/STYLE.md", "Use snake_case.")
            .with_content("docs/notes.txt", "ignored");
        let collector = GuidelinesCollector::new(Arc::new(source));

        let mut bundle = bundle_with_guidelines(&["docs/notes.txt", "docs/STYLE.md", "docs/missing.md"]);
        collector.collect(&mut bundle, &sample_params()).await.unwrap();

        assert_eq!(bundle.guidelines.len(), 1);
        let guideline = &bundle.guidelines[0];
        assert_eq!(guideline.path, "docs/STYLE.md");
        assert_eq!(guideline.description.as_deref(), Some("About docs/STYLE.md"));
        assert_eq!(guideline.content, "Use snake_case.");
    }

    #[tokio::test]
    async fn test_caps_guideline_count() {
        let paths: Vec<String> = (0..8).map(|i| format!("docs/g{}.md", i)).collect();
        let mut source = StubRepository::default();
        for path in &paths {
            source = source.with_content(path, "rule");
        }
        let collector = GuidelinesCollector::new(Arc::new(source));

        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let mut bundle = bundle_with_guidelines(&refs);
        collector.collect(&mut bundle, &sample_params()).await.unwrap();
        assert_eq!(bundle.guidelines.len(), MAX_GUIDELINES);
    }

    #[tokio::test]
    async fn test_truncates_oversized_guideline() {
        let content = "rule line\n".repeat(MAX_FILE_BYTES / 5);
        let source = StubRepository::default().with_content("docs/team/RULES.md", &content);
        let collector = GuidelinesCollector::new(Arc::new(source));

        let mut bundle = bundle_with_guidelines(&["docs/team/RULES.md"]);
        collector.collect(&mut bundle, &sample_params()).await.unwrap();

        let text = &bundle.guidelines[0].content;
        assert!(text.ends_with("\n\n[RULES.md truncated due to size limit]"));
        assert!(text.len() < MAX_FILE_BYTES);
    }

    #[tokio::test]
    async fn test_noop_without_config() {
        let source = Arc::new(StubRepository::default());
        let collector = GuidelinesCollector::new(source.clone());
        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();
        assert!(bundle.guidelines.is_empty());
        assert!(source.requests().is_empty());
    }
}
