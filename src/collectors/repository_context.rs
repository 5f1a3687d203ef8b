//! README and contributing guide from the default branch.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{pull_request_target, truncate_at_boundary};
use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::RepositorySource;
use crate::types::{RepositoryDocs, RepositoryRef};

const MAX_CONTENT_CHARS: usize = 16_000;

const README_FILES: &[&str] = &["README.md", "readme.md", "README.MD", "README", "README.txt"];

const CONTRIBUTING_FILES: &[&str] = &[
    "CONTRIBUTING.md",
    "contributing.md",
    ".github/CONTRIBUTING.md",
    "docs/CONTRIBUTING.md",
    "CONTRIBUTING",
];

fn truncate_document(content: &str, label: &str) -> String {
    let truncated = truncate_at_boundary(content, MAX_CONTENT_CHARS);
    if truncated.len() == content.len() {
        content.to_string()
    } else {
        format!("{}\n\n[{} truncated due to length]", truncated, label)
    }
}

/// Fills `repository_docs`.
pub struct RepositoryContextCollector {
    source: Arc<dyn RepositorySource>,
}

impl RepositoryContextCollector {
    pub fn new(source: Arc<dyn RepositorySource>) -> Self {
        Self { source }
    }

    /// First candidate with non-empty content, and its path.
    async fn first_available(
        &self,
        repo: &RepositoryRef,
        candidates: &[&str],
    ) -> Option<(String, String)> {
        for path in candidates {
            match self.source.file_content(repo, path, None).await {
                Ok(Some(content)) if !content.is_empty() => {
                    return Some((path.to_string(), content));
                }
                Ok(_) => {}
                Err(e) => debug!(path = %path, error = %e, "Failed to fetch file"),
            }
        }
        None
    }
}

#[async_trait]
impl Collector for RepositoryContextCollector {
    fn name(&self) -> &str {
        "repository_context"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request()
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, _)) = pull_request_target(params) else {
            return Ok(());
        };

        let mut docs = RepositoryDocs::default();
        if let Some((path, content)) = self.first_available(repo, README_FILES).await {
            docs.readme = Some(truncate_document(&content, "README"));
            docs.readme_path = Some(path);
        }
        if let Some((path, content)) = self.first_available(repo, CONTRIBUTING_FILES).await {
            docs.contributing = Some(truncate_document(&content, "CONTRIBUTING"));
            docs.contributing_path = Some(path);
        }

        info!(
            repository = %repo.full_name,
            has_readme = docs.readme.is_some(),
            has_contributing = docs.contributing.is_some(),
            "Collected repository context"
        );
        bundle.repository_docs = docs;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{sample_params, StubRepository};

    #[tokio::test]
    async fn test_prefers_first_non_empty_variant() {
        let source = StubRepository {
            failing_paths: vec!["CONTRIBUTING.md".to_string()],
            ..StubRepository::default()
        }
        .with_content("README.md", "")
        .with_content("README", "# Shop\n\nSells things.")
        .with_content(".github/CONTRIBUTING.md", "Run the tests.");
        let source = Arc::new(source);
        let collector = RepositoryContextCollector::new(source.clone());

        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();

        let docs = &bundle.repository_docs;
        assert_eq!(docs.readme.as_deref(), Some("# Shop\n\nSells things."));
        assert_eq!(docs.readme_path.as_deref(), Some("README"));
        assert_eq!(docs.contributing_path.as_deref(), Some(".github/CONTRIBUTING.md"));
        assert!(source.requests().iter().all(|r| r.ends_with('@')));
    }

    #[tokio::test]
    async fn test_truncates_long_readme() {
        let paragraph = format!("{}\n\n", "word ".repeat(200));
        let source = StubRepository::default().with_content("README.md", &paragraph.repeat(40));
        let collector = RepositoryContextCollector::new(Arc::new(source));

        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();

        let readme = bundle.repository_docs.readme.unwrap();
        assert!(readme.ends_with("\n\n[README truncated due to length]"));
        assert!(readme.chars().count() <= MAX_CONTENT_CHARS + 40);
        assert!(bundle.repository_docs.contributing.is_none());
    }

    #[test]
    fn test_short_document_is_untouched() {
        assert_eq!(truncate_document("hello", "README"), "hello");
    }
}
