//! Local checkout as a data source.
//!
//! Serves pull request files from a unified diff, file text from the working
//! tree, keyword search by walking the tree, and review history from JSON
//! files under `.review-context/reviews/<pr>.json`.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::{
    diff_parser, CodeMatch, CodeSearch, RepositorySource, ReviewHistorySource, REVIEW_CONFIG_PATH,
};
use crate::error::{Error, Result};
use crate::redaction::is_sensitive_file;
use crate::types::{FileChange, PastReview, RepositoryRef, ReviewConfig};
use crate::MAX_FILE_SIZE;

const SOURCE_NAME: &str = "local";

/// Directories never searched.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", "vendor", "dist", "build"];

const MAX_SNIPPET_CHARS: usize = 200;

/// Directory holding per-PR review history.
pub const HISTORY_DIR: &str = ".review-context/reviews";

/// A local repository checkout.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
    diff: Option<String>,
    review_config: Option<PathBuf>,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            diff: None,
            review_config: None,
        }
    }

    /// Use `diff` as the pull request's changes.
    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = Some(diff.into());
        self
    }

    /// Read the review configuration from `path` instead of the checkout.
    pub fn with_review_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.review_config = Some(path.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a repository-relative path, rejecting escapes from the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(Error::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name) || name.starts_with('.'))
}

fn snippet(line: &str) -> String {
    line.trim().chars().take(MAX_SNIPPET_CHARS).collect()
}

#[async_trait]
impl RepositorySource for LocalWorkspace {
    async fn pull_request_files(
        &self,
        _repo: &RepositoryRef,
        _number: u64,
    ) -> Result<Vec<FileChange>> {
        let diff = self
            .diff
            .as_deref()
            .ok_or_else(|| Error::source(SOURCE_NAME, "no diff loaded"))?;
        diff_parser::parse_unified_diff(diff)
    }

    /// Reads the working tree; `git_ref` is not consulted.
    async fn file_content(
        &self,
        _repo: &RepositoryRef,
        path: &str,
        _git_ref: Option<&str>,
    ) -> Result<Option<String>> {
        let full_path = self.resolve(path)?;
        match fs::read_to_string(&full_path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn review_config(
        &self,
        repo: &RepositoryRef,
        _branch: &str,
    ) -> Result<Option<ReviewConfig>> {
        let text = match &self.review_config {
            Some(path) => Some(fs::read_to_string(path).await.map_err(|e| {
                Error::Config(format!("cannot read {}: {}", path.display(), e))
            })?),
            None => self.file_content(repo, REVIEW_CONFIG_PATH, None).await?,
        };
        match text {
            Some(text) => Ok(Some(serde_yaml::from_str(&text)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CodeSearch for LocalWorkspace {
    async fn keyword_search(
        &self,
        _repo: &RepositoryRef,
        pattern: &str,
        limit: usize,
    ) -> Result<Vec<CodeMatch>> {
        if pattern.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();

        for entry in WalkDir::new(&self.root)
            .max_depth(10)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || is_sensitive_file(&path.to_string_lossy()) {
                continue;
            }
            if entry.metadata().map_or(true, |m| m.len() as usize > MAX_FILE_SIZE) {
                continue;
            }

            let Ok(content) = fs::read_to_string(path).await else {
                continue;
            };
            let occurrences = content.matches(pattern).count();
            if occurrences == 0 {
                continue;
            }

            let relative_path = path.strip_prefix(&self.root).unwrap_or(path);
            let first_line = content
                .lines()
                .find(|line| line.contains(pattern))
                .unwrap_or_default();

            matches.push(CodeMatch {
                file_path: relative_path.to_string_lossy().replace('\\', "/"),
                content: snippet(first_line),
                score: (0.3 + 0.1 * occurrences as f64).min(1.0),
            });
        }

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        matches.truncate(limit);

        debug!(pattern = %pattern, matches = matches.len(), "Keyword search completed");
        Ok(matches)
    }
}

#[async_trait]
impl ReviewHistorySource for LocalWorkspace {
    async fn previous_reviews(
        &self,
        _repo: &RepositoryRef,
        pr_number: u64,
        limit: usize,
    ) -> Result<Vec<PastReview>> {
        let path = self.root.join(HISTORY_DIR).join(format!("{}.json", pr_number));
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reviews: Vec<PastReview> = serde_json::from_str(&content)?;
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reviews.truncate(limit);
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> RepositoryRef {
        RepositoryRef::new("acme/shop")
    }

    fn workspace_with(files: &[(&str, &str)]) -> (TempDir, LocalWorkspace) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let workspace = LocalWorkspace::new(dir.path());
        (dir, workspace)
    }

    #[tokio::test]
    async fn test_pull_request_files_from_diff() {
        let (_dir, workspace) = workspace_with(&[]);
        let workspace = workspace.with_diff(
            "diff --git a/a.rs b/a.rs\n--- a/a.rs\n+++ b/a.rs\n@@ -1 +1 @@\n-x\n+y\n",
        );
        let files = workspace.pull_request_files(&repo(), 1).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "a.rs");
    }

    #[tokio::test]
    async fn test_pull_request_files_without_diff_fails() {
        let (_dir, workspace) = workspace_with(&[]);
        let err = workspace.pull_request_files(&repo(), 1).await.unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
    }

    #[tokio::test]
    async fn test_file_content() {
        let (_dir, workspace) = workspace_with(&[("src/lib.rs", "pub fn a() {}")]);
        let content = workspace
            .file_content(&repo(), "src/lib.rs", Some("abc123"))
            .await
            .unwrap();
        assert_eq!(content.as_deref(), Some("pub fn a() {}"));

        let missing = workspace
            .file_content(&repo(), "src/missing.rs", None)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_file_content_rejects_escapes() {
        let (_dir, workspace) = workspace_with(&[]);
        for path in ["../etc/passwd", "/etc/passwd", ""] {
            let err = workspace.file_content(&repo(), path, None).await.unwrap_err();
            assert!(matches!(err, Error::InvalidPath(_)), "path {path:?}");
        }
    }

    #[tokio::test]
    async fn test_keyword_search_scores_and_skips() {
        let (_dir, workspace) = workspace_with(&[
            ("src/a.ts", "calculateTotal(1);\ncalculateTotal(2);\ncalculateTotal(3);"),
            ("src/b.ts", "const x = calculateTotal(4);"),
            ("src/c.ts", "nothing here"),
            ("node_modules/lib/index.js", "calculateTotal(5);"),
            (".git/HEAD", "calculateTotal("),
        ]);

        let matches = workspace
            .keyword_search(&repo(), "calculateTotal(", 10)
            .await
            .unwrap();
        let paths: Vec<&str> = matches.iter().map(|m| m.file_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.ts", "src/b.ts"]);
        assert!(matches[0].score > matches[1].score);
        assert_eq!(matches[1].content, "const x = calculateTotal(4);");

        let limited = workspace
            .keyword_search(&repo(), "calculateTotal(", 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_keyword_search_skips_sensitive_files() {
        let (_dir, workspace) = workspace_with(&[
            (".env.local", "BOOT=computeTotal(1)\nSTRIPE_LIVE=plain-value\n"),
            ("config/credentials.json", "{\"hook\": \"computeTotal(\"}"),
            ("src/app.ts", "computeTotal(2);"),
        ]);

        let matches = workspace
            .keyword_search(&repo(), "computeTotal(", 10)
            .await
            .unwrap();
        let paths: Vec<&str> = matches.iter().map(|m| m.file_path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.ts"]);
    }

    #[tokio::test]
    async fn test_previous_reviews_newest_first() {
        let history = r#"[
            {"run_id": 1, "created_at": "2026-01-01T00:00:00Z", "findings": []},
            {"run_id": 2, "created_at": "2026-02-01T00:00:00Z", "findings": []}
        ]"#;
        let (_dir, workspace) =
            workspace_with(&[(".review-context/reviews/42.json", history)]);

        let reviews = workspace.previous_reviews(&repo(), 42, 5).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].run_id, 2);

        assert!(workspace.previous_reviews(&repo(), 7, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_config_from_checkout_or_override() {
        let (dir, workspace) = workspace_with(&[(
            ".review-context.yaml",
            "paths:\n  ignore:\n    - docs/**\n",
        )]);
        let config = workspace.review_config(&repo(), "main").await.unwrap().unwrap();
        assert_eq!(config.paths.ignore, vec!["docs/**"]);

        let override_path = dir.path().join("custom.yaml");
        std::fs::write(&override_path, "guidelines:\n  - path: STYLE.md\n").unwrap();
        let workspace = workspace.with_review_config(&override_path);
        let config = workspace.review_config(&repo(), "main").await.unwrap().unwrap();
        assert!(config.paths.is_empty());
        assert_eq!(config.guidelines[0].path, "STYLE.md");

        let missing = LocalWorkspace::new(dir.path()).with_review_config(dir.path().join("nope.yaml"));
        assert!(matches!(
            missing.review_config(&repo(), "main").await,
            Err(Error::Config(_))
        ));
    }
}
