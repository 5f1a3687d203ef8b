//! Data sources consumed by collectors.
//!
//! Collectors receive these as trait objects at construction. Every call may
//! fail; the engine contains the failure to the collector that made it.

pub mod diff_parser;
pub mod local;
pub mod symbols;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{
    FileChange, FileSemantics, IssueComment, IssueRecord, PastReview, PullRequestComment,
    RepositoryRef, ReviewConfig,
};

pub use local::LocalWorkspace;
pub use symbols::LineSymbolAnalyzer;

/// Repository-relative path of the review configuration file.
pub const REVIEW_CONFIG_PATH: &str = ".review-context.yaml";

/// Source-control provider access.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Files changed by a pull request, in provider order.
    async fn pull_request_files(&self, repo: &RepositoryRef, number: u64)
        -> Result<Vec<FileChange>>;

    /// File text at `git_ref` (working tree when `None`); `Ok(None)` when absent.
    async fn file_content(
        &self,
        repo: &RepositoryRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<String>>;

    /// Review configuration as committed on `branch`.
    async fn review_config(
        &self,
        repo: &RepositoryRef,
        branch: &str,
    ) -> Result<Option<ReviewConfig>> {
        match self.file_content(repo, REVIEW_CONFIG_PATH, Some(branch)).await? {
            Some(text) => Ok(Some(serde_yaml::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// An issue by number; `Ok(None)` when it does not exist.
    async fn issue(&self, _repo: &RepositoryRef, _number: u64) -> Result<Option<IssueRecord>> {
        Ok(None)
    }

    /// Comments on an issue in chronological order.
    async fn issue_comments(&self, _repo: &RepositoryRef, _number: u64) -> Result<Vec<IssueComment>> {
        Ok(Vec::new())
    }

    /// Discussion comments on a pull request in chronological order.
    async fn pull_request_comments(
        &self,
        _repo: &RepositoryRef,
        _number: u64,
    ) -> Result<Vec<PullRequestComment>> {
        Ok(Vec::new())
    }
}

/// Earlier completed reviews.
#[async_trait]
pub trait ReviewHistorySource: Send + Sync {
    /// Up to `limit` earlier reviews of the same pull request, newest first.
    async fn previous_reviews(
        &self,
        repo: &RepositoryRef,
        pr_number: u64,
        limit: usize,
    ) -> Result<Vec<PastReview>>;
}

/// Per-file structural analysis.
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    /// Analyze one file; `Ok(None)` when the language is unsupported.
    async fn analyze(&self, path: &str, content: &str) -> Result<Option<FileSemantics>>;
}

/// A keyword search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeMatch {
    pub file_path: String,
    /// Matching excerpt
    pub content: String,
    /// Relevance in `0.0..=1.0`
    pub score: f64,
}

/// Keyword search over an indexed repository.
#[async_trait]
pub trait CodeSearch: Send + Sync {
    /// False when the repository has no index to search.
    async fn is_indexed(&self, _repo: &RepositoryRef) -> bool {
        true
    }

    async fn keyword_search(
        &self,
        repo: &RepositoryRef,
        pattern: &str,
        limit: usize,
    ) -> Result<Vec<CodeMatch>>;
}
