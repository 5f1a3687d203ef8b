//! In-memory sources for collector tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::context::BuildParams;
use crate::error::{Error, Result};
use crate::sources::{CodeMatch, CodeSearch, RepositorySource, REVIEW_CONFIG_PATH};
use crate::types::{
    FileChange, IssueComment, IssueRecord, PullRequestComment, PullRequestInfo, RepositoryRef,
};

#[derive(Default)]
pub struct StubRepository {
    pub files: Vec<FileChange>,
    /// Path to content, for any ref
    pub contents: HashMap<String, String>,
    /// Branch to review config YAML
    pub configs: HashMap<String, String>,
    pub issues: HashMap<u64, IssueRecord>,
    pub issue_comments: HashMap<u64, Vec<IssueComment>>,
    pub pr_comments: Vec<PullRequestComment>,
    /// Paths whose fetch fails
    pub failing_paths: Vec<String>,
    pub fail_files: bool,
    /// `path@ref` of every content request
    pub requests: Mutex<Vec<String>>,
}

impl StubRepository {
    pub fn with_content(mut self, path: &str, content: &str) -> Self {
        self.contents.insert(path.to_string(), content.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositorySource for StubRepository {
    async fn pull_request_files(&self, _repo: &RepositoryRef, _number: u64) -> Result<Vec<FileChange>> {
        if self.fail_files {
            return Err(Error::source("stub", "files unavailable"));
        }
        Ok(self.files.clone())
    }

    async fn file_content(
        &self,
        _repo: &RepositoryRef,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("{}@{}", path, git_ref.unwrap_or("")));

        if self.failing_paths.iter().any(|p| p == path) {
            return Err(Error::source("stub", format!("cannot read {}", path)));
        }
        if path == REVIEW_CONFIG_PATH {
            return Ok(git_ref.and_then(|branch| self.configs.get(branch).cloned()));
        }
        Ok(self.contents.get(path).cloned())
    }

    async fn issue(&self, _repo: &RepositoryRef, number: u64) -> Result<Option<IssueRecord>> {
        if number == 500 {
            return Err(Error::api(500, "Internal Server Error", "tracker down"));
        }
        Ok(self.issues.get(&number).cloned())
    }

    async fn issue_comments(&self, _repo: &RepositoryRef, number: u64) -> Result<Vec<IssueComment>> {
        Ok(self.issue_comments.get(&number).cloned().unwrap_or_default())
    }

    async fn pull_request_comments(
        &self,
        _repo: &RepositoryRef,
        _number: u64,
    ) -> Result<Vec<PullRequestComment>> {
        Ok(self.pr_comments.clone())
    }
}

/// Code search answering from a fixed pattern table.
#[derive(Default)]
pub struct StubSearch {
    pub results: HashMap<String, Vec<CodeMatch>>,
    pub indexed: bool,
    pub patterns: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn indexed() -> Self {
        Self {
            indexed: true,
            ..Self::default()
        }
    }

    pub fn with_hit(mut self, pattern: &str, file_path: &str, score: f64) -> Self {
        self.results
            .entry(pattern.to_string())
            .or_default()
            .push(CodeMatch {
                file_path: file_path.to_string(),
                content: format!("uses {}", pattern),
                score,
            });
        self
    }

    pub fn patterns(&self) -> Vec<String> {
        self.patterns.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeSearch for StubSearch {
    async fn is_indexed(&self, _repo: &RepositoryRef) -> bool {
        self.indexed
    }

    async fn keyword_search(
        &self,
        _repo: &RepositoryRef,
        pattern: &str,
        limit: usize,
    ) -> Result<Vec<CodeMatch>> {
        self.patterns.lock().unwrap().push(pattern.to_string());
        let mut hits = self.results.get(pattern).cloned().unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }
}

pub fn sample_repository() -> RepositoryRef {
    RepositoryRef {
        full_name: "acme/shop".to_string(),
        default_branch: Some("main".to_string()),
    }
}

pub fn sample_pull_request() -> PullRequestInfo {
    PullRequestInfo {
        number: 42,
        title: "Add invoice export".to_string(),
        body: Some("Fixes #12 and relates to #15".to_string()),
        base_branch: "develop".to_string(),
        head_branch: "feature/export".to_string(),
        head_sha: "abc123".to_string(),
        author: Some("octocat".to_string()),
        repository_full_name: "acme/shop".to_string(),
        ..PullRequestInfo::default()
    }
}

pub fn sample_params() -> BuildParams {
    BuildParams::new(sample_repository(), sample_pull_request())
}
