//! Pull request types.
//!
//! Metadata, file-level diff entries, discussion comments, and linked issues
//! as the collectors place them into a context bundle.

use serde::{Deserialize, Serialize};

/// Repository coordinates used to address data sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// `owner/name`
    pub full_name: String,
    /// Default branch, used as the config fallback branch
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl RepositoryRef {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            default_branch: None,
        }
    }

    /// Split into `(owner, name)`; `None` when the full name is malformed.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some((owner, name))
    }
}

/// Pull request metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default)]
    pub head_branch: String,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub repository_full_name: String,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_base_branch() -> String {
    "main".to_string()
}

impl PullRequestInfo {
    /// Body text, empty when the description was left blank.
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// Change kind of a file in the diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    #[default]
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

/// A single file in the pull request diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the repository root
    pub filename: String,
    #[serde(default)]
    pub status: ChangeStatus,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
    /// Unified diff hunks; absent for binary or oversized files
    #[serde(default)]
    pub patch: Option<String>,
    /// Set by path configuration when the file is declared sensitive
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_sensitive: bool,
}

impl FileChange {
    pub fn new(filename: impl Into<String>, additions: u64, deletions: u64) -> Self {
        Self {
            filename: filename.into(),
            status: ChangeStatus::Modified,
            additions,
            deletions,
            changes: additions + deletions,
            patch: None,
            is_sensitive: false,
        }
    }

    pub fn with_patch(mut self, patch: impl Into<String>) -> Self {
        self.patch = Some(patch.into());
        self
    }

    pub fn with_status(mut self, status: ChangeStatus) -> Self {
        self.status = status;
        self
    }
}

/// Aggregate counts derived from the file list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMetrics {
    pub files_changed: usize,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

impl ChangeMetrics {
    /// Derive metrics from a diff file list.
    pub fn from_files(files: &[FileChange]) -> Self {
        Self {
            files_changed: files.len(),
            lines_added: files.iter().map(|f| f.additions).sum(),
            lines_deleted: files.iter().map(|f| f.deletions).sum(),
        }
    }
}

/// A discussion comment on the pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestComment {
    pub author: String,
    pub body: String,
    #[serde(default)]
    pub created_at: String,
}

/// A comment on a linked issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    pub author: String,
    pub body: String,
}

/// An issue as returned by the tracker, before comment threads are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_issue_state")]
    pub state: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Trackers that model pull requests as issues set this
    #[serde(default)]
    pub is_pull_request: bool,
}

fn default_issue_state() -> String {
    "open".to_string()
}

/// A linked issue with its comment thread, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comments: Vec<IssueComment>,
}

impl LinkedIssue {
    pub fn from_record(record: IssueRecord, comments: Vec<IssueComment>) -> Self {
        Self {
            number: record.number,
            title: record.title,
            body: record.body,
            state: record.state,
            labels: record.labels,
            comments,
        }
    }
}
