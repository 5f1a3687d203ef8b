//! The per-review context container.
//!
//! A [`ContextBundle`] is created empty by the engine, filled by collectors,
//! narrowed by filters, and handed to the caller. It holds data only; whoever
//! writes a field is responsible for its validity.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::tokens::{TokenCounter, TokenCounterContext};
use crate::types::{
    ChangeMetrics, FileChange, FileSemantics, Guideline, ImpactedFile, LinkedIssue, PathsConfig,
    ProjectContext, PullRequestComment, PullRequestInfo, RepositoryDocs, ReviewConfig,
    ReviewHistoryEntry,
};

/// Well-known metadata keys.
pub mod metadata_keys {
    /// Parsed [`ReviewConfig`](crate::types::ReviewConfig)
    pub const REVIEW_CONFIG: &str = "review_config";
    /// [`PathsConfig`](crate::types::PathsConfig) from the review config
    pub const PATHS_CONFIG: &str = "paths_config";
    /// Branch the review config was read from
    pub const CONFIG_FROM_BRANCH: &str = "config_from_branch";
    /// Paths tagged sensitive by path configuration
    pub const SENSITIVE_FILES: &str = "sensitive_files";
    /// Token budget override for the budget filter
    pub const CONTEXT_TOKEN_BUDGET: &str = "context_token_budget";
    /// Number of patches the budget filter dropped to reach its floor
    pub const PATCHES_OMITTED: &str = "patches_omitted";
    pub use crate::tokens::{
        MODEL_METADATA_KEY as TOKEN_COUNTER_MODEL, PROVIDER_METADATA_KEY as TOKEN_COUNTER_PROVIDER,
    };
}

/// Everything gathered for one review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub pull_request: Option<PullRequestInfo>,
    /// Diff entries in source order
    pub files: Vec<FileChange>,
    pub metrics: ChangeMetrics,
    pub linked_issues: Vec<LinkedIssue>,
    /// Discussion comments in chronological order
    pub pr_comments: Vec<PullRequestComment>,
    pub repository_docs: RepositoryDocs,
    pub review_history: Vec<ReviewHistoryEntry>,
    pub guidelines: Vec<Guideline>,
    /// Full file contents keyed by path
    pub file_contents: IndexMap<String, String>,
    /// Semantic analysis keyed by path
    pub semantics: IndexMap<String, FileSemantics>,
    pub project_context: ProjectContext,
    pub impacted_files: Vec<ImpactedFile>,
    pub metadata: HashMap<String, Value>,
}

/// Estimated tokens per bundle section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenBreakdown {
    pub pull_request: usize,
    pub files: usize,
    pub metrics: usize,
    pub linked_issues: usize,
    pub pr_comments: usize,
    pub repository_docs: usize,
    pub review_history: usize,
    pub guidelines: usize,
    pub file_contents: usize,
    pub semantics: usize,
    pub project_context: usize,
    pub impacted_files: usize,
}

impl TokenBreakdown {
    pub fn total(&self) -> usize {
        self.pull_request
            + self.files
            + self.metrics
            + self.linked_issues
            + self.pr_comments
            + self.repository_docs
            + self.review_history
            + self.guidelines
            + self.file_contents
            + self.semantics
            + self.project_context
            + self.impacted_files
    }
}

/// Count `text`, skipping the strategy for empty input.
pub(crate) async fn count_text(
    counter: &dyn TokenCounter,
    context: &TokenCounterContext,
    text: &str,
) -> usize {
    if text.is_empty() {
        0
    } else {
        counter.count_text_tokens(text, context).await
    }
}

fn push_line(section: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !section.is_empty() {
        section.push('\n');
    }
    section.push_str(text);
}

fn json_text<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

impl ContextBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no collector contributed anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Number of diff entries that carry patch text.
    pub fn files_with_patch_count(&self) -> usize {
        self.files.iter().filter(|f| f.patch.is_some()).count()
    }

    /// Re-derive aggregate metrics from the diff list.
    pub fn recompute_metrics(&mut self) {
        self.metrics = ChangeMetrics::from_files(&self.files);
    }

    /// Diff entry for `filename`.
    pub fn file(&self, filename: &str) -> Option<&FileChange> {
        self.files.iter().find(|f| f.filename == filename)
    }

    /// Estimated total tokens, summed over sections.
    ///
    /// Metadata is never counted. Calling this does not change the bundle.
    pub async fn estimate_tokens(
        &self,
        counter: &dyn TokenCounter,
        context: &TokenCounterContext,
    ) -> usize {
        self.token_breakdown(counter, context).await.total()
    }

    /// Estimated tokens for each section.
    pub async fn token_breakdown(
        &self,
        counter: &dyn TokenCounter,
        context: &TokenCounterContext,
    ) -> TokenBreakdown {
        let [pull_request, files, metrics, linked_issues, pr_comments, repository_docs, review_history, guidelines, file_contents, semantics, project_context, impacted_files] =
            self.section_texts();

        TokenBreakdown {
            pull_request: count_text(counter, context, &pull_request).await,
            files: count_text(counter, context, &files).await,
            metrics: count_text(counter, context, &metrics).await,
            linked_issues: count_text(counter, context, &linked_issues).await,
            pr_comments: count_text(counter, context, &pr_comments).await,
            repository_docs: count_text(counter, context, &repository_docs).await,
            review_history: count_text(counter, context, &review_history).await,
            guidelines: count_text(counter, context, &guidelines).await,
            file_contents: count_text(counter, context, &file_contents).await,
            semantics: count_text(counter, context, &semantics).await,
            project_context: count_text(counter, context, &project_context).await,
            impacted_files: count_text(counter, context, &impacted_files).await,
        }
    }

    /// Text of each section in [`TokenBreakdown`] field order.
    fn section_texts(&self) -> [String; 12] {
        let pull_request = self.pull_request.as_ref().map(json_text).unwrap_or_default();

        let mut files = String::new();
        for file in &self.files {
            push_line(&mut files, &file.filename);
            push_line(&mut files, file.patch.as_deref().unwrap_or(""));
        }

        let metrics = if self.metrics.files_changed > 0 {
            json_text(&self.metrics)
        } else {
            String::new()
        };

        let mut issues = String::new();
        for issue in &self.linked_issues {
            push_line(&mut issues, &issue.title);
            push_line(&mut issues, issue.body.as_deref().unwrap_or(""));
            for comment in &issue.comments {
                push_line(&mut issues, &comment.body);
            }
        }

        let mut comments = String::new();
        for comment in &self.pr_comments {
            push_line(&mut comments, &comment.body);
        }

        let mut docs = String::new();
        push_line(&mut docs, self.repository_docs.readme.as_deref().unwrap_or(""));
        push_line(
            &mut docs,
            self.repository_docs.contributing.as_deref().unwrap_or(""),
        );

        let mut history = String::new();
        for entry in &self.review_history {
            push_line(&mut history, &entry.summary);
            if !entry.key_findings.is_empty() {
                push_line(&mut history, &json_text(&entry.key_findings));
            }
        }

        let mut guidelines = String::new();
        for guideline in &self.guidelines {
            push_line(&mut guidelines, guideline.description.as_deref().unwrap_or(""));
            push_line(&mut guidelines, &guideline.content);
        }

        let mut contents = String::new();
        for (path, content) in &self.file_contents {
            push_line(&mut contents, path);
            push_line(&mut contents, content);
        }

        let mut semantics = String::new();
        for data in self.semantics.values() {
            push_line(&mut semantics, &json_text(data));
        }

        let project = if self.project_context.is_empty() {
            String::new()
        } else {
            json_text(&self.project_context)
        };

        let mut impacted = String::new();
        for file in &self.impacted_files {
            push_line(&mut impacted, &file.file_path);
            push_line(&mut impacted, &file.reason);
            push_line(&mut impacted, &file.content);
        }

        [
            pull_request,
            files,
            metrics,
            issues,
            comments,
            docs,
            history,
            guidelines,
            contents,
            semantics,
            project,
            impacted,
        ]
    }

    /// Full structural export for downstream serialization.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    // ===== Metadata =====

    /// Store a serializable value under `key`.
    pub fn set_metadata<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.metadata
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Typed read of a metadata value; `None` when absent or of another shape.
    pub fn metadata_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.metadata
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(|v| v.as_u64())
    }

    pub fn review_config(&self) -> Option<ReviewConfig> {
        self.metadata_as(metadata_keys::REVIEW_CONFIG)
    }

    pub fn paths_config(&self) -> Option<PathsConfig> {
        self.metadata_as(metadata_keys::PATHS_CONFIG)
    }

    pub fn sensitive_files(&self) -> Vec<String> {
        self.metadata_as(metadata_keys::SENSITIVE_FILES)
            .unwrap_or_default()
    }
}
