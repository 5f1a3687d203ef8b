//! Built-in collectors.
//!
//! | name | priority |
//! |---|---|
//! | `diff` | 100 |
//! | `file_context` | 85 |
//! | `semantic` | 80 |
//! | `linked_issues` | 80 |
//! | `impact_analysis` | 75 |
//! | `pr_comments` | 70 |
//! | `review_history` | 60 |
//! | `project_context` | 55 |
//! | `repository_context` | 50 |
//! | `guidelines` | 45 |

mod diff;
mod file_context;
mod guidelines;
mod impact_analysis;
mod linked_issues;
mod pr_comments;
mod project_context;
mod repository_context;
mod review_history;
mod semantic;

#[cfg(test)]
pub(crate) mod testing;

pub use diff::DiffCollector;
pub use file_context::FileContextCollector;
pub use guidelines::GuidelinesCollector;
pub use impact_analysis::{ImpactAnalysisCollector, ImpactAnalysisSettings};
pub use linked_issues::{extract_issue_numbers, LinkedIssueCollector};
pub use pr_comments::{is_bot_author, PullRequestCommentCollector, REVIEW_MARKERS};
pub use project_context::ProjectContextCollector;
pub use repository_context::RepositoryContextCollector;
pub use review_history::{summarize_findings, ReviewHistoryCollector};
pub use semantic::SemanticCollector;

use std::sync::Arc;

use crate::context::{BuildParams, ContextEngine};
use crate::sources::{CodeSearch, RepositorySource, ReviewHistorySource, SemanticAnalyzer};
use crate::types::{PullRequestInfo, RepositoryRef};

/// Data sources shared by the built-in collectors.
#[derive(Clone)]
pub struct CollectorSources {
    pub repository: Arc<dyn RepositorySource>,
    pub analyzer: Arc<dyn SemanticAnalyzer>,
    /// Without a history source `review_history` is not registered
    pub history: Option<Arc<dyn ReviewHistorySource>>,
    /// Without a code search `impact_analysis` is not registered
    pub search: Option<Arc<dyn CodeSearch>>,
}

/// Register every built-in collector the sources allow.
pub fn register_defaults(engine: &mut ContextEngine, sources: &CollectorSources) {
    let repository = &sources.repository;

    engine.register_collector(DiffCollector::new(repository.clone()));
    engine.register_collector(FileContextCollector::new(repository.clone()));
    engine.register_collector(SemanticCollector::new(sources.analyzer.clone()));
    engine.register_collector(LinkedIssueCollector::new(repository.clone()));
    if let Some(search) = &sources.search {
        engine.register_collector(ImpactAnalysisCollector::new(
            search.clone(),
            repository.clone(),
        ));
    }
    engine.register_collector(PullRequestCommentCollector::new(repository.clone()));
    if let Some(history) = &sources.history {
        engine.register_collector(ReviewHistoryCollector::new(history.clone()));
    }
    engine.register_collector(ProjectContextCollector::new(repository.clone()));
    engine.register_collector(RepositoryContextCollector::new(repository.clone()));
    engine.register_collector(GuidelinesCollector::new(repository.clone()));
}

/// Repository and pull request, when the params identify a numbered PR.
pub(crate) fn pull_request_target(params: &BuildParams) -> Option<(&RepositoryRef, &PullRequestInfo)> {
    let repository = params.repository.as_ref()?;
    let pull_request = params.pull_request.as_ref().filter(|pr| pr.number > 0)?;
    Some((repository, pull_request))
}

/// First `max_chars` characters of `content`.
pub(crate) fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

/// Cut `content` to at most `max_chars` characters, preferring a paragraph
/// break in the last fifth or a line break in the last tenth.
pub(crate) fn truncate_at_boundary(content: &str, max_chars: usize) -> &str {
    let truncated = truncate_chars(content, max_chars);
    if truncated.len() == content.len() {
        return content;
    }

    let char_pos = |byte_idx: usize| truncated[..byte_idx].chars().count();
    if let Some(idx) = truncated.rfind("\n\n") {
        if char_pos(idx) * 10 > max_chars * 8 {
            return &truncated[..idx];
        }
    }
    if let Some(idx) = truncated.rfind('\n') {
        if char_pos(idx) * 10 > max_chars * 9 {
            return &truncated[..idx];
        }
    }
    truncated
}
