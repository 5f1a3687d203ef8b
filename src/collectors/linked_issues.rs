//! Issues referenced from the pull request description.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::pull_request_target;
use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::RepositorySource;
use crate::types::{IssueComment, LinkedIssue, RepositoryRef};

const MAX_ISSUES: usize = 5;
const MAX_COMMENTS_PER_ISSUE: usize = 10;

/// Closing keywords first, then bare references.
static ISSUE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s*#(\d+)",
        r"(?i)(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s+(\d+)",
        r"#(\d+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Issue numbers referenced in `body`, deduplicated in discovery order.
pub fn extract_issue_numbers(body: &str) -> Vec<u64> {
    let mut numbers = Vec::new();
    for pattern in ISSUE_PATTERNS.iter() {
        for caps in pattern.captures_iter(body) {
            if let Ok(number) = caps[1].parse::<u64>() {
                if number > 0 && !numbers.contains(&number) {
                    numbers.push(number);
                }
            }
        }
    }
    numbers
}

/// Fills `linked_issues`.
pub struct LinkedIssueCollector {
    source: Arc<dyn RepositorySource>,
}

impl LinkedIssueCollector {
    pub fn new(source: Arc<dyn RepositorySource>) -> Self {
        Self { source }
    }

    async fn fetch_comments(&self, repo: &RepositoryRef, number: u64) -> Vec<IssueComment> {
        match self.source.issue_comments(repo, number).await {
            Ok(comments) => comments
                .into_iter()
                .filter(|c| !c.body.is_empty())
                .take(MAX_COMMENTS_PER_ISSUE)
                .collect(),
            Err(e) => {
                debug!(issue_number = number, error = %e, "Failed to fetch issue comments");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Collector for LinkedIssueCollector {
    fn name(&self) -> &str {
        "linked_issues"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request()
            && params
                .pull_request
                .as_ref()
                .is_some_and(|pr| !pr.body_text().is_empty())
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, pr)) = pull_request_target(params) else {
            return Ok(());
        };

        let numbers = extract_issue_numbers(pr.body_text());
        if numbers.is_empty() {
            debug!("No linked issues found in PR body");
            return Ok(());
        }

        let mut issues = Vec::new();
        for &number in numbers.iter().take(MAX_ISSUES) {
            match self.source.issue(repo, number).await {
                Ok(Some(record)) if !record.is_pull_request => {
                    let comments = self.fetch_comments(repo, number).await;
                    issues.push(LinkedIssue::from_record(record, comments));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(issue_number = number, error = %e, "Failed to fetch issue");
                }
            }
        }

        info!(
            repository = %repo.full_name,
            issues_found = numbers.len(),
            issues_fetched = issues.len(),
            "Collected linked issues"
        );
        bundle.linked_issues = issues;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{sample_params, StubRepository};
    use crate::types::IssueRecord;

    fn record(number: u64, title: &str) -> IssueRecord {
        IssueRecord {
            number,
            title: title.to_string(),
            body: Some(format!("Body of {}", number)),
            state: "open".to_string(),
            labels: vec!["bug".to_string()],
            is_pull_request: false,
        }
    }

    #[test]
    fn test_extract_issue_numbers() {
        assert_eq!(
            extract_issue_numbers("Fixes #12, closes #7 and see #12 and #3"),
            vec![12, 7, 3]
        );
        assert_eq!(extract_issue_numbers("Resolved 44 in passing"), vec![44]);
        assert_eq!(extract_issue_numbers("FIXES #9"), vec![9]);
        assert!(extract_issue_numbers("no references, #0 only").is_empty());
    }

    #[test]
    fn test_closing_keywords_take_precedence() {
        assert_eq!(extract_issue_numbers("See #3. Fixes #8."), vec![8, 3]);
    }

    #[tokio::test]
    async fn test_collects_issues_with_comments() {
        let mut source = StubRepository::default();
        source.issues.insert(12, record(12, "Export is slow"));
        source.issues.insert(
            15,
            IssueRecord {
                is_pull_request: true,
                ..record(15, "Another PR")
            },
        );
        source.issue_comments.insert(
            12,
            (0..15)
                .map(|i| IssueComment {
                    author: "dev".to_string(),
                    body: if i == 0 { String::new() } else { format!("comment {}", i) },
                })
                .collect(),
        );
        let collector = LinkedIssueCollector::new(Arc::new(source));

        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();

        assert_eq!(bundle.linked_issues.len(), 1);
        let issue = &bundle.linked_issues[0];
        assert_eq!(issue.number, 12);
        assert_eq!(issue.labels, vec!["bug"]);
        assert_eq!(issue.comments.len(), MAX_COMMENTS_PER_ISSUE);
        assert_eq!(issue.comments[0].body, "comment 1");
    }

    #[tokio::test]
    async fn test_failed_issue_does_not_abort() {
        let mut source = StubRepository::default();
        source.issues.insert(12, record(12, "Kept"));
        let collector = LinkedIssueCollector::new(Arc::new(source));

        let mut params = sample_params();
        if let Some(pr) = params.pull_request.as_mut() {
            pr.body = Some("Fixes #500 and #12".to_string());
        }
        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &params).await.unwrap();

        assert_eq!(bundle.linked_issues.len(), 1);
        assert_eq!(bundle.linked_issues[0].title, "Kept");
    }

    #[test]
    fn test_requires_body() {
        let collector = LinkedIssueCollector::new(Arc::new(StubRepository::default()));
        let mut params = sample_params();
        assert!(collector.should_collect(&params));
        if let Some(pr) = params.pull_request.as_mut() {
            pr.body = Some(String::new());
        }
        assert!(!collector.should_collect(&params));
    }
}
