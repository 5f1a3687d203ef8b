//! Human discussion on the pull request.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::pull_request_target;
use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::RepositorySource;

const MAX_COMMENTS: usize = 20;

const BOT_PREFIXES: &[&str] = &[
    "dependabot",
    "renovate",
    "github-actions",
    "codecov",
    "sonarcloud",
];

/// Markers embedded in comments posted by the reviewer itself.
pub const REVIEW_MARKERS: &[&str] = &[
    "<!-- review-context:review -->",
    "<!-- review-context:greeting -->",
];

/// True for automation accounts.
pub fn is_bot_author(author: &str) -> bool {
    let author = author.to_lowercase();
    author.ends_with("[bot]") || BOT_PREFIXES.iter().any(|p| author.starts_with(p))
}

fn is_review_output(body: &str) -> bool {
    REVIEW_MARKERS.iter().any(|m| body.contains(m))
}

/// Fills `pr_comments`.
pub struct PullRequestCommentCollector {
    source: Arc<dyn RepositorySource>,
}

impl PullRequestCommentCollector {
    pub fn new(source: Arc<dyn RepositorySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Collector for PullRequestCommentCollector {
    fn name(&self) -> &str {
        "pr_comments"
    }

    fn priority(&self) -> i32 {
        70
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request()
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, pr)) = pull_request_target(params) else {
            return Ok(());
        };

        let all = self.source.pull_request_comments(repo, pr.number).await?;
        let total = all.len();
        let comments: Vec<_> = all
            .into_iter()
            .filter(|c| {
                !c.body.trim().is_empty() && !is_bot_author(&c.author) && !is_review_output(&c.body)
            })
            .take(MAX_COMMENTS)
            .collect();

        info!(
            pr_number = pr.number,
            total_comments = total,
            kept_comments = comments.len(),
            "Collected PR comments"
        );
        bundle.pr_comments = comments;
        Ok(())
    }
}
