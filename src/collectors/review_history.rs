//! Summaries of earlier reviews of the same pull request.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::pull_request_target;
use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::ReviewHistorySource;
use crate::types::{PastReview, ReviewHistoryEntry};

const MAX_REVIEWS: usize = 3;
const MAX_KEY_FINDINGS: usize = 5;
const SEVERITY_ORDER: &[&str] = &["critical", "high", "medium", "low", "info"];

/// One-line summary of a review's findings, most severe first.
pub fn summarize_findings(breakdown: &BTreeMap<String, usize>, total: usize) -> String {
    if total == 0 {
        return "No findings in previous review.".to_string();
    }

    let parts: Vec<String> = SEVERITY_ORDER
        .iter()
        .filter_map(|severity| {
            breakdown
                .get(*severity)
                .filter(|count| **count > 0)
                .map(|count| format!("{} {}", count, severity))
        })
        .collect();

    if parts.is_empty() {
        format!("Previous review found {} finding(s).", total)
    } else {
        format!("Previous review found: {}.", parts.join(", "))
    }
}

fn history_entry(review: PastReview) -> ReviewHistoryEntry {
    let mut severity_breakdown = BTreeMap::new();
    for finding in &review.findings {
        *severity_breakdown
            .entry(finding.severity.to_lowercase())
            .or_insert(0) += 1;
    }
    let findings_count = review.findings.len();

    ReviewHistoryEntry {
        run_id: review.run_id,
        summary: summarize_findings(&severity_breakdown, findings_count),
        findings_count,
        severity_breakdown,
        key_findings: review.findings.into_iter().take(MAX_KEY_FINDINGS).collect(),
        created_at: review.created_at,
    }
}

/// Fills `review_history`.
pub struct ReviewHistoryCollector {
    history: Arc<dyn ReviewHistorySource>,
}

impl ReviewHistoryCollector {
    pub fn new(history: Arc<dyn ReviewHistorySource>) -> Self {
        Self { history }
    }
}

#[async_trait]
impl Collector for ReviewHistoryCollector {
    fn name(&self) -> &str {
        "review_history"
    }

    fn priority(&self) -> i32 {
        60
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.pr_number().is_some()
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, pr)) = pull_request_target(params) else {
            return Ok(());
        };

        let reviews = self
            .history
            .previous_reviews(repo, pr.number, MAX_REVIEWS)
            .await?;
        if reviews.is_empty() {
            debug!(pr_number = pr.number, "No previous reviews found for PR");
            return Ok(());
        }

        bundle.review_history = reviews
            .into_iter()
            .take(MAX_REVIEWS)
            .map(history_entry)
            .collect();

        info!(
            repository = %repo.full_name,
            pr_number = pr.number,
            previous_reviews = bundle.review_history.len(),
            "Collected review history"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::sample_params;
    use crate::types::{KeyFinding, RepositoryRef};
    use chrono::{TimeZone, Utc};

    struct FixedHistory(Vec<PastReview>);

    #[async_trait]
    impl ReviewHistorySource for FixedHistory {
        async fn previous_reviews(
            &self,
            _repo: &RepositoryRef,
            _pr_number: u64,
            limit: usize,
        ) -> Result<Vec<PastReview>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    fn finding(severity: &str, title: &str) -> KeyFinding {
        KeyFinding {
            severity: severity.to_string(),
            category: "correctness".to_string(),
            title: title.to_string(),
            file_path: Some("src/lib.rs".to_string()),
            line_start: Some(10),
        }
    }

    fn review(run_id: u64, findings: Vec<KeyFinding>) -> PastReview {
        PastReview {
            run_id,
            created_at: Utc.with_ymd_and_hms(2024, 5, run_id as u32, 12, 0, 0).unwrap(),
            findings,
        }
    }

    #[test]
    fn test_summarize_findings() {
        let breakdown: BTreeMap<String, usize> =
            [("high".to_string(), 1), ("critical".to_string(), 2)].into();
        assert_eq!(
            summarize_findings(&breakdown, 3),
            "Previous review found: 2 critical, 1 high."
        );
        assert_eq!(
            summarize_findings(&BTreeMap::new(), 0),
            "No findings in previous review."
        );
        let unknown: BTreeMap<String, usize> = [("style".to_string(), 4)].into();
        assert_eq!(
            summarize_findings(&unknown, 4),
            "Previous review found 4 finding(s)."
        );
    }

    #[tokio::test]
    async fn test_collects_recent_reviews() {
        let findings: Vec<KeyFinding> = (0..7)
            .map(|i| finding(if i < 2 { "Critical" } else { "low" }, &format!("issue {}", i)))
            .collect();
        let history = FixedHistory(vec![
            review(4, findings),
            review(3, vec![]),
            review(2, vec![finding("medium", "old")]),
            review(1, vec![finding("medium", "oldest")]),
        ]);
        let collector = ReviewHistoryCollector::new(Arc::new(history));

        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();

        assert_eq!(bundle.review_history.len(), MAX_REVIEWS);
        let latest = &bundle.review_history[0];
        assert_eq!(latest.run_id, 4);
        assert_eq!(latest.findings_count, 7);
        assert_eq!(latest.key_findings.len(), MAX_KEY_FINDINGS);
        assert_eq!(latest.severity_breakdown["critical"], 2);
        assert_eq!(latest.summary, "Previous review found: 2 critical, 5 low.");
        assert_eq!(bundle.review_history[1].summary, "No findings in previous review.");
    }

    #[tokio::test]
    async fn test_empty_history_leaves_bundle_untouched() {
        let collector = ReviewHistoryCollector::new(Arc::new(FixedHistory(vec![])));
        let mut bundle = ContextBundle::new();
        collector.collect(&mut bundle, &sample_params()).await.unwrap();
        assert!(bundle.review_history.is_empty());
        assert!(!collector.should_collect(&BuildParams::default()));
    }
}
