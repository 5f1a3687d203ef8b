//! Pipeline metrics for monitoring context assembly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total builds run
    pub builds_total: AtomicU64,
    /// Collectors that ran to completion
    pub collectors_run: AtomicU64,
    /// Collectors skipped by their precondition
    pub collectors_skipped: AtomicU64,
    /// Collectors that returned an error or panicked
    pub collectors_failed: AtomicU64,
    /// Filters that ran to completion
    pub filters_run: AtomicU64,
    /// Filters that returned an error or panicked
    pub filters_failed: AtomicU64,
    /// Secrets replaced by the redactor
    pub redactions_total: AtomicU64,
    /// Precise token counts that fell back to the heuristic
    pub token_count_fallbacks: AtomicU64,
    /// Estimated tokens of the most recent bundle
    pub last_bundle_tokens: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_builds(&self) {
        self.builds_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_collectors_run(&self) {
        self.collectors_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_collectors_skipped(&self) {
        self.collectors_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_collectors_failed(&self) {
        self.collectors_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_filters_run(&self) {
        self.filters_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_filters_failed(&self) {
        self.filters_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_redactions(&self, count: u64) {
        self.redactions_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_token_count_fallbacks(&self) {
        self.token_count_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_bundle_tokens(&self, tokens: u64) {
        self.last_bundle_tokens.store(tokens, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            builds_total: self.builds_total.load(Ordering::Relaxed),
            collectors_run: self.collectors_run.load(Ordering::Relaxed),
            collectors_skipped: self.collectors_skipped.load(Ordering::Relaxed),
            collectors_failed: self.collectors_failed.load(Ordering::Relaxed),
            filters_run: self.filters_run.load(Ordering::Relaxed),
            filters_failed: self.filters_failed.load(Ordering::Relaxed),
            redactions_total: self.redactions_total.load(Ordering::Relaxed),
            token_count_fallbacks: self.token_count_fallbacks.load(Ordering::Relaxed),
            last_bundle_tokens: self.last_bundle_tokens.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP review_context_builds_total Total context builds
# TYPE review_context_builds_total counter
review_context_builds_total {}

# HELP review_context_collectors_run Collectors completed
# TYPE review_context_collectors_run counter
review_context_collectors_run {}

# HELP review_context_collectors_skipped Collectors skipped by precondition
# TYPE review_context_collectors_skipped counter
review_context_collectors_skipped {}

# HELP review_context_collectors_failed Collectors failed
# TYPE review_context_collectors_failed counter
review_context_collectors_failed {}

# HELP review_context_filters_run Filters completed
# TYPE review_context_filters_run counter
review_context_filters_run {}

# HELP review_context_filters_failed Filters failed
# TYPE review_context_filters_failed counter
review_context_filters_failed {}

# HELP review_context_redactions_total Secrets redacted
# TYPE review_context_redactions_total counter
review_context_redactions_total {}

# HELP review_context_token_count_fallbacks Precise counts answered heuristically
# TYPE review_context_token_count_fallbacks counter
review_context_token_count_fallbacks {}

# HELP review_context_last_bundle_tokens Estimated tokens of the last bundle
# TYPE review_context_last_bundle_tokens gauge
review_context_last_bundle_tokens {}
"#,
            s.builds_total,
            s.collectors_run,
            s.collectors_skipped,
            s.collectors_failed,
            s.filters_run,
            s.filters_failed,
            s.redactions_total,
            s.token_count_fallbacks,
            s.last_bundle_tokens
        )
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub builds_total: u64,
    pub collectors_run: u64,
    pub collectors_skipped: u64,
    pub collectors_failed: u64,
    pub filters_run: u64,
    pub filters_failed: u64,
    pub redactions_total: u64,
    pub token_count_fallbacks: u64,
    pub last_bundle_tokens: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = Metrics::new();
        metrics.inc_builds();
        metrics.inc_collectors_run();
        metrics.inc_collectors_run();
        metrics.inc_collectors_failed();
        metrics.add_redactions(3);
        metrics.set_last_bundle_tokens(1200);

        let s = metrics.snapshot();
        assert_eq!(s.builds_total, 1);
        assert_eq!(s.collectors_run, 2);
        assert_eq!(s.collectors_failed, 1);
        assert_eq!(s.redactions_total, 3);
        assert_eq!(s.last_bundle_tokens, 1200);
        assert_eq!(s.filters_run, 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.inc_token_count_fallbacks();

        let text = metrics.to_prometheus();
        assert!(text.contains("# TYPE review_context_builds_total counter"));
        assert!(text.contains("review_context_token_count_fallbacks 1"));
        assert!(text.contains("review_context_last_bundle_tokens 0"));
    }
}
