//! Build diagnostics.
//!
//! The engine reports every collector/filter run, skip and failure to an
//! injected [`BuildObserver`]. The default observer turns events into
//! structured `tracing` events; [`RecordingObserver`] keeps them in memory.

use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one build, reported once at the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub estimated_tokens: usize,
    pub files: usize,
    pub files_with_patches: usize,
    pub linked_issues: usize,
    pub pr_comments: usize,
    pub collectors_failed: usize,
    pub filters_failed: usize,
}

/// A pipeline diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    CollectorSkipped { collector: String },
    CollectorCompleted { collector: String, elapsed_ms: u64 },
    CollectorFailed { collector: String, error: String },
    FilterCompleted { filter: String, elapsed_ms: u64 },
    FilterFailed { filter: String, error: String },
    BuildCompleted(BuildSummary),
}

impl BuildEvent {
    /// Name of the collector or filter the event concerns.
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::CollectorSkipped { collector }
            | Self::CollectorCompleted { collector, .. }
            | Self::CollectorFailed { collector, .. } => Some(collector),
            Self::FilterCompleted { filter, .. } | Self::FilterFailed { filter, .. } => {
                Some(filter)
            }
            Self::BuildCompleted(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::CollectorFailed { .. } | Self::FilterFailed { .. }
        )
    }
}

/// Sink for pipeline diagnostics.
pub trait BuildObserver: Send + Sync {
    fn on_event(&self, event: &BuildEvent);
}

/// Emits each event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn on_event(&self, event: &BuildEvent) {
        match event {
            BuildEvent::CollectorSkipped { collector } => {
                debug!(collector = %collector, "Skipping collector");
            }
            BuildEvent::CollectorCompleted {
                collector,
                elapsed_ms,
            } => {
                debug!(collector = %collector, elapsed_ms, "Collector completed");
            }
            BuildEvent::CollectorFailed { collector, error } => {
                warn!(collector = %collector, error = %error, "Collector failed");
            }
            BuildEvent::FilterCompleted { filter, elapsed_ms } => {
                debug!(filter = %filter, elapsed_ms, "Filter completed");
            }
            BuildEvent::FilterFailed { filter, error } => {
                warn!(filter = %filter, error = %error, "Filter failed");
            }
            BuildEvent::BuildCompleted(summary) => {
                info!(
                    estimated_tokens = summary.estimated_tokens,
                    files = summary.files,
                    files_with_patches = summary.files_with_patches,
                    linked_issues_count = summary.linked_issues,
                    pr_comments_count = summary.pr_comments,
                    collectors_failed = summary.collectors_failed,
                    filters_failed = summary.filters_failed,
                    "Context built"
                );
            }
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<BuildEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events recorded so far.
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Only the failure events.
    pub fn failures(&self) -> Vec<BuildEvent> {
        self.events()
            .into_iter()
            .filter(BuildEvent::is_failure)
            .collect()
    }
}

impl BuildObserver for RecordingObserver {
    fn on_event(&self, event: &BuildEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_component() {
        let skipped = BuildEvent::CollectorSkipped {
            collector: "diff".to_string(),
        };
        assert_eq!(skipped.component(), Some("diff"));
        assert!(!skipped.is_failure());

        let failed = BuildEvent::FilterFailed {
            filter: "relevance".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(failed.component(), Some("relevance"));
        assert!(failed.is_failure());

        let done = BuildEvent::BuildCompleted(BuildSummary::default());
        assert_eq!(done.component(), None);
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        observer.on_event(&BuildEvent::CollectorSkipped {
            collector: "a".to_string(),
        });
        observer.on_event(&BuildEvent::CollectorFailed {
            collector: "b".to_string(),
            error: "down".to_string(),
        });

        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].component(), Some("a"));
        assert_eq!(observer.failures().len(), 1);
    }

    #[test]
    fn test_tracing_observer_accepts_all_events() {
        let observer = TracingObserver;
        observer.on_event(&BuildEvent::CollectorCompleted {
            collector: "diff".to_string(),
            elapsed_ms: 3,
        });
        observer.on_event(&BuildEvent::BuildCompleted(BuildSummary::default()));
    }
}
