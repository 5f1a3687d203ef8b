//! The two-phase context assembly engine.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::{
    BuildEvent, BuildObserver, BuildParams, BuildSummary, Collector, ContextBundle,
    ContextFilter, TracingObserver,
};
use crate::error::Error;
use crate::metrics::{Metrics, Timer};
use crate::tokens::{HeuristicTokenCounter, TokenCounter, TokenCounterContext};

/// Runs registered collectors, then registered filters, over a fresh bundle.
///
/// A collector or filter that errors or panics is reported to the observer
/// and skipped; `build` itself never fails. The engine is built once and
/// reused; each `build` allocates its own bundle.
pub struct ContextEngine {
    collectors: Vec<Arc<dyn Collector>>,
    filters: Vec<Arc<dyn ContextFilter>>,
    observer: Arc<dyn BuildObserver>,
    token_counter: Arc<dyn TokenCounter>,
    metrics: Arc<Metrics>,
}

impl Default for ContextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextEngine {
    /// Engine with no registrations, logging through `tracing`.
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
            filters: Vec::new(),
            observer: Arc::new(TracingObserver),
            token_counter: Arc::new(HeuristicTokenCounter),
            metrics: Metrics::new(),
        }
    }

    /// Report diagnostics to `observer` instead of `tracing`.
    pub fn with_observer(mut self, observer: Arc<dyn BuildObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Strategy used for the token estimate in the build summary.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = counter;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Register a collector, replacing any collector with the same name.
    pub fn register_collector<C: Collector + 'static>(&mut self, collector: C) {
        self.register_collector_arc(Arc::new(collector));
    }

    /// Register a shared collector, replacing any collector with the same name.
    pub fn register_collector_arc(&mut self, collector: Arc<dyn Collector>) {
        match self
            .collectors
            .iter()
            .position(|c| c.name() == collector.name())
        {
            Some(index) => self.collectors[index] = collector,
            None => self.collectors.push(collector),
        }
    }

    /// Register a filter, replacing any filter with the same name.
    pub fn register_filter<F: ContextFilter + 'static>(&mut self, filter: F) {
        self.register_filter_arc(Arc::new(filter));
    }

    /// Register a shared filter, replacing any filter with the same name.
    pub fn register_filter_arc(&mut self, filter: Arc<dyn ContextFilter>) {
        match self.filters.iter().position(|f| f.name() == filter.name()) {
            Some(index) => self.filters[index] = filter,
            None => self.filters.push(filter),
        }
    }

    /// Collectors in execution order: priority descending, then registration order.
    fn ordered_collectors(&self) -> Vec<Arc<dyn Collector>> {
        let mut collectors = self.collectors.clone();
        collectors.sort_by_key(|c| std::cmp::Reverse(c.priority()));
        collectors
    }

    /// Filters in execution order: order ascending, then registration order.
    fn ordered_filters(&self) -> Vec<Arc<dyn ContextFilter>> {
        let mut filters = self.filters.clone();
        filters.sort_by_key(|f| f.order());
        filters
    }

    /// Collector names in execution order.
    pub fn collector_names(&self) -> Vec<String> {
        self.ordered_collectors()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Filter names in execution order.
    pub fn filter_names(&self) -> Vec<String> {
        self.ordered_filters()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Assemble the context for one review.
    pub async fn build(&self, params: &BuildParams) -> ContextBundle {
        self.metrics.inc_builds();
        let mut bundle = ContextBundle::new();
        let mut collectors_failed = 0;
        let mut filters_failed = 0;

        for collector in self.ordered_collectors() {
            let name = collector.name().to_string();

            if !collector.should_collect(params) {
                self.metrics.inc_collectors_skipped();
                self.observer
                    .on_event(&BuildEvent::CollectorSkipped { collector: name });
                continue;
            }

            let timer = Timer::start();
            let outcome = AssertUnwindSafe(collector.collect(&mut bundle, params))
                .catch_unwind()
                .await;

            match flatten_outcome(outcome) {
                Ok(()) => {
                    self.metrics.inc_collectors_run();
                    self.observer.on_event(&BuildEvent::CollectorCompleted {
                        collector: name,
                        elapsed_ms: timer.elapsed_ms(),
                    });
                }
                Err(error) => {
                    collectors_failed += 1;
                    self.metrics.inc_collectors_failed();
                    self.observer.on_event(&BuildEvent::CollectorFailed {
                        collector: name,
                        error,
                    });
                }
            }
        }

        for filter in self.ordered_filters() {
            let name = filter.name().to_string();
            let timer = Timer::start();
            let outcome = AssertUnwindSafe(filter.filter(&mut bundle))
                .catch_unwind()
                .await;

            match flatten_outcome(outcome) {
                Ok(()) => {
                    self.metrics.inc_filters_run();
                    self.observer.on_event(&BuildEvent::FilterCompleted {
                        filter: name,
                        elapsed_ms: timer.elapsed_ms(),
                    });
                }
                Err(error) => {
                    filters_failed += 1;
                    self.metrics.inc_filters_failed();
                    self.observer
                        .on_event(&BuildEvent::FilterFailed { filter: name, error });
                }
            }
        }

        let context = TokenCounterContext::from_metadata(&bundle.metadata);
        let estimated_tokens = bundle
            .estimate_tokens(self.token_counter.as_ref(), &context)
            .await;
        self.metrics.set_last_bundle_tokens(estimated_tokens as u64);

        self.observer
            .on_event(&BuildEvent::BuildCompleted(BuildSummary {
                estimated_tokens,
                files: bundle.files.len(),
                files_with_patches: bundle.files_with_patch_count(),
                linked_issues: bundle.linked_issues.len(),
                pr_comments: bundle.pr_comments.len(),
                collectors_failed,
                filters_failed,
            }));

        bundle
    }
}

/// Collapse a caught step into `Ok` or a failure description.
fn flatten_outcome(
    outcome: std::result::Result<crate::error::Result<()>, Box<dyn Any + Send>>,
) -> std::result::Result<(), String> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(Error::Internal(format!("panicked: {}", panic_message(&*panic))).to_string()),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
