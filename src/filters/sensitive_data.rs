//! Secret redaction across every text field of the bundle.
//!
//! Files that are sensitive by name, or tagged sensitive by path rules, lose
//! their patch and full content entirely. Everything else is run through the
//! [`SecretRedactor`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::context::{ContextBundle, ContextFilter};
use crate::error::Result;
use crate::metrics::Metrics;
use crate::redaction::{is_sensitive_file, SecretRedactor};

/// Replacement for the patch or content of a sensitive file.
pub const SENSITIVE_FILE_PLACEHOLDER: &str = "[REDACTED - sensitive file]";

pub struct SensitiveDataFilter {
    redactor: SecretRedactor,
    metrics: Option<Arc<Metrics>>,
}

impl SensitiveDataFilter {
    pub fn new() -> Self {
        Self {
            redactor: SecretRedactor::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Default for SensitiveDataFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Redacts in place and tallies replacements.
struct Scrubber<'a> {
    redactor: &'a SecretRedactor,
    count: usize,
}

impl Scrubber<'_> {
    fn text(&mut self, text: &mut String) {
        if text.is_empty() {
            return;
        }
        let (redacted, hits) = self.redactor.redact_counted(text);
        if hits > 0 {
            self.count += hits;
            *text = redacted;
        }
    }

    fn optional(&mut self, text: &mut Option<String>) {
        if let Some(text) = text.as_mut() {
            self.text(text);
        }
    }
}

#[async_trait]
impl ContextFilter for SensitiveDataFilter {
    fn name(&self) -> &str {
        "sensitive_data"
    }

    fn order(&self) -> i32 {
        30
    }

    async fn filter(&self, bundle: &mut ContextBundle) -> Result<()> {
        let tagged = bundle.sensitive_files();
        let is_sensitive = |path: &str| is_sensitive_file(path) || tagged.iter().any(|t| t == path);

        let mut scrub = Scrubber {
            redactor: &self.redactor,
            count: 0,
        };

        for file in &mut bundle.files {
            if file.is_sensitive || is_sensitive(&file.filename) {
                if file.patch.is_some() {
                    file.patch = Some(SENSITIVE_FILE_PLACEHOLDER.to_string());
                    scrub.count += 1;
                }
            } else {
                scrub.optional(&mut file.patch);
            }
        }

        if let Some(pr) = bundle.pull_request.as_mut() {
            scrub.text(&mut pr.title);
            scrub.optional(&mut pr.body);
        }

        for issue in &mut bundle.linked_issues {
            scrub.text(&mut issue.title);
            scrub.optional(&mut issue.body);
            for comment in &mut issue.comments {
                scrub.text(&mut comment.body);
            }
        }

        for comment in &mut bundle.pr_comments {
            scrub.text(&mut comment.body);
        }

        for (path, content) in bundle.file_contents.iter_mut() {
            if is_sensitive(path) {
                *content = SENSITIVE_FILE_PLACEHOLDER.to_string();
                scrub.count += 1;
            } else {
                scrub.text(content);
            }
        }

        for guideline in &mut bundle.guidelines {
            scrub.text(&mut guideline.content);
            scrub.optional(&mut guideline.description);
        }

        scrub.optional(&mut bundle.repository_docs.readme);
        scrub.optional(&mut bundle.repository_docs.contributing);

        for semantics in bundle.semantics.values_mut() {
            for function in &mut semantics.functions {
                scrub.text(&mut function.name);
            }
            for class in &mut semantics.classes {
                scrub.text(&mut class.name);
                for method in &mut class.methods {
                    scrub.text(&mut method.name);
                }
            }
            for import in &mut semantics.imports {
                scrub.text(import);
            }
        }

        let project = &mut bundle.project_context;
        if let Some(runtime) = project.runtime.as_mut() {
            scrub.text(&mut runtime.version);
        }
        for framework in &mut project.frameworks {
            scrub.text(&mut framework.version);
        }
        for dependency in &mut project.dependencies {
            scrub.text(&mut dependency.name);
            scrub.text(&mut dependency.version);
        }

        for impacted in &mut bundle.impacted_files {
            if is_sensitive(&impacted.file_path) {
                impacted.content = SENSITIVE_FILE_PLACEHOLDER.to_string();
                scrub.count += 1;
            } else {
                scrub.text(&mut impacted.content);
            }
        }

        for entry in &mut bundle.review_history {
            scrub.text(&mut entry.summary);
            for finding in &mut entry.key_findings {
                scrub.text(&mut finding.title);
            }
        }

        let redacted = scrub.count;
        if redacted > 0 {
            info!(redacted_count = redacted, "Redacted sensitive data");
            if let Some(metrics) = &self.metrics {
                metrics.add_redactions(redacted as u64);
            }
        }
        Ok(())
    }
}
