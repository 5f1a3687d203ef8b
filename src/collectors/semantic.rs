//! Structural analysis of the fetched file contents.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::SemanticAnalyzer;

const MAX_FILES: usize = 15;
const MAX_FILE_CHARS: usize = 100_000;

/// Fills `semantics` from `file_contents`.
pub struct SemanticCollector {
    analyzer: Arc<dyn SemanticAnalyzer>,
}

impl SemanticCollector {
    pub fn new(analyzer: Arc<dyn SemanticAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Collector for SemanticCollector {
    fn name(&self) -> &str {
        "semantic"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request()
    }

    async fn collect(&self, bundle: &mut ContextBundle, _params: &BuildParams) -> Result<()> {
        if bundle.file_contents.is_empty() {
            debug!("No file contents available");
            return Ok(());
        }

        let candidates: Vec<(&String, &String)> = bundle
            .file_contents
            .iter()
            .filter(|(_, content)| content.chars().count() <= MAX_FILE_CHARS)
            .take(MAX_FILES)
            .collect();

        let mut semantics = IndexMap::new();
        for (path, content) in &candidates {
            match self.analyzer.analyze(path, content).await {
                Ok(Some(analysis)) => {
                    semantics.insert((*path).clone(), analysis);
                }
                Ok(None) => {}
                Err(e) => debug!(file = %path, error = %e, "Semantic analysis failed"),
            }
        }

        info!(
            files_analyzed = semantics.len(),
            files_requested = candidates.len(),
            "Analyzed files"
        );
        bundle.semantics = semantics;
        Ok(())
    }
}
