//! Full contents of the most-changed files at the head commit.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::pull_request_target;
use crate::context::{BuildParams, Collector, ContextBundle};
use crate::error::Result;
use crate::sources::RepositorySource;
use crate::types::{ChangeStatus, FileChange};

const MAX_FILES: usize = 10;
const MAX_FILE_CHARS: usize = 50_000;

const ALLOWED_EXTENSIONS: &[&str] = &[
    "php", "js", "ts", "jsx", "tsx", "vue", "svelte", "py", "rb", "go", "rs", "java", "kt",
    "scala", "cs", "cpp", "c", "h", "hpp", "swift", "dart", "ex", "exs", "yaml", "yml", "json",
    "xml", "toml", "sql", "graphql", "gql", "sh", "bash", "zsh", "md", "mdx", "txt",
];

fn has_allowed_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Up to ten non-removed files with a known extension, most changes first.
fn select_files(files: &[FileChange]) -> Vec<&FileChange> {
    let mut candidates: Vec<&FileChange> = files
        .iter()
        .filter(|f| f.status != ChangeStatus::Removed && has_allowed_extension(&f.filename))
        .collect();
    candidates.sort_by(|a, b| b.changes.cmp(&a.changes));
    candidates.truncate(MAX_FILES);
    candidates
}

/// Fills `file_contents`.
pub struct FileContextCollector {
    source: Arc<dyn RepositorySource>,
}

impl FileContextCollector {
    pub fn new(source: Arc<dyn RepositorySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Collector for FileContextCollector {
    fn name(&self) -> &str {
        "file_context"
    }

    fn priority(&self) -> i32 {
        85
    }

    fn should_collect(&self, params: &BuildParams) -> bool {
        params.has_pull_request() && params.head_sha().is_some()
    }

    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()> {
        let Some((repo, _)) = pull_request_target(params) else {
            return Ok(());
        };
        let Some(head_sha) = params.head_sha() else {
            debug!("No head SHA available");
            return Ok(());
        };

        let selected = select_files(&bundle.files);
        if selected.is_empty() {
            debug!(total_files = bundle.files.len(), "No suitable files to fetch");
            return Ok(());
        }

        let mut contents = IndexMap::new();
        for file in &selected {
            match self
                .source
                .file_content(repo, &file.filename, Some(head_sha))
                .await
            {
                Ok(Some(content)) if content.chars().count() <= MAX_FILE_CHARS => {
                    contents.insert(file.filename.clone(), content);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(file = %file.filename, error = %e, "Failed to fetch file");
                }
            }
        }

        info!(
            files_fetched = contents.len(),
            files_requested = selected.len(),
            "Collected file contents"
        );
        bundle.file_contents = contents;
        Ok(())
    }
}
