//! Drop binary assets, lock files, minified bundles and source maps.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use crate::context::{ContextBundle, ContextFilter};
use crate::error::Result;

const EXCLUDED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "ico", "svg", "bmp", "tiff", "pdf", "doc", "docx", "xls",
    "xlsx", "ppt", "pptx", "zip", "tar", "gz", "rar", "7z", "exe", "dll", "so", "dylib", "woff",
    "woff2", "ttf", "eot", "otf", "mp3", "mp4", "wav", "avi", "mov", "lock", "map",
];

const EXCLUDED_FILENAMES: &[&str] = &[
    "package-lock.json",
    "composer.lock",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "Gemfile.lock",
    "poetry.lock",
    ".DS_Store",
    "Thumbs.db",
];

fn should_exclude(path: &str) -> bool {
    let file = Path::new(path);
    if file
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| EXCLUDED_FILENAMES.contains(&name))
    {
        return true;
    }

    let lower = path.to_lowercase();
    if lower.ends_with(".min.js") || lower.ends_with(".min.css") {
        return true;
    }

    file.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| EXCLUDED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

pub struct BinaryFileFilter;

#[async_trait]
impl ContextFilter for BinaryFileFilter {
    fn name(&self) -> &str {
        "binary_file"
    }

    fn order(&self) -> i32 {
        20
    }

    async fn filter(&self, bundle: &mut ContextBundle) -> Result<()> {
        let before = bundle.files.len();
        bundle.files.retain(|f| !should_exclude(&f.filename));
        bundle.recompute_metrics();

        if bundle.files.len() < before {
            debug!(
                removed = before - bundle.files.len(),
                remaining = bundle.files.len(),
                "Removed binary and generated files"
            );
        }
        Ok(())
    }
}
