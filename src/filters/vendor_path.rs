//! Drop vendored, generated and build-output paths from the diff.

use async_trait::async_trait;
use tracing::debug;

use crate::context::{ContextBundle, ContextFilter};
use crate::error::Result;

const VENDOR_PREFIXES: &[&str] = &[
    "vendor/",
    "node_modules/",
    ".git/",
    "storage/",
    "dist/",
    "build/",
    "public/build/",
    ".next/",
    ".nuxt/",
    "bootstrap/cache/",
];

fn is_vendored(path: &str) -> bool {
    VENDOR_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

pub struct VendorPathFilter;

#[async_trait]
impl ContextFilter for VendorPathFilter {
    fn name(&self) -> &str {
        "vendor_path"
    }

    fn order(&self) -> i32 {
        10
    }

    async fn filter(&self, bundle: &mut ContextBundle) -> Result<()> {
        let before = bundle.files.len();
        bundle.files.retain(|f| !is_vendored(&f.filename));
        bundle.recompute_metrics();

        if bundle.files.len() < before {
            debug!(
                removed = before - bundle.files.len(),
                remaining = bundle.files.len(),
                "Removed vendored files"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileChange;

    #[tokio::test]
    async fn test_removes_vendored_paths_and_recomputes_metrics() {
        let mut bundle = ContextBundle::new();
        bundle.files = vec![
            FileChange::new("src/app.php", 10, 5),
            FileChange::new("vendor/autoload.php", 100, 50),
            FileChange::new("node_modules/lodash/index.js", 1, 0),
            FileChange::new(".git/config", 1, 0),
            FileChange::new("storage/logs/app.log", 100, 0),
            FileChange::new("dist/bundle.js", 100, 0),
            FileChange::new("public/build/manifest.json", 10, 0),
            FileChange::new(".next/cache/data.json", 10, 0),
            FileChange::new("bootstrap/cache/services.php", 10, 0),
            FileChange::new("src/vendor/shim.js", 2, 0),
        ];
        bundle.recompute_metrics();

        VendorPathFilter.filter(&mut bundle).await.unwrap();

        let names: Vec<&str> = bundle.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["src/app.php", "src/vendor/shim.js"]);
        assert_eq!(bundle.metrics.files_changed, 2);
        assert_eq!(bundle.metrics.lines_added, 12);
        assert_eq!(bundle.metrics.lines_deleted, 5);
    }
}
