//! Built-in filters.
//!
//! | name | order |
//! |---|---|
//! | `vendor_path` | 10 |
//! | `configured_path` | 15 |
//! | `binary_file` | 20 |
//! | `sensitive_data` | 30 |
//! | `relevance` | 40 |
//! | `token_limit` | 100 |
//!
//! Path-based exclusion runs first, then content-class exclusion, then secret
//! redaction, then relevance pruning. Budget enforcement is always last.

mod binary_file;
mod configured_path;
mod relevance;
mod sensitive_data;
mod token_limit;
mod vendor_path;

pub use binary_file::BinaryFileFilter;
pub use configured_path::{matches_any, ConfiguredPathFilter};
pub use relevance::RelevanceFilter;
pub use sensitive_data::{SensitiveDataFilter, SENSITIVE_FILE_PLACEHOLDER};
pub use token_limit::{TokenLimitFilter, MIN_CONTEXT_TOKENS};
pub use vendor_path::VendorPathFilter;

use crate::context::ContextEngine;

/// Register every built-in filter, ending with `token_limit`.
///
/// The redaction filter reports into the engine's metrics.
pub fn register_defaults(engine: &mut ContextEngine, token_limit: TokenLimitFilter) {
    let metrics = engine.metrics().clone();

    engine.register_filter(VendorPathFilter);
    engine.register_filter(ConfiguredPathFilter);
    engine.register_filter(BinaryFileFilter);
    engine.register_filter(SensitiveDataFilter::new().with_metrics(metrics));
    engine.register_filter(RelevanceFilter);
    engine.register_filter(token_limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextBundle, ContextFilter};
    use crate::tokens::HeuristicTokenCounter;
    use crate::types::FileChange;
    use std::sync::Arc;

    #[test]
    fn test_register_defaults_orders_filters() {
        let mut engine = ContextEngine::new();
        register_defaults(
            &mut engine,
            TokenLimitFilter::new(Arc::new(HeuristicTokenCounter::new())),
        );
        assert_eq!(
            engine.filter_names(),
            vec![
                "vendor_path",
                "configured_path",
                "binary_file",
                "sensitive_data",
                "relevance",
                "token_limit",
            ]
        );
    }

    #[tokio::test]
    async fn test_ranked_source_file_keeps_its_patch_under_budget() {
        let filler = "+x\n".repeat(1300);
        let mut bundle = ContextBundle::new();
        bundle.files = (0..30)
            .map(|i| FileChange::new(format!("docs/note_{}.md", i), 1300, 0).with_patch(&filler))
            .collect();
        bundle.files.push(
            FileChange::new("src/core.rs", 1300, 0).with_patch(&format!("+fn core() {{}}\n{}", filler)),
        );

        RelevanceFilter.filter(&mut bundle).await.unwrap();
        TokenLimitFilter::new(Arc::new(HeuristicTokenCounter::new()))
            .with_max_tokens(MIN_CONTEXT_TOKENS)
            .filter(&mut bundle)
            .await
            .unwrap();

        assert_eq!(bundle.files[0].filename, "src/core.rs");
        assert!(bundle.files[0].patch.as_deref().unwrap().starts_with("+fn core()"));
        assert_eq!(bundle.files.len(), 31);
    }
}
