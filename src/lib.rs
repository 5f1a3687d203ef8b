//! Review Context Engine
//!
//! Assembles the bounded, prioritized and redacted context an AI reviewer
//! consumes for one pull request.
//!
//! # Architecture
//!
//! 1. **Sources** (`sources`) - repository, history, search and analysis traits
//!    with a local-checkout implementation
//! 2. **Collectors** (`collectors`) - gather one kind of evidence each into the bundle
//! 3. **Filters** (`filters`) - narrow, redact and finally fit the bundle to a token budget
//! 4. **Engine** (`context`) - runs collectors by priority, then filters by order,
//!    isolating each step's failure
//! 5. **Tokens** (`tokens`) - heuristic, encoder-table and remote counting strategies
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use review_context::collectors::{self, CollectorSources};
//! use review_context::context::{BuildParams, ContextEngine};
//! use review_context::filters::{self, TokenLimitFilter};
//! use review_context::sources::{LineSymbolAnalyzer, LocalWorkspace};
//! use review_context::tokens::HeuristicTokenCounter;
//! use review_context::types::{PullRequestInfo, RepositoryRef};
//!
//! # async fn run(diff: String) {
//! let workspace = Arc::new(LocalWorkspace::new(".").with_diff(diff));
//! let mut engine = ContextEngine::new();
//! collectors::register_defaults(
//!     &mut engine,
//!     &CollectorSources {
//!         repository: workspace.clone(),
//!         analyzer: Arc::new(LineSymbolAnalyzer),
//!         history: Some(workspace.clone()),
//!         search: Some(workspace),
//!     },
//! );
//! filters::register_defaults(
//!     &mut engine,
//!     TokenLimitFilter::new(Arc::new(HeuristicTokenCounter::new())),
//! );
//!
//! let params = BuildParams::new(
//!     RepositoryRef::new("acme/shop"),
//!     PullRequestInfo { number: 1, ..PullRequestInfo::default() },
//! );
//! let bundle = engine.build(&params).await;
//! # }
//! ```

pub mod collectors;
pub mod config;
pub mod context;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod redaction;
pub mod sources;
pub mod tokens;
pub mod types;

pub use error::{Error, Result};

/// Crate version, sent as the HTTP user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum file size read from a local checkout (1MB)
pub const MAX_FILE_SIZE: usize = 1024 * 1024;

/// Default token budget for an assembled context
pub const DEFAULT_TOKEN_BUDGET: usize = 80_000;
