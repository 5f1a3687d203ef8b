//! Core type definitions for the review context engine.
//!
//! Shared types carried by the context bundle, organized by the kind of
//! data source that produces them.

pub mod analysis;
pub mod pull_request;
pub mod repository;

// Re-export commonly used types
pub use analysis::*;
pub use pull_request::*;
pub use repository::*;
