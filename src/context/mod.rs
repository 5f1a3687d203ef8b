//! Context assembly pipeline.
//!
//! A [`ContextEngine`] owns registered [`Collector`]s and [`ContextFilter`]s.
//! `build()` creates an empty [`ContextBundle`], lets every applicable
//! collector fill it (highest priority first), then lets every filter narrow
//! it (lowest order first), and returns it.

pub mod bundle;
pub mod engine;
pub mod observer;
pub mod params;
pub mod pipeline;

pub use bundle::{metadata_keys, ContextBundle, TokenBreakdown};
pub use engine::ContextEngine;
pub use observer::{BuildEvent, BuildObserver, BuildSummary, RecordingObserver, TracingObserver};
pub use params::BuildParams;
pub use pipeline::{Collector, ContextFilter};
