//! Collector and filter contracts.

use async_trait::async_trait;

use super::{BuildParams, ContextBundle};
use crate::error::Result;

/// Populates one slice of the bundle from one data source.
///
/// Collectors run one at a time in descending priority. A collector may read
/// fields written by higher-priority collectors but must cope with them being
/// absent.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Unique name; re-registering a name replaces the earlier collector.
    fn name(&self) -> &str;

    /// Higher runs earlier.
    fn priority(&self) -> i32;

    /// Cheap precondition checked before `collect`.
    fn should_collect(&self, params: &BuildParams) -> bool;

    /// Write this collector's slice into `bundle`.
    async fn collect(&self, bundle: &mut ContextBundle, params: &BuildParams) -> Result<()>;
}

/// Transforms or narrows the bundle in place.
///
/// Filters run one at a time in ascending order after every collector.
#[async_trait]
pub trait ContextFilter: Send + Sync {
    /// Unique name; re-registering a name replaces the earlier filter.
    fn name(&self) -> &str;

    /// Lower runs earlier.
    fn order(&self) -> i32;

    async fn filter(&self, bundle: &mut ContextBundle) -> Result<()>;
}
