//! The capability the bus drives to acquire and release live feeds.

use crate::error::BindingError;
use futures::future::LocalBoxFuture;

/// Acquires and releases live feeds for named resources.
///
/// Implemented by the backend client. The bus guarantees it never calls a
/// disable for a feed whose enable did not succeed, and never has two
/// enables in flight for the same key.
///
/// The returned futures are `'static`: implementations clone whatever they
/// need out of `self` before returning.
pub trait ResourceBinding {
    /// Start the collection-level feed for `id`.
    fn enable(&self, id: &str) -> LocalBoxFuture<'static, Result<(), BindingError>>;

    /// Stop the collection-level feed for `id`.
    fn disable(&self, id: &str) -> LocalBoxFuture<'static, Result<(), BindingError>>;

    /// Start the feed for the single item `sub_id` of `id`.
    fn enable_item(&self, id: &str, sub_id: &str)
        -> LocalBoxFuture<'static, Result<(), BindingError>>;

    /// Stop the feed for the single item `sub_id` of `id`.
    fn disable_item(&self, id: &str, sub_id: &str)
        -> LocalBoxFuture<'static, Result<(), BindingError>>;
}
