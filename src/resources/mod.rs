//! Resource-backed subscriptions.
//!
//! Event names of the form `resource:{id}:{action}` or
//! `resource:{id}:{action}:{sub_id}` are tied to a live feed held by an
//! external [`ResourceBinding`]. The bus counts listeners per
//! [`ResourceKey`] and acquires the feed on the first listener and releases
//! it after the last one, through [`ResourceLifecycle`].

mod binding;
mod lifecycle;
mod name;
mod transition;

pub use binding::ResourceBinding;
pub use lifecycle::{ResourceLifecycle, ResourcePhase, ResourceStatus};
pub use name::{ResourceKey, ResourceName, RESOURCE_PREFIX};
pub use transition::Transition;
