//! # Switchyard
//!
//! A single-threaded coordination layer for UI hosts: a tiered key/value
//! store with expiry, and an event bus that multiplexes custom events,
//! delegated DOM events and resource-backed live subscriptions.
//!
//! ## Core Concepts
//!
//! - **State**: ephemeral, session and local tiers with lazy TTL expiry
//! - **Bus**: exact-name dispatch with listener error isolation
//! - **Resources**: `resource:{id}:{action}[:{subId}]` names refcount a
//!   backend feed, enabled on the first subscriber and disabled after the last
//! - **DOM**: one native listener per event type and root, selectors matched
//!   at dispatch time
//!
//! ## Example
//!
//! ```ignore
//! use switchyard::{Context, MemoryStorage, Tier};
//!
//! let ctx: Context = Context::builder()
//!     .local(Rc::new(MemoryStorage::new()))
//!     .resources(Rc::new(my_binding), Rc::new(pool.spawner()))
//!     .build();
//!
//! ctx.bus().on("state:change:cart", |event| {
//!     println!("cart changed: {}", event.payload);
//!     Ok(())
//! });
//! ctx.store().set("cart", json!([1, 2]), Tier::Local);
//!
//! // First subscriber enables the feed for collection "orders".
//! let sub = ctx.bus().on("resource:orders:update", |event| Ok(()));
//! pool.run_until_stalled();
//! ```

pub mod bus;
pub mod context;
pub mod dom;
pub mod error;
pub mod resources;
pub mod state;
pub mod storage;
pub mod types;

// Re-exports
pub use bus::{BusConfig, Event, EventBus, ListenerFailure, Subscribed, SubscriptionKind};
pub use context::{Context, ContextBuilder};
pub use dom::{DomEvent, DomHost, MemoryDom, NodeId};
pub use error::{BindingError, BusError, ListenerResult, Result};
pub use resources::{ResourceBinding, ResourceKey, Transition};
pub use state::{SetOptions, StateChange, StateStore, StoreConfig};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use types::{Clock, ListenerHandle, ManualClock, SystemClock, Tier, Timestamp};
