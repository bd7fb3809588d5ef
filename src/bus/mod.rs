//! The event bus.
//!
//! One dispatcher for three families of events:
//! - custom events, any name that is not resource-backed
//! - resource-backed events (`resource:{id}:{action}[:{sub_id}]`), whose
//!   listeners hold a live feed through the resource lifecycle
//! - delegated DOM events, routed through a [`DomDelegator`](crate::dom::DomDelegator)
//!
//! Dispatch is synchronous and exact-match: `emit("a")` reaches listeners
//! registered under `"a"` and nothing else.
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::new();
//!
//! let sub = bus.on("saved", |event| {
//!     println!("saved {}", event.payload);
//!     Ok(())
//! });
//! bus.emit("saved", json!({ "id": 7 }));
//! bus.off("saved", sub.handle);
//! ```

mod diagnostics;
mod manager;
mod types;

pub(crate) use diagnostics::Diagnostics;
pub use diagnostics::{ErrorHook, ListenerFailure};
pub use manager::{EventBus, EventBusBuilder};
pub use types::{BusConfig, Event, Subscribed, SubscriptionInfo, SubscriptionKind};
