//! Tiered state with expiry and change notification.
//!
//! ```ignore
//! let store: StateStore = StateStore::new(StoreConfig::default(), bus.clone())
//!     .with_tier(Tier::Local, Rc::new(MemoryStorage::new()));
//!
//! bus.on("state:change:theme", |event| {
//!     let change: StateChange = event.payload_as()?;
//!     println!("theme is now {:?}", change.new);
//!     Ok(())
//! });
//!
//! store.set("theme", json!("dark"), Tier::Local);
//! ```

mod codec;
mod config;
mod store;

pub use codec::Encoding;
pub use config::{SetOptions, StoreConfig};
pub use store::{change_event_for, EntryInfo, StateChange, StateStore, StoredValue, CHANGE_EVENT};
