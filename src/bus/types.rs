//! Types exchanged with bus listeners.

use crate::dom::NodeId;
use crate::resources::{ResourceKey, Transition};
use crate::types::ListenerHandle;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::diagnostics::ErrorHook;

/// An emitted event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub payload: serde_json::Value,
}

impl Event {
    /// Decode the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Which family a subscription belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    Custom,
    Dom,
    Resource,
}

/// Introspection record for one subscription name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Event name, or the DOM event type for delegated bindings.
    pub name: String,
    pub kind: SubscriptionKind,
    pub listeners: usize,
    pub selector: Option<String>,
    pub root: Option<NodeId>,
    pub resource: Option<ResourceKey>,
}

/// Result of `on`/`once`: the handle to remove the listener with, and the
/// lifecycle work the registration triggered.
#[derive(Debug)]
pub struct Subscribed {
    pub handle: ListenerHandle,
    pub transition: Transition,
}

/// Bus tuning.
#[derive(Clone, Default)]
pub struct BusConfig {
    /// Receives every caught listener failure, in addition to the log.
    pub on_listener_error: Option<ErrorHook>,
}

impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConfig")
            .field("on_listener_error", &self.on_listener_error.is_some())
            .finish()
    }
}
