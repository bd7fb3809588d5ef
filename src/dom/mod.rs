//! Delegated DOM events.
//!
//! The host document is reached through the [`DomHost`] capability so the
//! delegation logic runs the same against a browser document or the
//! in-memory [`MemoryDom`].

mod delegator;
mod memory;
mod selector;

pub use delegator::{DomBindingInfo, DomDelegator};
pub use memory::MemoryDom;
pub use selector::{ElementView, SelectorError, SelectorList};

use crate::error::ListenerResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Identifier of a node in the host document.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Identifier of a native listener attached through the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeListenerId(pub u64);

/// A native event as seen by delegated callbacks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomEvent {
    pub event_type: String,
    /// The node the event was dispatched on.
    pub target: NodeId,
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// Callback the host invokes for a native listener.
pub type NativeHandler = Rc<dyn Fn(&DomEvent)>;

/// Delegated callback: the event and the nearest ancestor of the target that
/// matched the binding's selector.
pub type DomCallback = Rc<dyn Fn(&DomEvent, NodeId) -> ListenerResult>;

/// The document capability the delegator needs.
pub trait DomHost {
    /// Default root for delegated bindings.
    fn document(&self) -> NodeId;

    /// Attach one native listener for `event_type` on `target`.
    fn add_listener(
        &self,
        target: NodeId,
        event_type: &str,
        handler: NativeHandler,
    ) -> NativeListenerId;

    /// Detach a listener returned by [`DomHost::add_listener`].
    fn remove_listener(&self, id: NativeListenerId);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Whether `node` matches `selector` right now. Invalid selectors match
    /// nothing.
    fn matches(&self, node: NodeId, selector: &str) -> bool;
}
