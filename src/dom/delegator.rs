//! Delegated bindings over native listeners.
//!
//! One native listener is attached per `(event type, root)` no matter how
//! many bindings share it. Selectors are evaluated when the native event
//! fires, so elements inserted after a binding was registered still match.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::bus::Diagnostics;
use crate::types::ListenerHandle;

use super::{DomCallback, DomEvent, DomHost, NativeHandler, NativeListenerId, NodeId};

struct DomBinding {
    handle: ListenerHandle,
    event_type: String,
    selector: String,
    root: NodeId,
    callback: DomCallback,
    once: bool,
}

struct NativeAttachment {
    event_type: String,
    root: NodeId,
    id: NativeListenerId,
}

/// Description of one delegated binding, for introspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomBindingInfo {
    pub handle: ListenerHandle,
    pub event_type: String,
    pub selector: String,
    pub root: NodeId,
}

struct Inner {
    host: Rc<dyn DomHost>,
    diagnostics: Rc<Diagnostics>,
    bindings: RefCell<Vec<DomBinding>>,
    natives: RefCell<Vec<NativeAttachment>>,
}

/// Maps delegated bindings onto shared native listeners.
#[derive(Clone)]
pub struct DomDelegator {
    inner: Rc<Inner>,
}

impl DomDelegator {
    pub(crate) fn new(host: Rc<dyn DomHost>, diagnostics: Rc<Diagnostics>) -> Self {
        Self {
            inner: Rc::new(Inner {
                host,
                diagnostics,
                bindings: RefCell::new(Vec::new()),
                natives: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The host's default root.
    pub fn document(&self) -> NodeId {
        self.inner.host.document()
    }

    /// Register a binding under a handle allocated by the bus. Attaches the
    /// native listener if this is the first binding for `(event_type, root)`.
    pub(crate) fn add(
        &self,
        handle: ListenerHandle,
        root: NodeId,
        event_type: &str,
        selector: &str,
        callback: DomCallback,
        once: bool,
    ) {
        self.inner.bindings.borrow_mut().push(DomBinding {
            handle,
            event_type: event_type.to_string(),
            selector: selector.to_string(),
            root,
            callback,
            once,
        });

        let attached = self
            .inner
            .natives
            .borrow()
            .iter()
            .any(|n| n.root == root && n.event_type == event_type);
        if attached {
            return;
        }

        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let handler: NativeHandler = Rc::new(move |event: &DomEvent| {
            if let Some(inner) = weak.upgrade() {
                DomDelegator { inner }.dispatch(root, event);
            }
        });
        let id = self.inner.host.add_listener(root, event_type, handler);
        tracing::debug!(event_type, root = ?root, "attached native listener");

        self.inner.natives.borrow_mut().push(NativeAttachment {
            event_type: event_type.to_string(),
            root,
            id,
        });
    }

    /// Remove the binding for `handle`. Detaches the native listener when it
    /// was the last binding for its `(event_type, root)`.
    pub(crate) fn remove(&self, handle: ListenerHandle) -> bool {
        let removed = {
            let mut bindings = self.inner.bindings.borrow_mut();
            let Some(index) = bindings.iter().position(|b| b.handle == handle) else {
                return false;
            };
            bindings.remove(index)
        };
        self.detach_if_unused(&removed.event_type, removed.root);
        true
    }

    /// Remove every binding and detach every native listener.
    pub(crate) fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.inner.bindings.borrow_mut()).len();
        let natives = std::mem::take(&mut *self.inner.natives.borrow_mut());
        for native in natives {
            self.inner.host.remove_listener(native.id);
        }
        removed
    }

    pub fn contains(&self, handle: ListenerHandle) -> bool {
        self.inner
            .bindings
            .borrow()
            .iter()
            .any(|b| b.handle == handle)
    }

    pub fn bindings(&self) -> Vec<DomBindingInfo> {
        self.inner
            .bindings
            .borrow()
            .iter()
            .map(|b| DomBindingInfo {
                handle: b.handle,
                event_type: b.event_type.clone(),
                selector: b.selector.clone(),
                root: b.root,
            })
            .collect()
    }

    /// Number of native listeners currently attached through the host.
    pub fn native_count(&self) -> usize {
        self.inner.natives.borrow().len()
    }

    fn detach_if_unused(&self, event_type: &str, root: NodeId) {
        let still_used = self
            .inner
            .bindings
            .borrow()
            .iter()
            .any(|b| b.root == root && b.event_type == event_type);
        if still_used {
            return;
        }

        let native = {
            let mut natives = self.inner.natives.borrow_mut();
            natives
                .iter()
                .position(|n| n.root == root && n.event_type == event_type)
                .map(|index| natives.remove(index))
        };
        if let Some(native) = native {
            self.inner.host.remove_listener(native.id);
            tracing::debug!(event_type, root = ?root, "detached native listener");
        }
    }

    /// Nearest node from `target` up to `root` (inclusive) matching
    /// `selector`.
    fn closest(&self, target: NodeId, root: NodeId, selector: &str) -> Option<NodeId> {
        let host = &self.inner.host;
        let mut current = Some(target);
        while let Some(node) = current {
            if host.matches(node, selector) {
                return Some(node);
            }
            if node == root {
                return None;
            }
            current = host.parent(node);
        }
        None
    }

    /// Fan a native event on `root` out to its bindings, in registration
    /// order.
    pub(crate) fn dispatch(&self, root: NodeId, event: &DomEvent) -> usize {
        let candidates: Vec<(ListenerHandle, String, DomCallback, bool)> = self
            .inner
            .bindings
            .borrow()
            .iter()
            .filter(|b| b.root == root && b.event_type == event.event_type)
            .map(|b| (b.handle, b.selector.clone(), Rc::clone(&b.callback), b.once))
            .collect();

        let mut invoked = 0;
        for (handle, selector, callback, once) in candidates {
            if !self.contains(handle) {
                continue;
            }
            let Some(matched) = self.closest(event.target, root, &selector) else {
                continue;
            };
            if once {
                self.remove(handle);
            }
            invoked += 1;
            self.inner
                .diagnostics
                .invoke(&event.event_type, handle, || callback(event, matched));
        }
        invoked
    }
}
