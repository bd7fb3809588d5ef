//! Event bus: listener table, dispatch and subscription bookkeeping.

use crossbeam_channel::{bounded, Receiver, TrySendError};
use futures::task::LocalSpawn;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dom::{DomCallback, DomDelegator, DomEvent, DomHost, NodeId};
use crate::error::{BusError, ListenerResult, Result};
use crate::resources::{
    ResourceBinding, ResourceKey, ResourceLifecycle, ResourceName, ResourceStatus, Transition,
};
use crate::types::ListenerHandle;

use super::diagnostics::Diagnostics;
use super::types::{BusConfig, Event, Subscribed, SubscriptionInfo, SubscriptionKind};

type Listener = Rc<dyn Fn(&Event) -> ListenerResult>;

/// One registered listener.
struct Slot {
    handle: ListenerHandle,
    callback: Listener,
    /// Removed before its first invocation.
    once: bool,
}

struct Inner {
    diagnostics: Rc<Diagnostics>,
    next_handle: Cell<u64>,
    /// Listeners by exact event name, in subscription order.
    listeners: RefCell<BTreeMap<String, Vec<Slot>>>,
    lifecycle: Option<Rc<ResourceLifecycle>>,
    dom: Option<DomDelegator>,
}

/// Central dispatcher. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<Inner>,
}

/// Wires the optional host capabilities into a bus.
#[derive(Default)]
pub struct EventBusBuilder {
    config: BusConfig,
    resources: Option<(Rc<dyn ResourceBinding>, Rc<dyn LocalSpawn>)>,
    dom: Option<Rc<dyn DomHost>>,
}

impl EventBusBuilder {
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable resource-backed subscriptions. Binding calls are spawned onto
    /// `spawner`.
    pub fn resources(
        mut self,
        binding: Rc<dyn ResourceBinding>,
        spawner: Rc<dyn LocalSpawn>,
    ) -> Self {
        self.resources = Some((binding, spawner));
        self
    }

    /// Enable delegated DOM bindings.
    pub fn dom(mut self, host: Rc<dyn DomHost>) -> Self {
        self.dom = Some(host);
        self
    }

    pub fn build(self) -> EventBus {
        let diagnostics = Rc::new(Diagnostics::new(self.config.on_listener_error));
        let lifecycle = self
            .resources
            .map(|(binding, spawner)| ResourceLifecycle::new(binding, spawner));
        let dom = self
            .dom
            .map(|host| DomDelegator::new(host, Rc::clone(&diagnostics)));

        EventBus {
            inner: Rc::new(Inner {
                diagnostics,
                next_handle: Cell::new(1),
                listeners: RefCell::new(BTreeMap::new()),
                lifecycle,
                dom,
            }),
        }
    }
}

impl EventBus {
    /// A bus with custom events only. Resource-shaped names behave as custom
    /// events until a binding is configured.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    fn next_handle(&self) -> ListenerHandle {
        let id = self.inner.next_handle.get();
        self.inner.next_handle.set(id + 1);
        ListenerHandle(id)
    }

    // --- Subscription ---

    /// Register `listener` for `name`.
    pub fn on<F>(&self, name: &str, listener: F) -> Subscribed
    where
        F: Fn(&Event) -> ListenerResult + 'static,
    {
        let handle = self.next_handle();
        self.insert(name, handle, Rc::new(listener), false)
    }

    /// Register `listener` for the next `name` event only. The handle can
    /// remove it before it fires like any other listener.
    ///
    /// When the listener removes itself on firing, nobody observes the
    /// resulting release: a failed disable of a resource-backed name is
    /// only logged.
    pub fn once<F>(&self, name: &str, listener: F) -> Subscribed
    where
        F: Fn(&Event) -> ListenerResult + 'static,
    {
        let handle = self.next_handle();
        self.insert(name, handle, Rc::new(listener), true)
    }

    /// Forward `name` events into a bounded channel.
    ///
    /// A full channel is reported as a listener failure and the event is
    /// dropped for this receiver. Once the receiver is dropped, the next
    /// event removes the subscription; a failed disable triggered by that
    /// removal is only logged.
    pub fn on_channel(&self, name: &str, capacity: usize) -> (Subscribed, Receiver<Event>) {
        let (sender, receiver) = bounded(capacity.max(1));
        let handle = self.next_handle();
        let bus: Weak<Inner> = Rc::downgrade(&self.inner);
        let owned_name = name.to_string();

        let callback: Listener = Rc::new(move |event: &Event| -> ListenerResult {
            match sender.try_send(event.clone()) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    Err(format!("channel listener on {} is full", event.name).into())
                }
                Err(TrySendError::Disconnected(_)) => {
                    if let Some(inner) = bus.upgrade() {
                        tracing::debug!(event = %owned_name, handle = %handle, "receiver dropped, unsubscribing");
                        let _ = EventBus { inner }.off(&owned_name, handle);
                    }
                    Ok(())
                }
            }
        });

        (self.insert(name, handle, callback, false), receiver)
    }

    fn insert(&self, name: &str, handle: ListenerHandle, callback: Listener, once: bool) -> Subscribed {
        self.inner
            .listeners
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(Slot {
                handle,
                callback,
                once,
            });

        let transition = self.acquire(name);
        Subscribed { handle, transition }
    }

    /// Remove the listener registered as `handle` under `name`.
    ///
    /// Returns `None` if no such listener exists. For resource-backed names
    /// the returned transition resolves when any disable it triggered does.
    pub fn off(&self, name: &str, handle: ListenerHandle) -> Option<Transition> {
        let removed = {
            let mut listeners = self.inner.listeners.borrow_mut();
            let slots = listeners.get_mut(name)?;
            let index = slots.iter().position(|s| s.handle == handle)?;
            let slot = slots.remove(index);
            if slots.is_empty() {
                listeners.remove(name);
            }
            slot
        };
        drop(removed);

        Some(self.release(name, 1))
    }

    /// Remove every listener for `name`, or every listener on the bus
    /// (delegated DOM bindings included) when `name` is `None`.
    ///
    /// Each affected resource is released once, however many of its
    /// listeners were removed.
    pub fn clear(&self, name: Option<&str>) -> Vec<Transition> {
        let removed: Vec<(String, Vec<Slot>)> = {
            let mut listeners = self.inner.listeners.borrow_mut();
            match name {
                Some(name) => listeners.remove_entry(name).into_iter().collect(),
                None => std::mem::take(&mut *listeners).into_iter().collect(),
            }
        };

        if name.is_none() {
            if let Some(dom) = &self.inner.dom {
                dom.clear();
            }
        }

        let mut released: BTreeMap<ResourceKey, usize> = BTreeMap::new();
        for (name, slots) in &removed {
            if let Some(parsed) = ResourceName::parse(name) {
                *released.entry(parsed.key()).or_default() += slots.len();
            }
        }
        drop(removed);

        let Some(lifecycle) = &self.inner.lifecycle else {
            return Vec::new();
        };
        released
            .into_iter()
            .map(|(key, count)| lifecycle.release(&key, count))
            .collect()
    }

    fn acquire(&self, name: &str) -> Transition {
        match (&self.inner.lifecycle, ResourceName::parse(name)) {
            (Some(lifecycle), Some(parsed)) => lifecycle.acquire(&parsed.key()),
            _ => Transition::settled(),
        }
    }

    fn release(&self, name: &str, count: usize) -> Transition {
        match (&self.inner.lifecycle, ResourceName::parse(name)) {
            (Some(lifecycle), Some(parsed)) => lifecycle.release(&parsed.key(), count),
            _ => Transition::settled(),
        }
    }

    // --- Dispatch ---

    /// Invoke every listener registered for exactly `name`, in subscription
    /// order. Returns how many ran.
    ///
    /// Listener failures are reported and never stop the fan-out. Listeners
    /// removed by an earlier listener in the same emit are skipped.
    pub fn emit(&self, name: &str, payload: serde_json::Value) -> usize {
        let snapshot: Vec<(ListenerHandle, Listener, bool)> =
            match self.inner.listeners.borrow().get(name) {
                Some(slots) => slots
                    .iter()
                    .map(|s| (s.handle, Rc::clone(&s.callback), s.once))
                    .collect(),
                None => Vec::new(),
            };
        if snapshot.is_empty() {
            tracing::trace!(event = name, "no listeners");
            return 0;
        }

        let event = Event {
            name: name.to_string(),
            payload,
        };

        let mut invoked = 0;
        for (handle, callback, once) in snapshot {
            if once {
                // Unsubscribe first so a re-entrant emit cannot reach it.
                if self.off(name, handle).is_none() {
                    continue;
                }
            } else if !self.is_registered(name, handle) {
                continue;
            }
            invoked += 1;
            self.inner
                .diagnostics
                .invoke(name, handle, || callback(&event));
        }
        invoked
    }

    /// Serialize `payload` and emit it. Unserializable payloads are logged
    /// and not emitted.
    pub fn emit_serialized<T: Serialize>(&self, name: &str, payload: &T) -> usize {
        match serde_json::to_value(payload) {
            Ok(value) => self.emit(name, value),
            Err(e) => {
                tracing::warn!(event = name, error = %e, "failed to serialize payload");
                0
            }
        }
    }

    fn is_registered(&self, name: &str, handle: ListenerHandle) -> bool {
        self.inner
            .listeners
            .borrow()
            .get(name)
            .is_some_and(|slots| slots.iter().any(|s| s.handle == handle))
    }

    // --- Delegated DOM events ---

    fn delegator(&self) -> Result<&DomDelegator> {
        self.inner.dom.as_ref().ok_or(BusError::NoDom)
    }

    /// The delegator, when a DOM host is configured.
    pub fn dom(&self) -> Option<&DomDelegator> {
        self.inner.dom.as_ref()
    }

    /// Delegate `event_type` events on the document to `callback` whenever
    /// the target or one of its ancestors matches `selector`.
    pub fn on_dom<F>(&self, event_type: &str, selector: &str, callback: F) -> Result<ListenerHandle>
    where
        F: Fn(&DomEvent, NodeId) -> ListenerResult + 'static,
    {
        let root = self.delegator()?.document();
        self.add_dom(root, event_type, selector, Rc::new(callback), false)
    }

    /// Like [`EventBus::on_dom`], scoped to the subtree under `root`.
    pub fn on_dom_within<F>(
        &self,
        root: NodeId,
        event_type: &str,
        selector: &str,
        callback: F,
    ) -> Result<ListenerHandle>
    where
        F: Fn(&DomEvent, NodeId) -> ListenerResult + 'static,
    {
        self.add_dom(root, event_type, selector, Rc::new(callback), false)
    }

    /// Delegated binding removed after its first match.
    pub fn once_dom<F>(&self, event_type: &str, selector: &str, callback: F) -> Result<ListenerHandle>
    where
        F: Fn(&DomEvent, NodeId) -> ListenerResult + 'static,
    {
        let root = self.delegator()?.document();
        self.add_dom(root, event_type, selector, Rc::new(callback), true)
    }

    /// Remove a delegated binding. Returns whether it existed.
    pub fn off_dom(&self, handle: ListenerHandle) -> bool {
        self.inner
            .dom
            .as_ref()
            .is_some_and(|dom| dom.remove(handle))
    }

    fn add_dom(
        &self,
        root: NodeId,
        event_type: &str,
        selector: &str,
        callback: DomCallback,
        once: bool,
    ) -> Result<ListenerHandle> {
        let dom = self.delegator()?;
        let handle = self.next_handle();
        dom.add(handle, root, event_type, selector, callback, once);
        Ok(handle)
    }

    // --- Introspection ---

    /// Every subscription, custom and resource names first (by name), then
    /// delegated bindings grouped by type, selector and root.
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(name, slots)| {
                let resource = ResourceName::parse(name).map(|parsed| parsed.key());
                SubscriptionInfo {
                    name: name.clone(),
                    kind: if resource.is_some() {
                        SubscriptionKind::Resource
                    } else {
                        SubscriptionKind::Custom
                    },
                    listeners: slots.len(),
                    selector: None,
                    root: None,
                    resource,
                }
            })
            .collect();

        if let Some(dom) = &self.inner.dom {
            for binding in dom.bindings() {
                let existing = infos.iter_mut().find(|info| {
                    info.kind == SubscriptionKind::Dom
                        && info.name == binding.event_type
                        && info.selector.as_deref() == Some(binding.selector.as_str())
                        && info.root == Some(binding.root)
                });
                match existing {
                    Some(info) => info.listeners += 1,
                    None => infos.push(SubscriptionInfo {
                        name: binding.event_type,
                        kind: SubscriptionKind::Dom,
                        listeners: 1,
                        selector: Some(binding.selector),
                        root: Some(binding.root),
                        resource: None,
                    }),
                }
            }
        }

        infos
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .listeners
            .borrow()
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Refcount bookkeeping for `key`, if resources are configured and the
    /// key is tracked.
    pub fn resource_status(&self, key: &ResourceKey) -> Option<ResourceStatus> {
        self.inner.lifecycle.as_ref()?.status(key)
    }

    /// Number of listener failures caught so far.
    pub fn failure_count(&self) -> u64 {
        self.inner.diagnostics.failures()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("names", &self.inner.listeners.borrow().len())
            .field("resources", &self.inner.lifecycle.is_some())
            .field("dom", &self.inner.dom.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<serde_json::Value>>>, impl Fn(&Event) -> ListenerResult) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |event: &Event| -> ListenerResult {
            sink.borrow_mut().push(event.payload.clone());
            Ok(())
        })
    }

    #[test]
    fn test_on_emit_off() {
        let bus = EventBus::new();
        let (seen, listener) = recorder();

        let sub = bus.on("saved", listener);
        assert_eq!(bus.emit("saved", json!(1)), 1);
        assert!(bus.off("saved", sub.handle).is_some());
        assert_eq!(bus.emit("saved", json!(2)), 0);

        assert_eq!(*seen.borrow(), vec![json!(1)]);
        assert_eq!(bus.listener_count("saved"), 0);
    }

    #[test]
    fn test_off_unknown_handle() {
        let bus = EventBus::new();
        let sub = bus.on("a", |_| Ok(()));
        assert!(bus.off("b", sub.handle).is_none());
        assert!(bus.off("a", ListenerHandle(999)).is_none());
        assert_eq!(bus.listener_count("a"), 1);
    }

    #[test]
    fn test_exact_match_only() {
        let bus = EventBus::new();
        let (seen, listener) = recorder();
        bus.on("user", listener);

        assert_eq!(bus.emit("user:created", json!(null)), 0);
        assert_eq!(bus.emit("use", json!(null)), 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_subscription_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..4 {
            let order = order.clone();
            bus.on("tick", move |_| {
                order.borrow_mut().push(i);
                Ok(())
            });
        }
        bus.emit("tick", json!(null));
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_listener_removed_mid_emit_is_skipped() {
        let bus = EventBus::new();
        let (seen, listener) = recorder();

        let victim = Rc::new(Cell::new(None));
        let target = victim.clone();
        let remover = bus.clone();
        bus.on("evt", move |_| {
            if let Some(handle) = target.get() {
                remover.off("evt", handle);
            }
            Ok(())
        });
        let sub = bus.on("evt", listener);
        victim.set(Some(sub.handle));

        assert_eq!(bus.emit("evt", json!(1)), 1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_once_survives_reentrant_emit() {
        let bus = EventBus::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let inner_bus = bus.clone();
        bus.once("evt", move |_| {
            counter.set(counter.get() + 1);
            inner_bus.emit("evt", json!("nested"));
            Ok(())
        });

        bus.emit("evt", json!("outer"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_once_removable_before_firing() {
        let bus = EventBus::new();
        let (seen, listener) = recorder();
        let sub = bus.once("evt", listener);

        assert!(bus.off("evt", sub.handle).is_some());
        assert_eq!(bus.emit("evt", json!(1)), 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_failing_listener_does_not_stop_fan_out() {
        let bus = EventBus::new();
        let (seen, listener) = recorder();
        bus.on("evt", |_| Err("nope".into()));
        bus.on("evt", |_| panic!("listener bug"));
        bus.on("evt", listener);

        assert_eq!(bus.emit("evt", json!(5)), 3);
        assert_eq!(*seen.borrow(), vec![json!(5)]);
        assert_eq!(bus.failure_count(), 2);
    }

    #[test]
    fn test_clear_one_name_and_all() {
        let bus = EventBus::new();
        bus.on("a", |_| Ok(()));
        bus.on("a", |_| Ok(()));
        bus.on("b", |_| Ok(()));

        assert!(bus.clear(Some("a")).is_empty());
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b"), 1);

        bus.clear(None);
        assert!(bus.list().is_empty());
    }

    #[test]
    fn test_list_kinds_without_binding() {
        let bus = EventBus::new();
        bus.on("resource:posts:create", |_| Ok(()));
        bus.on("saved", |_| Ok(()));

        let infos = bus.list();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].name, "resource:posts:create");
        assert_eq!(infos[0].kind, SubscriptionKind::Resource);
        assert_eq!(infos[0].resource, Some(ResourceKey::collection("posts")));
        assert_eq!(infos[1].kind, SubscriptionKind::Custom);

        // No binding configured: nothing is tracked.
        assert!(bus.resource_status(&ResourceKey::collection("posts")).is_none());
    }

    #[test]
    fn test_dom_without_host() {
        let bus = EventBus::new();
        assert_eq!(
            bus.on_dom("click", ".item", |_, _| Ok(())),
            Err(BusError::NoDom)
        );
        assert!(!bus.off_dom(ListenerHandle(1)));
    }

    #[test]
    fn test_channel_listener() {
        let bus = EventBus::new();
        let (sub, rx) = bus.on_channel("evt", 1);

        bus.emit("evt", json!(1));
        bus.emit("evt", json!(2));
        assert_eq!(rx.try_recv().unwrap().payload, json!(1));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.failure_count(), 1);

        drop(rx);
        bus.emit("evt", json!(3));
        assert_eq!(bus.listener_count("evt"), 0);
        assert!(bus.off("evt", sub.handle).is_none());
    }

    #[test]
    fn test_emit_serialized() {
        #[derive(Serialize)]
        struct Saved {
            id: u32,
        }

        let bus = EventBus::new();
        let (seen, listener) = recorder();
        bus.on("saved", listener);
        bus.emit_serialized("saved", &Saved { id: 4 });

        assert_eq!(*seen.borrow(), vec![json!({ "id": 4 })]);
    }
}
