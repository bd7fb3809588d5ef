//! Context tying the bus and the store together.
//!
//! Host capabilities (storage tiers, a DOM, a resource binding) are all
//! optional and injected through [`ContextBuilder`]. Several contexts can
//! coexist in one thread; nothing is global.

use futures::task::LocalSpawn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::rc::Rc;

use crate::bus::{BusConfig, EventBus};
use crate::dom::DomHost;
use crate::resources::ResourceBinding;
use crate::state::{StateStore, StoreConfig};
use crate::storage::StorageBackend;
use crate::types::{Clock, SystemClock, Tier};

/// A bus plus a store that notifies it.
pub struct Context<V = serde_json::Value> {
    bus: EventBus,
    store: StateStore<V>,
}

impl Context {
    /// Ephemeral store and custom events only.
    pub fn new() -> Self {
        ContextBuilder::default().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Context<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &StateStore<V> {
        &self.store
    }
}

impl<V> std::fmt::Debug for Context<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bus", &self.bus)
            .field("store", &self.store)
            .finish()
    }
}

/// Builder for [`Context`].
#[derive(Default)]
pub struct ContextBuilder {
    store_config: StoreConfig,
    bus_config: BusConfig,
    clock: Option<Rc<dyn Clock>>,
    session: Option<Rc<dyn StorageBackend>>,
    local: Option<Rc<dyn StorageBackend>>,
    resources: Option<(Rc<dyn ResourceBinding>, Rc<dyn LocalSpawn>)>,
    dom: Option<Rc<dyn DomHost>>,
}

impl ContextBuilder {
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    pub fn bus_config(mut self, config: BusConfig) -> Self {
        self.bus_config = config;
        self
    }

    /// Clock used for expiry. Defaults to the system clock.
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Backing storage for the session tier.
    pub fn session(mut self, backend: Rc<dyn StorageBackend>) -> Self {
        self.session = Some(backend);
        self
    }

    /// Backing storage for the local tier.
    pub fn local(mut self, backend: Rc<dyn StorageBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    /// Enable resource-backed subscriptions.
    pub fn resources(mut self, binding: Rc<dyn ResourceBinding>, spawner: Rc<dyn LocalSpawn>) -> Self {
        self.resources = Some((binding, spawner));
        self
    }

    pub fn dom(mut self, host: Rc<dyn DomHost>) -> Self {
        self.dom = Some(host);
        self
    }

    pub fn build<V>(self) -> Context<V>
    where
        V: Serialize + DeserializeOwned + Clone,
    {
        let mut bus = EventBus::builder().config(self.bus_config);
        if let Some((binding, spawner)) = self.resources {
            bus = bus.resources(binding, spawner);
        }
        if let Some(host) = self.dom {
            bus = bus.dom(host);
        }
        let bus = bus.build();

        let clock: Rc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Rc::new(SystemClock),
        };
        let mut store = StateStore::new(self.store_config, bus.clone()).with_clock(clock);
        if let Some(backend) = self.session {
            store = store.with_tier(Tier::Session, backend);
        }
        if let Some(backend) = self.local {
            store = store.with_tier(Tier::Local, backend);
        }

        tracing::debug!(
            session = store.tier_available(Tier::Session),
            local = store.tier_available(Tier::Local),
            dom = bus.dom().is_some(),
            "context ready"
        );
        Context { bus, store }
    }
}
