//! Tiered key/value store with lazy expiry.
//!
//! Entries live in one of three tiers. The ephemeral tier keeps values
//! unserialized; the two persistent tiers are host [`StorageBackend`]s and
//! see only encoded records under the configured key prefix.
//!
//! Expiry is evaluated on access: any read that observes `now > expiry`
//! purges the entry from the tier where it was found. [`StateStore::sweep`]
//! runs the same purge over every entry on demand. There is no timer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::codec::{self, Decoded};
use super::config::{SetOptions, StoreConfig};
use crate::bus::EventBus;
use crate::error::StorageError;
use crate::storage::StorageBackend;
use crate::types::{Clock, SystemClock, Tier, Timestamp};

/// Emitted for every change to any key.
pub const CHANGE_EVENT: &str = "state:change";

/// Name of the change event for a single key.
pub fn change_event_for(key: &str) -> String {
    format!("{CHANGE_EVENT}:{key}")
}

/// Payload of change events.
///
/// `new` is `None` when the key was removed; `tier` is the tier written to,
/// or `None` for a removal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub key: String,
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
    pub tier: Option<Tier>,
}

/// A value together with where it was found.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredValue<V> {
    pub value: V,
    pub tier: Tier,
    pub expiry: Option<Timestamp>,
}

/// One live entry as reported by [`StateStore::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    pub tier: Tier,
    pub expiry: Option<Timestamp>,
}

#[derive(Clone, Debug)]
struct Entry<V> {
    value: V,
    expiry: Option<Timestamp>,
}

/// Outcome of reading one record from a persistent tier.
enum Fetched<V> {
    Found(Decoded<V>),
    /// Nothing usable: no record, or the backend failed to answer.
    Absent,
    /// The record was unreadable and has been removed.
    Purged,
}

fn is_expired(expiry: Option<Timestamp>, now: Timestamp) -> bool {
    expiry.is_some_and(|at| now > at)
}

/// Layered key/value store.
///
/// All operations are infallible from the caller's side: a missing or
/// failing persistent tier reads as empty and drops writes.
pub struct StateStore<V = serde_json::Value> {
    config: StoreConfig,
    clock: Rc<dyn Clock>,
    bus: EventBus,
    ephemeral: RefCell<BTreeMap<String, Entry<V>>>,
    session: Option<Rc<dyn StorageBackend>>,
    local: Option<Rc<dyn StorageBackend>>,
}

impl<V> StateStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Create a store with only the ephemeral tier, notifying `bus`.
    pub fn new(config: StoreConfig, bus: EventBus) -> Self {
        Self {
            config,
            clock: Rc::new(SystemClock),
            bus,
            ephemeral: RefCell::new(BTreeMap::new()),
            session: None,
            local: None,
        }
    }

    /// Back a persistent tier with `backend`.
    pub fn with_tier(mut self, tier: Tier, backend: Rc<dyn StorageBackend>) -> Self {
        match tier {
            Tier::Ephemeral => {
                tracing::warn!("ephemeral tier cannot take a storage backend; ignored")
            }
            Tier::Session => self.session = Some(backend),
            Tier::Local => self.local = Some(backend),
        }
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The bus change events are emitted on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Whether `tier` is backed. The ephemeral tier always is.
    pub fn tier_available(&self, tier: Tier) -> bool {
        match tier {
            Tier::Ephemeral => true,
            persistent => self.backend(persistent).is_some(),
        }
    }

    // --- Reads ---

    /// Current value of `key`, searching ephemeral, then session, then local.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key).map(|stored| stored.value)
    }

    /// Like [`get`](Self::get), also reporting the tier and expiry.
    pub fn get_entry(&self, key: &str) -> Option<StoredValue<V>> {
        let now = self.clock.now();
        if let Some(found) = self.lookup_ephemeral(key, now) {
            return Some(found);
        }
        [Tier::Session, Tier::Local]
            .into_iter()
            .find_map(|tier| self.lookup_persistent(tier, key, now))
    }

    pub fn has(&self, key: &str) -> bool {
        self.get_entry(key).is_some()
    }

    /// Every live entry, grouped by tier in lookup order. Expired and
    /// undecodable entries met along the way are purged.
    pub fn list(&self) -> Vec<EntryInfo> {
        let now = self.clock.now();
        Tier::ALL
            .into_iter()
            .flat_map(|tier| self.scan(tier, now).0)
            .collect()
    }

    /// Purge every expired entry in every tier. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let purged: usize = Tier::ALL.into_iter().map(|tier| self.scan(tier, now).1).sum();
        if purged > 0 {
            tracing::debug!(purged, "swept expired entries");
        }
        purged
    }

    // --- Writes ---

    /// Store `value` under `key`.
    ///
    /// A write to a persistent tier drops any ephemeral copy of the key once
    /// the record is stored. A copy in the other persistent tier is left
    /// alone and will keep shadowing or being shadowed according to lookup
    /// order.
    ///
    /// If the target tier is missing or the write fails, the value is lost
    /// and any ephemeral copy stays visible. The change event is emitted
    /// either way.
    pub fn set(&self, key: &str, value: V, options: impl Into<SetOptions>) {
        let options = options.into();
        let tier = options.tier.unwrap_or(self.config.default_tier);
        let expiry = options.ttl.map(|ttl| self.clock.now().after(ttl));
        let old = self.get(key);

        match tier {
            Tier::Ephemeral => {
                self.ephemeral.borrow_mut().insert(
                    key.to_string(),
                    Entry {
                        value: value.clone(),
                        expiry,
                    },
                );
            }
            persistent => {
                if self.write_persistent(persistent, key, &value, expiry) {
                    self.ephemeral.borrow_mut().remove(key);
                }
            }
        }

        self.notify(key, old.as_ref(), Some(&value), Some(tier));
    }

    /// Delete `key` from every tier. Returns false, without emitting, if the
    /// key was already absent.
    pub fn remove(&self, key: &str) -> bool {
        let Some(old) = self.get(key) else {
            return false;
        };

        self.ephemeral.borrow_mut().remove(key);
        for tier in [Tier::Session, Tier::Local] {
            self.purge_persistent(tier, key);
        }

        self.notify(key, Some(&old), None, None);
        true
    }

    /// Delete every entry in every tier. Emits nothing.
    pub fn clear(&self) {
        self.ephemeral.borrow_mut().clear();
        for tier in [Tier::Session, Tier::Local] {
            for key in self.persisted_keys(tier) {
                self.purge_persistent(tier, &key);
            }
        }
        tracing::debug!("cleared store");
    }

    // --- Internals ---

    fn backend(&self, tier: Tier) -> Option<&Rc<dyn StorageBackend>> {
        match tier {
            Tier::Ephemeral => None,
            Tier::Session => self.session.as_ref(),
            Tier::Local => self.local.as_ref(),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn lookup_ephemeral(&self, key: &str, now: Timestamp) -> Option<StoredValue<V>> {
        let mut ephemeral = self.ephemeral.borrow_mut();
        let entry = ephemeral.get(key)?;
        if is_expired(entry.expiry, now) {
            ephemeral.remove(key);
            tracing::trace!(key, "purged expired ephemeral entry");
            return None;
        }
        Some(StoredValue {
            value: entry.value.clone(),
            tier: Tier::Ephemeral,
            expiry: entry.expiry,
        })
    }

    fn lookup_persistent(&self, tier: Tier, key: &str, now: Timestamp) -> Option<StoredValue<V>> {
        let Fetched::Found(decoded) = self.read_persistent(tier, key) else {
            return None;
        };
        if is_expired(decoded.expiry, now) {
            self.purge_persistent(tier, key);
            tracing::trace!(key, %tier, "purged expired entry");
            return None;
        }
        Some(StoredValue {
            value: decoded.value,
            tier,
            expiry: decoded.expiry,
        })
    }

    /// Read and decode `key` from a persistent tier.
    ///
    /// Records the backend reports as corrupt, and records the codec
    /// rejects, are purged. Other backend errors leave the record in place.
    fn read_persistent(&self, tier: Tier, key: &str) -> Fetched<V> {
        let Some(backend) = self.backend(tier) else {
            return Fetched::Absent;
        };
        let bytes = match backend.read(&self.storage_key(key)) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Fetched::Absent,
            Err(e @ (StorageError::Corruption(_) | StorageError::ChecksumMismatch { .. })) => {
                tracing::warn!(key, %tier, error = %e, "dropping corrupt entry");
                return self.purge_unreadable(tier, key);
            }
            Err(e) => {
                tracing::warn!(key, %tier, error = %e, "storage read failed");
                return Fetched::Absent;
            }
        };
        match codec::decode(self.config.encoding, &bytes) {
            Ok(decoded) => Fetched::Found(decoded),
            Err(e) => {
                tracing::warn!(key, %tier, error = %e, "dropping undecodable entry");
                self.purge_unreadable(tier, key)
            }
        }
    }

    fn purge_unreadable(&self, tier: Tier, key: &str) -> Fetched<V> {
        if self.purge_persistent(tier, key) {
            Fetched::Purged
        } else {
            Fetched::Absent
        }
    }

    /// Encode and store one record. Returns whether it was stored.
    fn write_persistent(&self, tier: Tier, key: &str, value: &V, expiry: Option<Timestamp>) -> bool {
        let Some(backend) = self.backend(tier) else {
            tracing::debug!(key, %tier, "tier unavailable, write dropped");
            return false;
        };
        let bytes = match codec::encode(self.config.encoding, value, expiry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, %tier, error = %e, "failed to encode entry");
                return false;
            }
        };
        match backend.write(&self.storage_key(key), &bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, %tier, error = %e, "storage write failed");
                false
            }
        }
    }

    fn purge_persistent(&self, tier: Tier, key: &str) -> bool {
        let Some(backend) = self.backend(tier) else {
            return false;
        };
        match backend.remove(&self.storage_key(key)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, %tier, error = %e, "storage remove failed");
                false
            }
        }
    }

    /// Keys of this store in a persistent tier, with the prefix stripped.
    fn persisted_keys(&self, tier: Tier) -> Vec<String> {
        let Some(backend) = self.backend(tier) else {
            return Vec::new();
        };
        match backend.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&self.config.key_prefix).map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::warn!(%tier, error = %e, "storage enumerate failed");
                Vec::new()
            }
        }
    }

    /// Live entries of one tier and the number purged while scanning it.
    fn scan(&self, tier: Tier, now: Timestamp) -> (Vec<EntryInfo>, usize) {
        if tier == Tier::Ephemeral {
            let mut ephemeral = self.ephemeral.borrow_mut();
            let before = ephemeral.len();
            ephemeral.retain(|_, entry| !is_expired(entry.expiry, now));
            let live = ephemeral
                .iter()
                .map(|(key, entry)| EntryInfo {
                    key: key.clone(),
                    tier,
                    expiry: entry.expiry,
                })
                .collect();
            return (live, before - ephemeral.len());
        }

        let mut live = Vec::new();
        let mut purged = 0;
        for key in self.persisted_keys(tier) {
            match self.read_persistent(tier, &key) {
                Fetched::Found(decoded) if !is_expired(decoded.expiry, now) => {
                    live.push(EntryInfo {
                        key,
                        tier,
                        expiry: decoded.expiry,
                    })
                }
                Fetched::Found(_) => {
                    if self.purge_persistent(tier, &key) {
                        purged += 1;
                    }
                }
                Fetched::Purged => purged += 1,
                Fetched::Absent => {}
            }
        }
        (live, purged)
    }

    fn notify(&self, key: &str, old: Option<&V>, new: Option<&V>, tier: Option<Tier>) {
        let change = StateChange {
            key: key.to_string(),
            old: old.and_then(|v| to_json(key, v)),
            new: new.and_then(|v| to_json(key, v)),
            tier,
        };
        let payload = match serde_json::to_value(&change) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize change event");
                return;
            }
        };
        self.bus.emit(&change_event_for(key), payload.clone());
        self.bus.emit(CHANGE_EVENT, payload);
    }
}

fn to_json<V: Serialize>(key: &str, value: &V) -> Option<serde_json::Value> {
    match serde_json::to_value(value) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(key, error = %e, "value not representable in change event");
            None
        }
    }
}

impl<V> fmt::Debug for StateStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("config", &self.config)
            .field("ephemeral", &self.ephemeral.borrow().len())
            .field("session", &self.session.is_some())
            .field("local", &self.local.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Event;
    use crate::error::ListenerResult;
    use crate::state::Encoding;
    use crate::storage::MemoryStorage;
    use crate::types::ManualClock;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Fixture {
        store: StateStore,
        clock: ManualClock,
        session: MemoryStorage,
        local: MemoryStorage,
        changes: Rc<RefCell<Vec<StateChange>>>,
    }

    fn fixture_with(config: StoreConfig) -> Fixture {
        let bus = EventBus::new();
        let clock = ManualClock::new(Timestamp(1_000));
        let session = MemoryStorage::new();
        let local = MemoryStorage::new();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        bus.on(CHANGE_EVENT, move |event: &Event| -> ListenerResult {
            sink.borrow_mut().push(event.payload_as::<StateChange>()?);
            Ok(())
        });

        let store = StateStore::new(config, bus)
            .with_clock(Rc::new(clock.clone()))
            .with_tier(Tier::Session, Rc::new(session.clone()))
            .with_tier(Tier::Local, Rc::new(local.clone()));
        Fixture {
            store,
            clock,
            session,
            local,
            changes,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StoreConfig::default())
    }

    #[test]
    fn test_set_get_ephemeral() {
        let f = fixture();
        f.store.set("user", json!({"name": "ada"}), SetOptions::default());

        assert_eq!(f.store.get("user"), Some(json!({"name": "ada"})));
        assert!(f.store.has("user"));
        assert!(f.session.is_empty());
        assert!(f.local.is_empty());
    }

    #[test]
    fn test_ttl_expires_strictly_after_deadline() {
        let f = fixture();
        f.store.set("token", json!("abc"), Duration::from_millis(100));

        f.clock.advance(Duration::from_millis(100));
        assert_eq!(f.store.get("token"), Some(json!("abc")));

        f.clock.advance(Duration::from_millis(1));
        assert_eq!(f.store.get("token"), None);
        assert!(f.store.list().is_empty());
    }

    #[test]
    fn test_expired_persistent_entry_is_purged_on_read() {
        let f = fixture();
        f.store.set(
            "k",
            json!(1),
            SetOptions::default().tier(Tier::Local).ttl(Duration::from_millis(10)),
        );
        assert!(f.local.raw("switchyard:k").is_some());

        f.clock.advance(Duration::from_millis(11));
        assert!(!f.store.has("k"));
        assert!(f.local.raw("switchyard:k").is_none());
    }

    #[test]
    fn test_lookup_order_and_fallthrough_on_expiry() {
        let f = fixture();
        f.store.set("k", json!("local"), Tier::Local);
        f.store.set(
            "k",
            json!("session"),
            SetOptions::default().tier(Tier::Session).ttl(Duration::from_millis(5)),
        );
        f.store.set("k", json!("ephemeral"), Duration::from_millis(1));

        assert_eq!(f.store.get_entry("k").map(|e| e.tier), Some(Tier::Ephemeral));

        f.clock.advance(Duration::from_millis(2));
        assert_eq!(f.store.get("k"), Some(json!("session")));

        f.clock.advance(Duration::from_millis(4));
        let entry = f.store.get_entry("k").unwrap();
        assert_eq!(entry.value, json!("local"));
        assert_eq!(entry.tier, Tier::Local);
        assert_eq!(entry.expiry, None);
        assert!(f.session.is_empty());
    }

    #[test]
    fn test_persistent_write_purges_ephemeral_copy_only() {
        let f = fixture();
        f.store.set("k", json!("mem"), SetOptions::default());
        f.store.set("k", json!("old local"), Tier::Local);
        assert_eq!(f.store.get_entry("k").unwrap().tier, Tier::Local);

        // Writing tier B leaves tier A alone, and tier A wins the lookup.
        f.store.set("k", json!("session"), Tier::Session);
        f.store.set("k", json!("new local"), Tier::Local);
        assert_eq!(f.store.get("k"), Some(json!("session")));
        assert!(f.local.raw("switchyard:k").is_some());
    }

    #[test]
    fn test_change_events_carry_old_and_new() {
        let f = fixture();
        let per_key = Rc::new(RefCell::new(0));
        let counter = per_key.clone();
        f.store.bus().on(&change_event_for("count"), move |_: &Event| -> ListenerResult {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        f.store.set("count", json!(1), SetOptions::default());
        f.store.set("count", json!(2), Tier::Session);
        f.store.set("other", json!(true), SetOptions::default());

        let changes = f.changes.borrow();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].old, None);
        assert_eq!(changes[0].new, Some(json!(1)));
        assert_eq!(changes[1].old, Some(json!(1)));
        assert_eq!(changes[1].tier, Some(Tier::Session));
        assert_eq!(changes[2].key, "other");
        assert_eq!(*per_key.borrow(), 2);
    }

    #[test]
    fn test_remove_emits_only_when_present() {
        let f = fixture();
        assert!(!f.store.remove("ghost"));
        assert!(f.changes.borrow().is_empty());

        f.store.set("k", json!("a"), Tier::Session);
        f.store.set("k", json!("b"), Tier::Local);
        assert!(f.store.remove("k"));
        assert!(f.session.is_empty());
        assert!(f.local.is_empty());

        let last = f.changes.borrow().last().cloned().unwrap();
        assert_eq!(last.old, Some(json!("a")));
        assert_eq!(last.new, None);
        assert_eq!(last.tier, None);
    }

    #[test]
    fn test_clear_is_silent_and_respects_prefix() {
        let f = fixture();
        f.store.set("a", json!(1), SetOptions::default());
        f.store.set("b", json!(2), Tier::Session);
        f.store.set("c", json!(3), Tier::Local);
        f.local.write("foreign", b"keep").unwrap();
        let emitted = f.changes.borrow().len();

        f.store.clear();
        assert!(f.store.list().is_empty());
        assert_eq!(f.changes.borrow().len(), emitted);
        assert_eq!(f.local.raw("foreign"), Some(b"keep".to_vec()));
    }

    #[test]
    fn test_list_is_grouped_by_tier() {
        let f = fixture();
        f.store.set("z", json!(1), Tier::Local);
        f.store.set("y", json!(2), Tier::Session);
        f.store.set("x", json!(3), SetOptions::default());
        f.store.set("w", json!(4), Duration::from_millis(1));
        f.clock.advance(Duration::from_millis(5));

        let tiers: Vec<(String, Tier)> = f.store.list().into_iter().map(|e| (e.key, e.tier)).collect();
        assert_eq!(
            tiers,
            vec![
                ("x".to_string(), Tier::Ephemeral),
                ("y".to_string(), Tier::Session),
                ("z".to_string(), Tier::Local),
            ]
        );
    }

    #[test]
    fn test_undecodable_entry_is_purged() {
        let f = fixture();
        f.session.write("switchyard:broken", b"{not json").unwrap();
        f.local.write("switchyard:broken", br#"{"value": "fallback"}"#).unwrap();

        assert_eq!(f.store.get("broken"), Some(json!("fallback")));
        assert!(f.session.raw("switchyard:broken").is_none());
    }

    #[test]
    fn test_sweep_counts_purged_entries() {
        let f = fixture();
        f.store.set("a", json!(1), Duration::from_millis(1));
        f.store.set("b", json!(2), SetOptions::default().tier(Tier::Session).ttl(Duration::from_millis(1)));
        f.store.set("c", json!(3), Tier::Local);
        f.local.write("switchyard:junk", b"\x00").unwrap();

        f.clock.advance(Duration::from_millis(2));
        assert_eq!(f.store.sweep(), 3);
        assert_eq!(f.store.sweep(), 0);
        assert_eq!(f.store.list().len(), 1);
    }

    #[test]
    fn test_unavailable_tier_degrades_to_absent() {
        let f = fixture();
        f.store.set("k", json!("v"), Tier::Session);
        f.session.set_available(false);

        assert_eq!(f.store.get("k"), None);
        f.store.set("k2", json!("dropped"), Tier::Session);
        assert!(f.store.list().is_empty());

        f.session.set_available(true);
        assert_eq!(f.store.get("k"), Some(json!("v")));
        assert_eq!(f.store.get("k2"), None);
    }

    #[test]
    fn test_dropped_write_keeps_ephemeral_copy() {
        let f = fixture();
        f.store.set("k", json!("memory"), SetOptions::default());
        f.session.set_available(false);

        f.store.set("k", json!("lost"), Tier::Session);
        assert_eq!(f.store.get_entry("k").unwrap().tier, Tier::Ephemeral);
        assert_eq!(f.store.get("k"), Some(json!("memory")));
        assert_eq!(f.changes.borrow().last().unwrap().new, Some(json!("lost")));

        f.session.set_available(true);
        f.store.set("k", json!("stored"), Tier::Session);
        assert_eq!(f.store.get_entry("k").unwrap().tier, Tier::Session);
    }

    #[test]
    fn test_sweep_ignores_unreadable_tier() {
        let f = fixture();
        f.store.set("k", json!(1), Tier::Local);
        f.local.set_available(false);

        assert_eq!(f.store.sweep(), 0);
        f.local.set_available(true);
        assert!(f.local.raw("switchyard:k").is_some());
    }

    #[test]
    fn test_missing_tier() {
        let store: StateStore = StateStore::new(StoreConfig::default(), EventBus::new());
        assert!(store.tier_available(Tier::Ephemeral));
        assert!(!store.tier_available(Tier::Local));

        store.set("k", json!(1), Tier::Local);
        assert_eq!(store.get("k"), None);
        store.clear();
    }

    #[test]
    fn test_default_tier_and_messagepack() {
        let f = fixture_with(StoreConfig {
            key_prefix: "app/".to_string(),
            encoding: Encoding::MessagePack,
            default_tier: Tier::Local,
        });
        f.store.set("k", json!({"n": [1, 2]}), SetOptions::default());

        assert!(f.local.raw("app/k").is_some());
        assert_eq!(f.store.get_entry("k").unwrap().tier, Tier::Local);
        assert_eq!(f.store.get("k"), Some(json!({"n": [1, 2]})));
    }

    #[test]
    fn test_typed_values() {
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        struct Prefs {
            theme: String,
            size: u8,
        }

        let local = MemoryStorage::new();
        let store: StateStore<Prefs> = StateStore::new(StoreConfig::default(), EventBus::new())
            .with_tier(Tier::Local, Rc::new(local.clone()));
        let prefs = Prefs {
            theme: "dark".to_string(),
            size: 12,
        };
        store.set("prefs", prefs.clone(), Tier::Local);
        assert_eq!(store.get("prefs"), Some(prefs));

        // A record of the wrong shape is dropped.
        local.write("switchyard:prefs", br#"{"value": 5}"#).unwrap();
        assert_eq!(store.get("prefs"), None);
        assert!(local.is_empty());
    }

    #[test]
    fn test_listener_sees_committed_value() {
        let f = fixture();
        let observed: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
        let slot = observed.clone();
        let bus = f.store.bus().clone();
        let local = f.local.clone();
        bus.on(&change_event_for("k"), move |_: &Event| -> ListenerResult {
            let raw = local.raw("switchyard:k").unwrap_or_default();
            *slot.borrow_mut() = serde_json::from_slice(&raw).ok();
            Ok(())
        });

        f.store.set("k", json!(5), Tier::Local);
        assert_eq!(*observed.borrow(), Some(json!({"value": 5})));
    }
}
