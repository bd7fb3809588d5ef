//! Reference-counted acquisition of live feeds.
//!
//! Each [`ResourceKey`] moves through four phases:
//!
//! ```text
//!            acquire 0->1                 enable ok, count > 0
//!   Idle ---------------------> Enabling ----------------------> Live
//!    ^                            |   |                            |
//!    |     enable err             |   | enable ok, count == 0      | release ->0
//!    +----------------------------+   v                            v
//!    |                          Disabling <------------------------+
//!    |     disable ok, count == 0   |   |
//!    +------------------------------+   | disable ok, count > 0
//!                                       +----> Enabling
//! ```
//!
//! Counts are always updated before the matching deferred call is issued,
//! and the phase is checked synchronously so no key ever has two calls in
//! flight. A count that drops to zero while Enabling marks the enable for
//! discard: when it resolves, the feed is disabled instead of going Live.

use crate::error::{BindingError, BusError};
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawn, LocalSpawnExt};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use super::binding::ResourceBinding;
use super::name::ResourceKey;
use super::transition::Transition;

/// Phase of one resource key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourcePhase {
    /// No feed held, nothing in flight.
    Idle,
    /// Enable issued, not yet resolved.
    Enabling,
    /// Feed held.
    Live,
    /// Disable issued, not yet resolved.
    Disabling,
}

/// Snapshot of one key's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceStatus {
    pub count: usize,
    pub phase: ResourcePhase,
}

impl ResourceStatus {
    /// The in-flight enable will be followed by a disable when it resolves.
    pub fn discard_pending(&self) -> bool {
        self.phase == ResourcePhase::Enabling && self.count == 0
    }

    /// The in-flight disable will be followed by a fresh enable.
    pub fn reacquire_pending(&self) -> bool {
        self.phase == ResourcePhase::Disabling && self.count > 0
    }

    /// Whether an enable has completed with no disable completed since.
    pub fn is_live(&self) -> bool {
        matches!(self.phase, ResourcePhase::Live | ResourcePhase::Disabling)
    }
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Enable,
    Disable,
}

/// Refcount table plus the binding it drives.
pub struct ResourceLifecycle {
    binding: Rc<dyn ResourceBinding>,
    spawner: Rc<dyn LocalSpawn>,
    states: RefCell<BTreeMap<ResourceKey, ResourceStatus>>,
}

impl ResourceLifecycle {
    /// Create a lifecycle that issues binding calls onto `spawner`.
    pub fn new(binding: Rc<dyn ResourceBinding>, spawner: Rc<dyn LocalSpawn>) -> Rc<Self> {
        Rc::new(Self {
            binding,
            spawner,
            states: RefCell::new(BTreeMap::new()),
        })
    }

    /// Current bookkeeping for `key`, if any listener or call is outstanding.
    pub fn status(&self, key: &ResourceKey) -> Option<ResourceStatus> {
        self.states.borrow().get(key).copied()
    }

    /// Every tracked key.
    pub fn tracked(&self) -> Vec<(ResourceKey, ResourceStatus)> {
        self.states
            .borrow()
            .iter()
            .map(|(key, status)| (key.clone(), *status))
            .collect()
    }

    /// Count one more listener for `key`. Issues an enable on 0 -> 1 when
    /// nothing is held or in flight.
    pub fn acquire(self: &Rc<Self>, key: &ResourceKey) -> Transition {
        let issue = {
            let mut states = self.states.borrow_mut();
            let status = states.entry(key.clone()).or_insert(ResourceStatus {
                count: 0,
                phase: ResourcePhase::Idle,
            });
            status.count += 1;

            if status.count > 1 {
                false
            } else {
                match status.phase {
                    ResourcePhase::Idle => {
                        status.phase = ResourcePhase::Enabling;
                        true
                    }
                    // Enabling: the discard mark clears itself now that the
                    // count is positive again.
                    // Disabling: the disable completion will reacquire.
                    // Live: a failed disable left the feed held.
                    ResourcePhase::Enabling | ResourcePhase::Disabling | ResourcePhase::Live => {
                        false
                    }
                }
            }
        };

        if issue {
            tracing::debug!(resource = %key, "enabling live feed");
            self.issue(Op::Enable, key, true)
        } else {
            Transition::settled()
        }
    }

    /// Count `n` fewer listeners for `key`. Issues a disable when the count
    /// reaches zero on a live feed; at most one per call.
    pub fn release(self: &Rc<Self>, key: &ResourceKey, n: usize) -> Transition {
        if n == 0 {
            return Transition::settled();
        }

        let issue = {
            let mut states = self.states.borrow_mut();
            let Some(status) = states.get_mut(key) else {
                return Transition::settled();
            };
            if status.count == 0 {
                return Transition::settled();
            }

            status.count = status.count.saturating_sub(n);
            if status.count > 0 {
                false
            } else {
                match status.phase {
                    ResourcePhase::Live => {
                        status.phase = ResourcePhase::Disabling;
                        true
                    }
                    ResourcePhase::Enabling => {
                        tracing::debug!(resource = %key, "enable in flight, marked for discard");
                        false
                    }
                    ResourcePhase::Disabling => false,
                    ResourcePhase::Idle => {
                        // Enable had failed; there is nothing to release.
                        states.remove(key);
                        false
                    }
                }
            }
        };

        if issue {
            tracing::debug!(resource = %key, "disabling live feed");
            self.issue(Op::Disable, key, true)
        } else {
            Transition::settled()
        }
    }

    /// Issue the binding call for `op` and spawn its completion. The phase
    /// must already reflect the call.
    fn issue(self: &Rc<Self>, op: Op, key: &ResourceKey, report: bool) -> Transition {
        let call = self.call(op, key);

        let (sender, receiver) = if report {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let lifecycle = Rc::downgrade(self);
        let task_key = key.clone();
        let task = async move {
            let result = call.await;
            Self::complete(&lifecycle, op, &task_key, result.clone());
            if let Some(tx) = sender {
                let _ = tx.send(result);
            }
        };

        match self.spawner.spawn_local(task) {
            Ok(()) => match receiver {
                Some(rx) => Transition::pending(key.to_string(), rx),
                None => Transition::settled(),
            },
            Err(e) => {
                tracing::warn!(resource = %key, error = %e, "failed to spawn lifecycle task");
                self.settle(
                    op,
                    key,
                    Err(BindingError::new(format!("spawn failed: {e}"))),
                );
                Transition::failed(BusError::Spawn(e.to_string()))
            }
        }
    }

    fn call(&self, op: Op, key: &ResourceKey) -> LocalBoxFuture<'static, Result<(), BindingError>> {
        match (op, key) {
            (Op::Enable, ResourceKey::Collection { id }) => self.binding.enable(id),
            (Op::Disable, ResourceKey::Collection { id }) => self.binding.disable(id),
            (Op::Enable, ResourceKey::Item { id, sub_id }) => self.binding.enable_item(id, sub_id),
            (Op::Disable, ResourceKey::Item { id, sub_id }) => {
                self.binding.disable_item(id, sub_id)
            }
        }
    }

    fn complete(
        lifecycle: &Weak<Self>,
        op: Op,
        key: &ResourceKey,
        result: Result<(), BindingError>,
    ) {
        match lifecycle.upgrade() {
            Some(lifecycle) => lifecycle.settle(op, key, result),
            None => tracing::debug!(resource = %key, "lifecycle dropped before call resolved"),
        }
    }

    /// Apply the outcome of a resolved call and issue the follow-up, if any.
    fn settle(self: &Rc<Self>, op: Op, key: &ResourceKey, result: Result<(), BindingError>) {
        let follow_up = {
            let mut states = self.states.borrow_mut();
            let Some(status) = states.get_mut(key) else {
                tracing::warn!(resource = %key, "resolved call for untracked resource");
                return;
            };

            match (op, result) {
                (Op::Enable, Ok(())) => {
                    if status.count == 0 {
                        status.phase = ResourcePhase::Disabling;
                        Some(Op::Disable)
                    } else {
                        status.phase = ResourcePhase::Live;
                        tracing::debug!(resource = %key, count = status.count, "live feed enabled");
                        None
                    }
                }
                (Op::Enable, Err(e)) => {
                    // The count stays: subscribers remain registered even
                    // without a feed. The next 0 -> 1 retries.
                    tracing::warn!(resource = %key, error = %e, "enable failed");
                    status.phase = ResourcePhase::Idle;
                    if status.count == 0 {
                        states.remove(key);
                    }
                    None
                }
                (Op::Disable, Ok(())) => {
                    if status.count > 0 {
                        status.phase = ResourcePhase::Enabling;
                        Some(Op::Enable)
                    } else {
                        tracing::debug!(resource = %key, "live feed released");
                        states.remove(key);
                        None
                    }
                }
                (Op::Disable, Err(e)) => {
                    // Still held; the next 1 -> 0 retries the disable.
                    tracing::warn!(resource = %key, error = %e, "disable failed");
                    status.phase = ResourcePhase::Live;
                    None
                }
            }
        };

        if let Some(op) = follow_up {
            tracing::debug!(resource = %key, ?op, "issuing follow-up call");
            // Nobody is waiting on a follow-up; failures are logged.
            let _ = self.issue(op, key, false);
        }
    }
}
