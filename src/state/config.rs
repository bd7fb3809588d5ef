//! Store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::codec::Encoding;
use crate::types::Tier;

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix of every key this store writes to a persistent tier. Keys
    /// without it are ignored by `list` and `clear`.
    pub key_prefix: String,

    /// Format of persisted records.
    pub encoding: Encoding,

    /// Tier used by `set` when the options name none.
    pub default_tier: Tier,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "switchyard:".to_string(),
            encoding: Encoding::Json,
            default_tier: Tier::Ephemeral,
        }
    }
}

/// Per-write options for [`StateStore::set`](super::StateStore::set).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Tier to write to (None = the configured default).
    pub tier: Option<Tier>,
    /// Time until the entry expires (None = never).
    pub ttl: Option<Duration>,
}

impl SetOptions {
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl From<Tier> for SetOptions {
    fn from(tier: Tier) -> Self {
        SetOptions::default().tier(tier)
    }
}

impl From<Duration> for SetOptions {
    fn from(ttl: Duration) -> Self {
        SetOptions::default().ttl(ttl)
    }
}
