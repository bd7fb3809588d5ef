//! Encoding of entries written to persistent tiers.
//!
//! A persisted record is `{ "value": <payload>, "expiry": <ms> }`. The
//! `expiry` field is optional on read; a record without it never expires.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::types::Timestamp;

/// Byte format of persisted records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Json,
    MessagePack,
}

#[derive(Serialize)]
struct PersistedRef<'a, V> {
    value: &'a V,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry: Option<i64>,
}

#[derive(Deserialize)]
struct PersistedEntry<V> {
    value: V,
    #[serde(default)]
    expiry: Option<i64>,
}

/// A decoded persisted record.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded<V> {
    pub value: V,
    pub expiry: Option<Timestamp>,
}

pub fn encode<V: Serialize>(
    encoding: Encoding,
    value: &V,
    expiry: Option<Timestamp>,
) -> Result<Vec<u8>, CodecError> {
    let record = PersistedRef {
        value,
        expiry: expiry.map(|t| t.0),
    };
    match encoding {
        Encoding::Json => {
            serde_json::to_vec(&record).map_err(|e| CodecError::Serialization(e.to_string()))
        }
        Encoding::MessagePack => Ok(rmp_serde::to_vec_named(&record)?),
    }
}

pub fn decode<V: DeserializeOwned>(encoding: Encoding, bytes: &[u8]) -> Result<Decoded<V>, CodecError> {
    let record: PersistedEntry<V> = match encoding {
        Encoding::Json => serde_json::from_slice(bytes)
            .map_err(|e| CodecError::Deserialization(e.to_string()))?,
        Encoding::MessagePack => rmp_serde::from_slice(bytes)?,
    };
    Ok(Decoded {
        value: record.value,
        expiry: record.expiry.map(Timestamp),
    })
}
