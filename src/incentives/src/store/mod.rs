//! Key-value persistence for ledger records
//!
//! Records are bincode-encoded under string-prefixed keys:
//!
//! | key                     | value            |
//! |-------------------------|------------------|
//! | `identity/<account>`    | `Identity`       |
//! | `node/<account>`        | `RelayNode`      |
//! | `reputation/<account>`  | `ReputationRecord` |
//! | `active/<seq:016x>`     | `AccountId`      |
//! | `message/<id>`          | `RelayedMessage` |
//! | `meta/globals`          | `GlobalState`    |
//! | `meta/assets`           | `AssetSnapshot`, for in-process asset ledgers |
//! | `meta/schema_version`   | `u32`            |
//!
//! Backends only have to provide reads, prefix scans and an atomic batch
//! apply; every mutation of the ledger reaches the backend as one batch.

pub mod memory;
pub mod migration;
pub mod sled_backend;

pub use memory::MemoryBackend;
pub use migration::{migrate, CURRENT_SCHEMA_VERSION};
pub use sled_backend::SledBackend;

use relaynet_core::{AccountId, MessageId};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// One write of an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Storage backend abstraction
pub trait KvBackend: Send {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply every operation or none of them
    fn apply(&mut self, batch: Vec<BatchOp>) -> Result<()>;

    fn flush(&self) -> Result<()>;
}

/// Key construction
pub mod keys {
    use super::*;

    pub const IDENTITY_PREFIX: &str = "identity/";
    pub const NODE_PREFIX: &str = "node/";
    pub const REPUTATION_PREFIX: &str = "reputation/";
    pub const ACTIVE_PREFIX: &str = "active/";
    pub const MESSAGE_PREFIX: &str = "message/";
    pub const GLOBALS: &[u8] = b"meta/globals";
    pub const ASSETS: &[u8] = b"meta/assets";
    pub const SCHEMA_VERSION: &[u8] = b"meta/schema_version";

    pub fn identity(account: &AccountId) -> Vec<u8> {
        format!("{}{}", IDENTITY_PREFIX, account.to_hex()).into_bytes()
    }

    pub fn node(account: &AccountId) -> Vec<u8> {
        format!("{}{}", NODE_PREFIX, account.to_hex()).into_bytes()
    }

    pub fn reputation(account: &AccountId) -> Vec<u8> {
        format!("{}{}", REPUTATION_PREFIX, account.to_hex()).into_bytes()
    }

    /// Zero-padded hex keeps scan order equal to registration order
    pub fn active(seq: u64) -> Vec<u8> {
        format!("{}{:016x}", ACTIVE_PREFIX, seq).into_bytes()
    }

    pub fn message(id: &MessageId) -> Vec<u8> {
        format!("{}{}", MESSAGE_PREFIX, id.to_hex()).into_bytes()
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}
