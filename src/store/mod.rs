//! Key-value blob store holding whole JSON records.
//!
//! No transactions and no field-level updates: callers read a record,
//! modify it and write the whole thing back. `compare_and_put` is the one
//! primitive stronger than last-write-wins.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: Some(Box::new(err)),
        }
    }

    /// Only an outage is worth retrying; bad keys and encoding bugs are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Read a record. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Overwrite a record unconditionally.
    async fn put(&self, key: &str, record: Value) -> StoreResult<()>;

    /// Remove a record, returning whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All keys starting with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Write `record` only if the stored value still equals `expected`.
    /// Returns `false` (and writes nothing) on mismatch.
    async fn compare_and_put(&self, key: &str, expected: &Value, record: Value)
        -> StoreResult<bool>;
}

/// Storage keys used by the application
pub mod keys {
    pub const TEAM_PREFIX: &str = "team:";
    pub const USER_PREFIX: &str = "user:";
    pub const ADMIN_SETTINGS: &str = "admin:settings";
    pub const GAME_CODE: &str = "admin:gameCode";

    pub fn team(username: &str) -> String {
        format!("{TEAM_PREFIX}{username}")
    }

    pub fn user(username: &str) -> String {
        format!("{USER_PREFIX}{username}")
    }

    /// Strip `prefix` from a listed key
    pub fn suffix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
        key.strip_prefix(prefix)
    }
}

/// Serialize a typed record into a store value.
pub fn to_record<T: Serialize>(value: &T) -> StoreResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Content digest of a stored record
pub fn digest(record: &Value) -> String {
    hex::encode(Sha256::digest(record.to_string().as_bytes()))
}

/// Decode a store value, reporting the key on failure.
pub fn from_record<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("record {key} is malformed: {e}"))
}
