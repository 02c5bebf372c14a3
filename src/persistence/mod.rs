//! Key/value persistence contract
//!
//! Every record is addressed by `(topic, index)`. The engine consumes a
//! `PersistenceAdapter` and never retries or rewrites what it returns.
//!
//! - `memory.rs` - `InMemoryVault`, a complete in-process adapter
//! - `callback.rs` - bridge for callback-style backends (`Promisified`)
//! - `router.rs` - `VaultRouter`, per-topic read/write routing over named vaults

mod callback;
mod memory;
mod router;

pub use callback::{Callback, CallbackPersistence, Promisified, from_callback};
pub use memory::InMemoryVault;
pub use router::VaultRouter;

use crate::core::{AdapterResult, ArchivistError, Result, ValidationCode, ValidationError, Violation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Plain index object: field name to value.
pub type RawIndex = Map<String, Value>;

/// Absolute instant after which a record is gone.
pub type Expiration = DateTime<Utc>;

/// Interprets a plain value as an index object.
pub fn raw_index(value: Value) -> Result<RawIndex> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(RawIndex::new()),
        other => Err(ArchivistError::Validation(ValidationError::new(
            ValidationCode::InvalidIndex,
            "Index must be an object",
            vec![Violation::new("index", "isObject", "index must be an object").with_value(other)],
        ))),
    }
}

/// Stable string form of an index, independent of field insertion order.
pub fn index_key(index: &RawIndex) -> String {
    let sorted: BTreeMap<&String, &Value> = index.iter().collect();
    let ordered: Map<String, Value> = sorted
        .into_iter()
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    // `Display` for `Value` writes compact JSON and cannot fail
    Value::Object(ordered).to_string()
}

/// How the stored data is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Structured value, stored as is.
    #[default]
    Live,
    Utf8,
    Buffer,
    Base64,
}

/// One `(topic, index)` lookup of a batch read.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub topic: String,
    pub index: RawIndex,
}

impl Query {
    pub fn new(topic: impl Into<String>, index: RawIndex) -> Self {
        Self {
            topic: topic.into(),
            index,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    /// A missing record yields `None` instead of an error.
    pub optional: bool,
    /// Accepted media types; `None` accepts anything.
    pub media_types: Option<Vec<String>>,
}

impl GetOptions {
    pub fn optional() -> Self {
        Self {
            optional: true,
            media_types: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub offset: usize,
    pub limit: Option<usize>,
}

/// A value written to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: Value,
    pub media_type: String,
    pub encoding: Encoding,
    pub expiration: Option<Expiration>,
}

impl Record {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|at| at <= now)
    }
}

/// The backend every entity read and write goes through.
///
/// `mget` must return exactly one slot per query, in query order.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn get(
        &self,
        topic: &str,
        index: &RawIndex,
        options: &GetOptions,
    ) -> AdapterResult<Option<Value>>;

    async fn mget(
        &self,
        queries: &[Query],
        options: &GetOptions,
    ) -> AdapterResult<Vec<Option<Value>>>;

    /// Full indexes of the records matching a partial index.
    async fn list(
        &self,
        topic: &str,
        partial_index: &RawIndex,
        options: &ListOptions,
    ) -> AdapterResult<Vec<RawIndex>>;

    async fn add(&self, topic: &str, index: &RawIndex, record: Record) -> AdapterResult<()>;

    async fn set(&self, topic: &str, index: &RawIndex, record: Record) -> AdapterResult<()>;

    async fn touch(
        &self,
        topic: &str,
        index: &RawIndex,
        expiration: Option<Expiration>,
    ) -> AdapterResult<()>;

    async fn del(&self, topic: &str, index: &RawIndex) -> AdapterResult<()>;
}
