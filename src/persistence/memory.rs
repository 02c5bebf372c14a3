use super::{
    Expiration, GetOptions, ListOptions, PersistenceAdapter, Query, RawIndex, Record, index_key,
};
use crate::core::{AdapterError, AdapterResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, event};

#[derive(Debug, Clone)]
struct StoredRecord {
    index: RawIndex,
    record: Record,
}

type TopicRecords = BTreeMap<String, StoredRecord>;

/// In-process vault.
///
/// Records live in a map per topic keyed by the canonical index. Expired
/// records are treated as absent and purged when encountered. Cloning the
/// vault shares the underlying storage.
#[derive(Clone, Default)]
pub struct InMemoryVault {
    name: String,
    topics: Arc<Mutex<HashMap<String, TopicRecords>>>,
}

impl InMemoryVault {
    /// Creates a new, empty vault.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topics: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live records in a topic.
    pub async fn count(&self, topic: &str) -> usize {
        let now = Utc::now();
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|records| records.values().filter(|r| !r.record.is_expired(now)).count())
            .unwrap_or_default()
    }

    /// Raw stored record, including media type and encoding.
    pub async fn record(&self, topic: &str, index: &RawIndex) -> Option<Record> {
        let mut topics = self.topics.lock().await;
        live_record(&mut topics, topic, &index_key(index)).map(|stored| stored.record.clone())
    }

    fn not_found(topic: &str, index: &RawIndex) -> AdapterError {
        AdapterError::NotFound {
            topic: topic.to_string(),
            index: index_key(index),
        }
    }

    fn read(
        topics: &mut HashMap<String, TopicRecords>,
        topic: &str,
        index: &RawIndex,
        options: &GetOptions,
    ) -> AdapterResult<Option<Value>> {
        let Some(stored) = live_record(topics, topic, &index_key(index)) else {
            if options.optional {
                return Ok(None);
            }
            return Err(Self::not_found(topic, index));
        };

        if let Some(accepted) = &options.media_types {
            if !accepted.iter().any(|m| m == &stored.record.media_type) {
                return Err(AdapterError::Backend(format!(
                    "media type '{}' of {} is not accepted",
                    stored.record.media_type,
                    index_key(index)
                )));
            }
        }

        Ok(Some(stored.record.data.clone()))
    }
}

/// Looks a record up, dropping it if it has expired.
fn live_record<'a>(
    topics: &'a mut HashMap<String, TopicRecords>,
    topic: &str,
    key: &str,
) -> Option<&'a StoredRecord> {
    let records = topics.get_mut(topic)?;
    if records.get(key)?.record.is_expired(Utc::now()) {
        records.remove(key);
        return None;
    }
    records.get(key)
}

#[async_trait]
impl PersistenceAdapter for InMemoryVault {
    async fn get(
        &self,
        topic: &str,
        index: &RawIndex,
        options: &GetOptions,
    ) -> AdapterResult<Option<Value>> {
        let mut topics = self.topics.lock().await;
        Self::read(&mut topics, topic, index, options)
    }

    async fn mget(
        &self,
        queries: &[Query],
        options: &GetOptions,
    ) -> AdapterResult<Vec<Option<Value>>> {
        let mut topics = self.topics.lock().await;
        queries
            .iter()
            .map(|query| Self::read(&mut topics, &query.topic, &query.index, options))
            .collect()
    }

    async fn list(
        &self,
        topic: &str,
        partial_index: &RawIndex,
        options: &ListOptions,
    ) -> AdapterResult<Vec<RawIndex>> {
        let now = Utc::now();
        let topics = self.topics.lock().await;
        let Some(records) = topics.get(topic) else {
            return Ok(Vec::new());
        };

        let matching = records
            .values()
            .filter(|stored| !stored.record.is_expired(now))
            .filter(|stored| {
                partial_index
                    .iter()
                    .all(|(field, value)| stored.index.get(field) == Some(value))
            })
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|stored| stored.index.clone())
            .collect();

        Ok(matching)
    }

    async fn add(&self, topic: &str, index: &RawIndex, record: Record) -> AdapterResult<()> {
        let key = index_key(index);
        let mut topics = self.topics.lock().await;
        if live_record(&mut topics, topic, &key).is_some() {
            return Err(AdapterError::AlreadyExists {
                topic: topic.to_string(),
                index: key,
            });
        }

        event!(Level::TRACE, vault = %self.name, topic, index = %key, "vault add");
        topics.entry(topic.to_string()).or_default().insert(
            key,
            StoredRecord {
                index: index.clone(),
                record,
            },
        );
        Ok(())
    }

    async fn set(&self, topic: &str, index: &RawIndex, record: Record) -> AdapterResult<()> {
        let key = index_key(index);
        event!(Level::TRACE, vault = %self.name, topic, index = %key, "vault set");
        let mut topics = self.topics.lock().await;
        topics.entry(topic.to_string()).or_default().insert(
            key,
            StoredRecord {
                index: index.clone(),
                record,
            },
        );
        Ok(())
    }

    async fn touch(
        &self,
        topic: &str,
        index: &RawIndex,
        expiration: Option<Expiration>,
    ) -> AdapterResult<()> {
        let key = index_key(index);
        let mut topics = self.topics.lock().await;
        if live_record(&mut topics, topic, &key).is_none() {
            return Err(Self::not_found(topic, index));
        }

        if let Some(stored) = topics.get_mut(topic).and_then(|records| records.get_mut(&key)) {
            stored.record.expiration = expiration;
        }
        Ok(())
    }

    async fn del(&self, topic: &str, index: &RawIndex) -> AdapterResult<()> {
        let key = index_key(index);
        event!(Level::TRACE, vault = %self.name, topic, index = %key, "vault del");
        let mut topics = self.topics.lock().await;
        if let Some(records) = topics.get_mut(topic) {
            records.remove(&key);
        }
        Ok(())
    }
}
