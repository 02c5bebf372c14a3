//! Typed entities over the persistence adapter
//!
//! An entity kind implements [`Topic`]: its name, its declared index fields,
//! and the typed index and data it carries. [`Entity`] wraps one record of that
//! kind together with its metadata (topic, index, execution context) and
//! guarantees that nothing reaches the adapter unvalidated:
//!
//! - the index is validated when it is assigned, and can be assigned once;
//! - `add`, `set` and `touch` validate the data first and never call the
//!   adapter when validation fails;
//! - `del` does not validate.

mod index;
mod registry;

pub use index::{AssignedIndex, build_index, project_index};
pub use registry::{TopicDescriptor, TopicRegistry};

use crate::context::ExecutionContext;
use crate::core::{ArchivistError, Result, ValidationCode, ValidationError, Violation};
use crate::persistence::{
    Encoding, Expiration, GetOptions, ListOptions, Query, RawIndex, Record,
};
use crate::transform::{to_instance_or_default, to_plain};
use crate::validation::Validate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use tracing::{Instrument, Level, event, info_span};

/// A persisted entity kind.
pub trait Topic: Send + Sync + 'static {
    /// Topic name, unique across the registry.
    const NAME: &'static str;
    /// Declared index fields.
    const INDEX: &'static [&'static str];
    /// Vaults this topic is stored in.
    const VAULTS: &'static [&'static str] = &[];

    type Index: Serialize + DeserializeOwned + Validate + Clone + Send + Sync + 'static;
    type Data: Serialize + DeserializeOwned + Validate + Default + Send + Sync + 'static;
}

/// Options for [`Entity::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub list: ListOptions,
    pub get: GetOptions,
}

/// Bookkeeping kept apart from the data view.
pub struct EntityMeta<I> {
    topic: &'static str,
    index: Option<AssignedIndex<I>>,
    context: ExecutionContext,
}

impl<I> EntityMeta<I> {
    pub fn topic(&self) -> &'static str {
        self.topic
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }
}

pub struct Entity<T: Topic> {
    data: T::Data,
    meta: EntityMeta<T::Index>,
}

impl<T: Topic> Entity<T> {
    /// Builds an unindexed entity bound to `ctx`.
    ///
    /// `data` is transformed into `T::Data`; without it the data is default-constructed.
    pub fn instantiate(ctx: &ExecutionContext, data: Option<Value>) -> Result<Self> {
        Ok(Self {
            data: to_instance_or_default(data)?,
            meta: EntityMeta {
                topic: T::NAME,
                index: None,
                context: ctx.clone(),
            },
        })
    }

    /// Instantiates the entity and assigns its index.
    ///
    /// Fails with `InvalidIndex` when the index does not pass validation.
    pub async fn create(ctx: &ExecutionContext, index: RawIndex, data: Option<Value>) -> Result<Self> {
        let mut entity = Self::instantiate(ctx, data)?;
        entity.set_index(&index).await?;
        Ok(entity)
    }

    /// Validates and assigns the index. An index can only be assigned once.
    pub async fn set_index(&mut self, index: &RawIndex) -> Result<()> {
        if self.meta.index.is_some() {
            return Err(ArchivistError::IndexAlreadyAssigned(T::NAME.to_string()));
        }
        let assigned = build_index::<T::Index>(&self.meta.context, T::NAME, T::INDEX, index).await?;
        self.meta.index = Some(assigned);
        Ok(())
    }

    /// Reads one entity. `None` when the adapter has no record (see `GetOptions::optional`).
    ///
    /// The lookup uses the declared index fields only, the same key writes use.
    pub async fn get(
        ctx: &ExecutionContext,
        index: &RawIndex,
        options: &GetOptions,
    ) -> Result<Option<Self>> {
        let index = project_index(T::INDEX, index);
        let data = ctx
            .archivist()
            .get(T::NAME, &index, options)
            .instrument(info_span!("entity.get", topic = T::NAME))
            .await?;

        match data {
            Some(data) => Ok(Some(Self::create(ctx, index, Some(data)).await?)),
            None => Ok(None),
        }
    }

    /// Reads several entities with one batch call.
    ///
    /// Position `i` of the result belongs to `indexes[i]`; a record the adapter
    /// does not have stays in place as `None`. Entities are built one at a time,
    /// in input order.
    pub async fn mget(
        ctx: &ExecutionContext,
        indexes: &[RawIndex],
        options: &GetOptions,
    ) -> Result<Vec<Option<Self>>> {
        let queries: Vec<Query> = indexes
            .iter()
            .map(|index| Query::new(T::NAME, project_index(T::INDEX, index)))
            .collect();

        let results = ctx
            .archivist()
            .mget(&queries, options)
            .instrument(info_span!("entity.mget", topic = T::NAME, queries = queries.len()))
            .await?;

        // adapters must answer every query positionally
        if results.len() != queries.len() {
            return Err(ArchivistError::MgetShapeMismatch {
                expected: queries.len(),
                returned: results.len(),
            });
        }

        let mut entities = Vec::with_capacity(queries.len());
        for (query, data) in queries.into_iter().zip(results) {
            let entity = match data {
                Some(data) => Some(Self::create(ctx, query.index, Some(data)).await?),
                None => None,
            };
            entities.push(entity);
        }
        Ok(entities)
    }

    /// Full indexes matching a partial index. Nothing is constructed or validated.
    pub async fn list(
        ctx: &ExecutionContext,
        partial_index: &RawIndex,
        options: &ListOptions,
    ) -> Result<Vec<RawIndex>> {
        let indexes = ctx
            .archivist()
            .list(T::NAME, partial_index, options)
            .instrument(info_span!("entity.list", topic = T::NAME))
            .await?;
        Ok(indexes)
    }

    /// `list` followed by `mget` of its results.
    pub async fn query(
        ctx: &ExecutionContext,
        partial_index: &RawIndex,
        options: &QueryOptions,
    ) -> Result<Vec<Option<Self>>> {
        let indexes = Self::list(ctx, partial_index, &options.list).await?;
        Self::mget(ctx, &indexes, &options.get).await
    }

    /// Validates the data fields (not the index).
    pub async fn validate(&self) -> Result<Vec<Violation>> {
        let plain = to_plain(&self.data)?;
        Ok(self
            .meta
            .context
            .validator()
            .validate(&plain, &T::Data::validation_schema())
            .await)
    }

    async fn validated_record(
        &self,
        media_type: &str,
        encoding: Encoding,
        expiration: Option<Expiration>,
    ) -> Result<Record> {
        let violations = self.validate().await?;
        if !violations.is_empty() {
            event!(
                Level::DEBUG,
                topic = T::NAME,
                violations = violations.len(),
                "entity data rejected"
            );
            return Err(ValidationError::new(
                ValidationCode::InvalidType,
                format!("Invalid data for topic '{}'", T::NAME),
                violations,
            )
            .into());
        }

        Ok(Record {
            data: to_plain(&self.data)?,
            media_type: media_type.to_string(),
            encoding,
            expiration,
        })
    }

    /// Creates the record; the adapter decides what happens if it already exists.
    pub async fn add(
        &self,
        media_type: &str,
        encoding: Encoding,
        expiration: Option<Expiration>,
    ) -> Result<()> {
        let index = self.require_raw_index()?;
        let record = self.validated_record(media_type, encoding, expiration).await?;
        self.meta
            .context
            .archivist()
            .add(T::NAME, index, record)
            .instrument(info_span!("entity.write", topic = T::NAME, op = "add"))
            .await?;
        Ok(())
    }

    /// Creates or replaces the record.
    pub async fn set(
        &self,
        media_type: &str,
        encoding: Encoding,
        expiration: Option<Expiration>,
    ) -> Result<()> {
        let index = self.require_raw_index()?;
        let record = self.validated_record(media_type, encoding, expiration).await?;
        self.meta
            .context
            .archivist()
            .set(T::NAME, index, record)
            .instrument(info_span!("entity.write", topic = T::NAME, op = "set"))
            .await?;
        Ok(())
    }

    /// `set` with the configured default media type and encoding, without expiration.
    pub async fn save(&self) -> Result<()> {
        let ctx = &self.meta.context;
        self.set(ctx.default_media_type(), ctx.default_encoding(), None)
            .await
    }

    /// Updates the expiration of the stored record.
    pub async fn touch(&self, expiration: Option<Expiration>) -> Result<()> {
        let index = self.require_raw_index()?;
        let violations = self.validate().await?;
        ValidationError::check(
            ValidationCode::InvalidType,
            format!("Invalid data for topic '{}'", T::NAME),
            violations,
        )?;

        self.meta
            .context
            .archivist()
            .touch(T::NAME, index, expiration)
            .instrument(info_span!("entity.write", topic = T::NAME, op = "touch"))
            .await?;
        Ok(())
    }

    /// Deletes the record, whatever state the data is in.
    pub async fn del(&self) -> Result<()> {
        let index = self.require_raw_index()?;
        self.meta
            .context
            .archivist()
            .del(T::NAME, index)
            .instrument(info_span!("entity.write", topic = T::NAME, op = "del"))
            .await?;
        Ok(())
    }

    fn require_raw_index(&self) -> Result<&RawIndex> {
        self.raw_index()
            .ok_or_else(|| ArchivistError::MissingIndex(T::NAME.to_string()))
    }

    pub fn topic(&self) -> &'static str {
        self.meta.topic
    }

    pub fn meta(&self) -> &EntityMeta<T::Index> {
        &self.meta
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.meta.context
    }

    pub fn index(&self) -> Option<&T::Index> {
        self.meta.index.as_ref().map(|assigned| &assigned.typed)
    }

    pub fn raw_index(&self) -> Option<&RawIndex> {
        self.meta.index.as_ref().map(|assigned| &assigned.raw)
    }

    pub fn data(&self) -> &T::Data {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T::Data {
        &mut self.data
    }

    pub fn into_data(self) -> T::Data {
        self.data
    }

    /// Plain view of the data fields; the index is not part of it.
    pub fn view(&self) -> Result<Value> {
        to_plain(&self.data)
    }
}

impl<T: Topic> fmt::Debug for Entity<T>
where
    T::Data: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("topic", &self.meta.topic)
            .field("index", &self.raw_index())
            .field("data", &self.data)
            .finish()
    }
}
