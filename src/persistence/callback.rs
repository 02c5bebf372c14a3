use super::{Expiration, GetOptions, ListOptions, PersistenceAdapter, Query, RawIndex, Record};
use crate::core::{AdapterError, AdapterResult};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

/// Completion handle of a callback-style operation: `(error, result)` folded into one value.
pub type Callback<T> = Box<dyn FnOnce(AdapterResult<T>) + Send + 'static>;

/// A backend that reports completion through callbacks instead of futures.
pub trait CallbackPersistence: Send + Sync {
    fn get(&self, topic: &str, index: &RawIndex, options: &GetOptions, cb: Callback<Option<Value>>);

    fn mget(&self, queries: &[Query], options: &GetOptions, cb: Callback<Vec<Option<Value>>>);

    fn list(
        &self,
        topic: &str,
        partial_index: &RawIndex,
        options: &ListOptions,
        cb: Callback<Vec<RawIndex>>,
    );

    fn add(&self, topic: &str, index: &RawIndex, record: Record, cb: Callback<()>);

    fn set(&self, topic: &str, index: &RawIndex, record: Record, cb: Callback<()>);

    fn touch(
        &self,
        topic: &str,
        index: &RawIndex,
        expiration: Option<Expiration>,
        cb: Callback<()>,
    );

    fn del(&self, topic: &str, index: &RawIndex, cb: Callback<()>);
}

/// Starts a callback-style operation and waits for its single result.
///
/// A callback that is dropped without being called surfaces as
/// `AdapterError::CallbackDropped`.
pub async fn from_callback<T, F>(operation: &'static str, start: F) -> AdapterResult<T>
where
    T: Send + 'static,
    F: FnOnce(Callback<T>) + Send,
{
    let (tx, rx) = oneshot::channel();
    start(Box::new(move |result| {
        // the receiver only goes away if the caller stopped waiting
        let _ = tx.send(result);
    }));
    rx.await
        .map_err(|_| AdapterError::CallbackDropped(operation))?
}

/// Exposes a `CallbackPersistence` backend as a `PersistenceAdapter`.
pub struct Promisified<A> {
    inner: A,
}

impl<A: CallbackPersistence> Promisified<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: CallbackPersistence> PersistenceAdapter for Promisified<A> {
    async fn get(
        &self,
        topic: &str,
        index: &RawIndex,
        options: &GetOptions,
    ) -> AdapterResult<Option<Value>> {
        from_callback("get", |cb| self.inner.get(topic, index, options, cb)).await
    }

    async fn mget(
        &self,
        queries: &[Query],
        options: &GetOptions,
    ) -> AdapterResult<Vec<Option<Value>>> {
        from_callback("mget", |cb| self.inner.mget(queries, options, cb)).await
    }

    async fn list(
        &self,
        topic: &str,
        partial_index: &RawIndex,
        options: &ListOptions,
    ) -> AdapterResult<Vec<RawIndex>> {
        from_callback("list", |cb| self.inner.list(topic, partial_index, options, cb)).await
    }

    async fn add(&self, topic: &str, index: &RawIndex, record: Record) -> AdapterResult<()> {
        from_callback("add", |cb| self.inner.add(topic, index, record, cb)).await
    }

    async fn set(&self, topic: &str, index: &RawIndex, record: Record) -> AdapterResult<()> {
        from_callback("set", |cb| self.inner.set(topic, index, record, cb)).await
    }

    async fn touch(
        &self,
        topic: &str,
        index: &RawIndex,
        expiration: Option<Expiration>,
    ) -> AdapterResult<()> {
        from_callback("touch", |cb| self.inner.touch(topic, index, expiration, cb)).await
    }

    async fn del(&self, topic: &str, index: &RawIndex) -> AdapterResult<()> {
        from_callback("del", |cb| self.inner.del(topic, index, cb)).await
    }
}
