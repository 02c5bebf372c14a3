use super::{Expiration, GetOptions, ListOptions, PersistenceAdapter, Query, RawIndex, Record};
use crate::config::{ArchivistConfig, VaultRouteConfig};
use crate::core::{AdapterError, AdapterResult, ArchivistError, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Level, event};

/// Routes each topic to named vaults.
///
/// Reads walk the topic's read order and stop at the first vault holding the
/// record. Writes, touches and deletes go to every vault of the write order,
/// in order; the first failure aborts the remaining vaults.
#[derive(Clone, Default)]
pub struct VaultRouter {
    vaults: HashMap<String, Arc<dyn PersistenceAdapter>>,
    routes: HashMap<String, VaultRouteConfig>,
}

impl VaultRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a router from the configured routes over the given vaults.
    pub fn from_config(
        config: &ArchivistConfig,
        vaults: HashMap<String, Arc<dyn PersistenceAdapter>>,
    ) -> Result<Self> {
        let mut router = Self {
            vaults,
            routes: HashMap::new(),
        };
        for route in &config.vaults {
            router.add_route(route.clone())?;
        }
        Ok(router)
    }

    /// Registers a named vault.
    pub fn with_vault(mut self, name: impl Into<String>, vault: Arc<dyn PersistenceAdapter>) -> Self {
        self.vaults.insert(name.into(), vault);
        self
    }

    /// Adds a topic route; every vault it names must already be registered.
    pub fn add_route(&mut self, route: VaultRouteConfig) -> Result<()> {
        for name in route.read_order.iter().chain(route.write_order.iter()) {
            if !self.vaults.contains_key(name) {
                return Err(ArchivistError::Config(format!(
                    "topic '{}' is routed to unknown vault '{}'",
                    route.topic, name
                )));
            }
        }
        if route.write_order.is_empty() {
            return Err(ArchivistError::Config(format!(
                "topic '{}' has no vault to write to",
                route.topic
            )));
        }
        self.routes.insert(route.topic.clone(), route);
        Ok(())
    }

    pub fn with_route(mut self, route: VaultRouteConfig) -> Result<Self> {
        self.add_route(route)?;
        Ok(self)
    }

    fn route(&self, topic: &str) -> AdapterResult<&VaultRouteConfig> {
        self.routes
            .get(topic)
            .ok_or_else(|| AdapterError::NoRoute(topic.to_string()))
    }

    fn vault(&self, name: &str) -> AdapterResult<&Arc<dyn PersistenceAdapter>> {
        self.vaults
            .get(name)
            .ok_or_else(|| AdapterError::UnknownVault(name.to_string()))
    }

    fn write_vaults(&self, topic: &str) -> AdapterResult<Vec<(&str, &Arc<dyn PersistenceAdapter>)>> {
        self.route(topic)?
            .write_order
            .iter()
            .map(|name| Ok((name.as_str(), self.vault(name)?)))
            .collect()
    }
}

#[async_trait]
impl PersistenceAdapter for VaultRouter {
    async fn get(
        &self,
        topic: &str,
        index: &RawIndex,
        options: &GetOptions,
    ) -> AdapterResult<Option<Value>> {
        let route = self.route(topic)?;
        let probe = GetOptions {
            optional: true,
            media_types: options.media_types.clone(),
        };

        for name in &route.read_order {
            if let Some(data) = self.vault(name)?.get(topic, index, &probe).await? {
                event!(Level::TRACE, topic, vault = %name, "router read hit");
                return Ok(Some(data));
            }
        }

        if options.optional {
            return Ok(None);
        }
        Err(AdapterError::NotFound {
            topic: topic.to_string(),
            index: super::index_key(index),
        })
    }

    async fn mget(
        &self,
        queries: &[Query],
        options: &GetOptions,
    ) -> AdapterResult<Vec<Option<Value>>> {
        // queries may span topics with different routes
        try_join_all(
            queries
                .iter()
                .map(|query| self.get(&query.topic, &query.index, options)),
        )
        .await
    }

    async fn list(
        &self,
        topic: &str,
        partial_index: &RawIndex,
        options: &ListOptions,
    ) -> AdapterResult<Vec<RawIndex>> {
        let route = self.route(topic)?;
        match route.read_order.first() {
            Some(name) => self.vault(name)?.list(topic, partial_index, options).await,
            None => Ok(Vec::new()),
        }
    }

    async fn add(&self, topic: &str, index: &RawIndex, record: Record) -> AdapterResult<()> {
        for (name, vault) in self.write_vaults(topic)? {
            event!(Level::TRACE, topic, vault = name, "router add");
            vault.add(topic, index, record.clone()).await?;
        }
        Ok(())
    }

    async fn set(&self, topic: &str, index: &RawIndex, record: Record) -> AdapterResult<()> {
        for (name, vault) in self.write_vaults(topic)? {
            event!(Level::TRACE, topic, vault = name, "router set");
            vault.set(topic, index, record.clone()).await?;
        }
        Ok(())
    }

    async fn touch(
        &self,
        topic: &str,
        index: &RawIndex,
        expiration: Option<Expiration>,
    ) -> AdapterResult<()> {
        for (_, vault) in self.write_vaults(topic)? {
            vault.touch(topic, index, expiration).await?;
        }
        Ok(())
    }

    async fn del(&self, topic: &str, index: &RawIndex) -> AdapterResult<()> {
        for (name, vault) in self.write_vaults(topic)? {
            event!(Level::TRACE, topic, vault = name, "router del");
            vault.del(topic, index).await?;
        }
        Ok(())
    }
}
