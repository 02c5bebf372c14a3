use super::Topic;
use crate::config::VaultRouteConfig;
use crate::core::{ArchivistError, Result};
use crate::crash::crash;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Per-kind persistence settings, looked up by topic name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDescriptor {
    pub name: String,
    /// Declared index fields, in order.
    pub index: Vec<String>,
    /// Vaults the topic is stored in; empty means the default archivist.
    #[serde(default)]
    pub vaults: Vec<String>,
}

impl TopicDescriptor {
    pub fn new(name: impl Into<String>, index: &[&str]) -> Self {
        Self {
            name: name.into(),
            index: index.iter().map(|field| field.to_string()).collect(),
            vaults: Vec::new(),
        }
    }

    pub fn of<T: Topic>() -> Self {
        let mut descriptor = Self::new(T::NAME, T::INDEX);
        descriptor.vaults = T::VAULTS.iter().map(|v| v.to_string()).collect();
        descriptor
    }

    pub fn with_vaults(mut self, vaults: &[&str]) -> Self {
        self.vaults = vaults.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Route reading from and writing to the declared vaults.
    pub fn route(&self) -> Option<VaultRouteConfig> {
        if self.vaults.is_empty() {
            return None;
        }
        Some(VaultRouteConfig {
            topic: self.name.clone(),
            read_order: self.vaults.clone(),
            write_order: self.vaults.clone(),
        })
    }
}

/// Registry of every known topic, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    topics: BTreeMap<String, TopicDescriptor>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor; a second topic with the same name is fatal.
    pub fn register(&mut self, descriptor: TopicDescriptor) -> Result<()> {
        if self.topics.contains_key(&descriptor.name) {
            return Err(crash(
                ArchivistError::TopicAlreadyDefined(descriptor.name.clone()),
                json!({ "topic": descriptor.name }),
            ));
        }
        self.topics.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn register_topic<T: Topic>(&mut self) -> Result<()> {
        self.register(TopicDescriptor::of::<T>())
    }

    /// Registers a descriptor discovered in a definition file named `file_stem`.
    ///
    /// The descriptor's name must equal the file stem.
    pub fn define(&mut self, file_stem: &str, descriptor: TopicDescriptor) -> Result<()> {
        if descriptor.name != file_stem {
            return Err(crash(
                ArchivistError::TopicNameMismatch {
                    file: file_stem.to_string(),
                    name: descriptor.name.clone(),
                },
                json!({ "file": file_stem, "topic": descriptor.name }),
            ));
        }
        self.register(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&TopicDescriptor> {
        self.topics.get(name)
    }

    pub fn descriptor(&self, name: &str) -> Result<&TopicDescriptor> {
        self.get(name)
            .ok_or_else(|| ArchivistError::UnknownTopic(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Vault routes for every topic that declares vaults.
    pub fn routes(&self) -> Vec<VaultRouteConfig> {
        self.topics.values().filter_map(TopicDescriptor::route).collect()
    }
}
