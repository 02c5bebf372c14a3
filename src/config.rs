use crate::core::{ArchivistError, Result};
use crate::persistence::Encoding;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs applied by the schema validator to every validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// When `false`, properties not declared by the schema are reported.
    pub allow_extra_fields: bool,
    /// Stop collecting after the first violation.
    pub stop_at_first_error: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            allow_extra_fields: true,
            stop_at_first_error: false,
        }
    }
}

/// Read and write order of vaults for a single topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRouteConfig {
    pub topic: String,
    /// Vaults consulted on reads; first hit wins.
    pub read_order: Vec<String>,
    /// Vaults every write goes to, in this order.
    pub write_order: Vec<String>,
}

impl VaultRouteConfig {
    /// Route that reads from and writes to the same vaults.
    pub fn symmetric(topic: impl Into<String>, vaults: &[&str]) -> Self {
        let vaults: Vec<String> = vaults.iter().map(|v| v.to_string()).collect();
        Self {
            topic: topic.into(),
            read_order: vaults.clone(),
            write_order: vaults,
        }
    }
}

/// Top-level configuration.
///
/// Loaded from JSON so it can sit next to the rest of a service's settings:
///
/// ```json
/// {
///   "validation": { "allow_extra_fields": false },
///   "default_media_type": "application/json",
///   "vaults": [
///     { "topic": "Player", "read_order": ["memory"], "write_order": ["memory"] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivistConfig {
    pub validation: ValidationPolicy,
    /// Media type used by `Entity::save`.
    pub default_media_type: String,
    /// Encoding used by `Entity::save`.
    pub default_encoding: Encoding,
    pub vaults: Vec<VaultRouteConfig>,
}

impl Default for ArchivistConfig {
    fn default() -> Self {
        Self {
            validation: ValidationPolicy::default(),
            default_media_type: "application/json".to_string(),
            default_encoding: Encoding::Live,
            vaults: Vec::new(),
        }
    }
}

impl ArchivistConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a JSON document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ArchivistError::Config(format!("invalid config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ArchivistError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Set the validation policy
    pub fn validation(mut self, policy: ValidationPolicy) -> Self {
        self.validation = policy;
        self
    }

    /// Set the media type used by `save`
    pub fn default_media_type(mut self, media_type: &str) -> Self {
        self.default_media_type = media_type.to_string();
        self
    }

    /// Set the encoding used by `save`
    pub fn default_encoding(mut self, encoding: Encoding) -> Self {
        self.default_encoding = encoding;
        self
    }

    /// Add a topic route
    pub fn route(mut self, route: VaultRouteConfig) -> Self {
        self.vaults.push(route);
        self
    }

    pub fn route_for(&self, topic: &str) -> Option<&VaultRouteConfig> {
        self.vaults.iter().find(|route| route.topic == topic)
    }

    fn check(&self) -> Result<()> {
        if self.default_media_type.trim().is_empty() {
            return Err(ArchivistError::Config(
                "default_media_type must not be empty".to_string(),
            ));
        }

        for (i, route) in self.vaults.iter().enumerate() {
            if route.topic.trim().is_empty() {
                return Err(ArchivistError::Config(format!(
                    "vault route #{} has an empty topic",
                    i
                )));
            }
            if self.vaults[..i].iter().any(|prev| prev.topic == route.topic) {
                return Err(ArchivistError::Config(format!(
                    "topic '{}' is routed twice",
                    route.topic
                )));
            }
        }
        Ok(())
    }
}
