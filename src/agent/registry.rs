//! Named catalog of agent factories with singleton instance caching.
//!
//! The registry is built explicitly at startup from a table of
//! [`AgentDescriptor`]s; there is no global registration state.

use super::{Agent, AgentSettings};
use crate::llm::CompletionService;
use crate::models::{AgentInfo, AgentStatus, ConfigMap};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Constructor stored for each agent name.
pub type AgentFactory = Arc<dyn Fn(AgentSettings) -> Arc<dyn Agent> + Send + Sync>;

/// Registry failures.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Unknown agent: {name}. Available: {available:?}")]
    UnknownAgent { name: String, available: Vec<String> },

    #[error("Agent {name} is already cached with a different configuration; evict it before overriding")]
    CachedConfigConflict { name: String },

    #[error("Agent name must not be empty")]
    EmptyName,
}

/// One registration entry: name, factory and default configuration.
#[derive(Clone)]
pub struct AgentDescriptor {
    pub name: String,
    pub factory: AgentFactory,
    pub default_config: ConfigMap,
}

impl AgentDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F, default_config: ConfigMap) -> Self
    where
        F: Fn(AgentSettings) -> Arc<dyn Agent> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            default_config,
        }
    }

    /// Description taken from the `description` config key.
    pub fn description(&self) -> String {
        self.default_config
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.name)
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

/// Options for [`AgentRegistry::get_with`].
#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Reuse and cache a process-wide instance.
    pub singleton: bool,
    /// Keys merged over the default config (override wins).
    pub override_config: ConfigMap,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            singleton: true,
            override_config: ConfigMap::new(),
        }
    }
}

struct CachedInstance {
    agent: Arc<dyn Agent>,
    config: ConfigMap,
}

/// Catalog of agents available to the coordinator.
pub struct AgentRegistry {
    llm: Option<Arc<dyn CompletionService>>,
    /// Kept in registration order.
    descriptors: RwLock<Vec<AgentDescriptor>>,
    instances: RwLock<HashMap<String, CachedInstance>>,
}

impl AgentRegistry {
    /// Creates an empty registry whose agents are bound to `llm`.
    pub fn new(llm: Option<Arc<dyn CompletionService>>) -> Self {
        Self {
            llm,
            descriptors: RwLock::new(Vec::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry from a registration table.
    pub fn with_descriptors(
        llm: Option<Arc<dyn CompletionService>>,
        descriptors: impl IntoIterator<Item = AgentDescriptor>,
    ) -> Result<Self, RegistryError> {
        let registry = Self::new(llm);
        registry.register_all(descriptors)?;
        Ok(registry)
    }

    /// Register an agent.
    ///
    /// Registering a name twice replaces the earlier entry in place and
    /// drops any instance cached from the old factory.
    pub fn register(&self, descriptor: AgentDescriptor) -> Result<(), RegistryError> {
        if descriptor.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let name = descriptor.name.clone();
        let replaced = {
            let mut descriptors = self.descriptors.write();
            match descriptors.iter_mut().find(|d| d.name == name) {
                Some(existing) => {
                    *existing = descriptor;
                    true
                }
                None => {
                    descriptors.push(descriptor);
                    false
                }
            }
        };

        if replaced {
            warn!("Agent {} registered again; previous registration replaced", name);
            self.instances.write().remove(&name);
        } else {
            debug!("Registered agent {}", name);
        }

        Ok(())
    }

    /// Register every entry of a table, in order.
    pub fn register_all(
        &self,
        descriptors: impl IntoIterator<Item = AgentDescriptor>,
    ) -> Result<(), RegistryError> {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    /// Get the cached singleton for `name`, constructing it on first use.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Agent>, RegistryError> {
        self.get_with(name, GetOptions::default())
    }

    /// Get an instance with explicit caching and configuration options.
    ///
    /// A non-empty override that would change the configuration of an
    /// already cached singleton is rejected with `CachedConfigConflict`.
    pub fn get_with(&self, name: &str, options: GetOptions) -> Result<Arc<dyn Agent>, RegistryError> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| RegistryError::UnknownAgent {
                name: name.to_string(),
                available: self.list(),
            })?;

        let config = merge_config(&descriptor.default_config, &options.override_config);

        if options.singleton {
            if let Some(cached) = self.instances.read().get(name) {
                if options.override_config.is_empty() || cached.config == config {
                    return Ok(Arc::clone(&cached.agent));
                }
                return Err(RegistryError::CachedConfigConflict {
                    name: name.to_string(),
                });
            }
        }

        let settings = AgentSettings {
            name: name.to_string(),
            description: descriptor.description(),
            config: config.clone(),
            llm: self.llm.clone(),
        };
        let agent = (descriptor.factory)(settings);
        debug!("Constructed agent {}", name);

        if !options.singleton {
            return Ok(agent);
        }

        let mut instances = self.instances.write();
        let cached = instances
            .entry(name.to_string())
            .or_insert(CachedInstance { agent, config });
        Ok(Arc::clone(&cached.agent))
    }

    /// Registered agent names, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.descriptors.read().iter().map(|d| d.name.clone()).collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.descriptors.read().iter().any(|d| d.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    /// Default configuration of every registered agent.
    pub fn configs(&self) -> Vec<(String, ConfigMap)> {
        self.descriptors
            .read()
            .iter()
            .map(|d| (d.name.clone(), d.default_config.clone()))
            .collect()
    }

    /// Descriptor view of one agent, if registered.
    pub fn describe(&self, name: &str) -> Option<AgentInfo> {
        let descriptor = self.descriptor(name)?;
        Some(AgentInfo {
            name: descriptor.name.clone(),
            description: descriptor.description(),
            config: descriptor.default_config.clone(),
            has_instance: self.instances.read().contains_key(name),
        })
    }

    /// Coarse status of one agent, if registered.
    pub fn status(&self, name: &str) -> Option<AgentStatus> {
        if !self.is_registered(name) {
            return None;
        }
        if self.instances.read().contains_key(name) {
            Some(AgentStatus::Cached)
        } else {
            Some(AgentStatus::Registered)
        }
    }

    /// Drop the cached instance for `name`. Returns whether one existed.
    #[allow(dead_code)]
    pub fn remove_instance(&self, name: &str) -> bool {
        self.instances.write().remove(name).is_some()
    }

    /// Remove every registration and cached instance.
    #[allow(dead_code)]
    pub fn clear(&self) {
        self.descriptors.write().clear();
        self.instances.write().clear();
    }

    fn descriptor(&self, name: &str) -> Option<AgentDescriptor> {
        self.descriptors.read().iter().find(|d| d.name == name).cloned()
    }
}

/// Merge `overrides` over `defaults`, key by key.
pub fn merge_config(defaults: &ConfigMap, overrides: &ConfigMap) -> ConfigMap {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
