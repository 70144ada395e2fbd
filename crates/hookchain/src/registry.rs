use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::context::HookContext;
use crate::handler::Handler;
use crate::key::HookKey;

/// The hooks registered under one key, in registration order.
///
/// Chains only grow; insertion order is execution order.
#[derive(Debug, Clone, Default)]
pub struct HookChain {
    handlers: Vec<Handler>,
}

impl HookChain {
    fn push(&mut self, handler: Handler) {
        self.handlers.push(handler);
    }

    #[must_use]
    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// One named registry: a mapping from key to hook chain.
///
/// Safe to register into and dispatch from concurrently. Keys keep the
/// order in which they were first registered.
#[derive(Debug)]
pub struct HookRegistry {
    name: String,
    chains: RwLock<IndexMap<HookKey, HookChain>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chains: RwLock::new(IndexMap::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append `handler` to the chain for `key`, creating the chain if needed.
    ///
    /// The handler is visible to every dispatch that starts after this returns.
    pub fn register(&self, key: &HookKey, handler: Handler) {
        debug!(
            registry = %self.name,
            %key,
            hook = handler.name().unwrap_or_default(),
            "registered hook"
        );
        self.chains
            .write()
            .entry(key.clone())
            .or_default()
            .push(handler);
    }

    /// Copy of the current chain for `key`, or `None` if nothing is registered.
    #[must_use]
    pub fn chain(&self, key: &HookKey) -> Option<HookChain> {
        self.chains.read().get(key).cloned()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<HookKey> {
        self.chains.read().keys().cloned().collect()
    }

    /// Number of hooks per key, in first-registration order. Each entry is
    /// also logged at `info`.
    #[must_use]
    pub fn dump(&self) -> Vec<(HookKey, usize)> {
        let counts: Vec<_> = self
            .chains
            .read()
            .iter()
            .map(|(key, chain)| (key.clone(), chain.len()))
            .collect();
        for (key, count) in &counts {
            info!(registry = %self.name, %key, hooks = count, "registered hooks");
        }
        counts
    }
}

/// Every named registry of an application.
///
/// Registries are created on first registration and live as long as this
/// value. Contexts that name no registry use the configured default.
#[derive(Debug, Default)]
pub struct Hooks {
    config: EngineConfig,
    registries: DashMap<String, Arc<HookRegistry>>,
}

impl Hooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            registries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh context carrying the configured rollback policy.
    #[must_use]
    pub fn new_context(&self) -> HookContext {
        HookContext::new().with_rollback_policy(self.config.rollback_policy())
    }

    /// The registry called `name`, or the default registry for `None`,
    /// created if it does not exist yet.
    #[must_use]
    pub fn registry(&self, name: Option<&str>) -> Arc<HookRegistry> {
        let name = self.resolve(name);
        if let Some(existing) = self.registries.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .registries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(HookRegistry::new(name)));
        Arc::clone(entry.value())
    }

    /// Register `handler` under `key` in the default registry.
    pub fn register(&self, key: &HookKey, handler: Handler) {
        self.registry(None).register(key, handler);
    }

    /// Register `handler` under `key` in the registry called `name`.
    pub fn register_in(&self, name: &str, key: &HookKey, handler: Handler) {
        self.registry(Some(name)).register(key, handler);
    }

    /// Current chain for `key` in the named registry, without creating anything.
    #[must_use]
    pub fn chain(&self, name: Option<&str>, key: &HookKey) -> Option<HookChain> {
        self.existing(name)?.chain(key)
    }

    #[must_use]
    pub fn registry_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .registries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Per-key hook counts of the named registry; empty if it does not exist.
    #[must_use]
    pub fn dump(&self, name: Option<&str>) -> Vec<(HookKey, usize)> {
        self.existing(name)
            .map(|registry| registry.dump())
            .unwrap_or_default()
    }

    pub(crate) fn existing(&self, name: Option<&str>) -> Option<Arc<HookRegistry>> {
        self.registries
            .get(self.resolve(name))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn resolve<'a>(&'a self, name: Option<&'a str>) -> &'a str {
        name.unwrap_or_else(|| self.config.default_registry())
    }
}
