//! Registry of admission plugin factories, keyed by plugin name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{AdmissionError, AdmissionResult};
use crate::interfaces::Interface;

/// Builds a plugin instance from its optional configuration block.
pub type Factory = Arc<dyn Fn(Option<&serde_json::Value>) -> AdmissionResult<Arc<dyn Interface>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct Plugins {
    registry: BTreeMap<String, Factory>,
}

impl Plugins {
    pub fn new() -> Self { Self::default() }

    /// Registering a name twice is a startup error.
    pub fn register<F>(&mut self, name: &str, factory: F) -> AdmissionResult<()>
    where
        F: Fn(Option<&serde_json::Value>) -> AdmissionResult<Arc<dyn Interface>> + Send + Sync + 'static,
    {
        if self.registry.contains_key(name) {
            return Err(AdmissionError::config(format!("admission plugin {name:?} registered twice")));
        }
        debug!(plugin = %name, "admission: registered plugin");
        self.registry.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool { self.registry.contains_key(name) }

    /// Sorted.
    pub fn registered_names(&self) -> Vec<String> { self.registry.keys().cloned().collect() }

    /// Instantiate the named plugin; unknown names are an error.
    pub fn new_from_plugins(&self, name: &str, config: Option<&serde_json::Value>) -> AdmissionResult<Arc<dyn Interface>> {
        let factory = self
            .registry
            .get(name)
            .ok_or_else(|| AdmissionError::config(format!("unknown admission plugin: {name}")))?;
        factory(config)
    }
}
