//! Factory registry keyed by lowercase operator and source keys.

use std::collections::HashMap;
use std::sync::Arc;

use crate::factory::QueryNodeFactory;

/// Key of the fallback factory for data sources without a source id.
pub const DEFAULT_SOURCE_KEY: &str = "";

#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn QueryNodeFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `key` (lowercased), replacing any previous
    /// holder.
    pub fn register(&mut self, key: impl Into<String>, factory: Arc<dyn QueryNodeFactory>) {
        self.factories.insert(key.into().to_lowercase(), factory);
    }

    /// Register the fallback data source factory.
    pub fn register_default(&mut self, factory: Arc<dyn QueryNodeFactory>) {
        self.factories.insert(DEFAULT_SOURCE_KEY.to_string(), factory);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn QueryNodeFactory>> {
        self.factories.get(&key.to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
