use std::sync::Arc;

use common::prelude::*;
use common::schema::SchemaError;

use crate::config::{Config, ConfigError};

/// Everything the connections of one daemon share
#[derive(Clone)]
pub struct ServiceState {
    store: Store,
    schema: Arc<MemorySchema>,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl ServiceState {
    /// Build the store and seed it with every declared value
    pub fn from_config(config: &Config) -> Result<Self, StateError> {
        let schema = config.schema()?;
        Self::new(schema)
    }

    pub fn new(schema: MemorySchema) -> Result<Self, StateError> {
        let store = Store::new()?;
        let seeded = schema.seed(&store)?;
        tracing::info!("seeded store with {} values", seeded);
        Ok(Self {
            store,
            schema: Arc::new(schema),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn schema(&self) -> Arc<dyn SchemaProvider> {
        self.schema.clone()
    }

    /// A handler for one new connection
    pub fn handler(&self, outbound: flume::Sender<Response>) -> SyncHandler {
        SyncHandler::new(self.store.clone(), self.schema(), outbound)
    }
}
