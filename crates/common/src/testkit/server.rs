use std::sync::Arc;

use anyhow::Result;

use super::connection::TestConnection;
use crate::schema::MemorySchema;
use crate::store::Store;

/// A store seeded from a schema, handing out connections
pub struct TestServer {
    store: Store,
    schema: Arc<MemorySchema>,
}

impl TestServer {
    /// Create a store and seed it with the schema's declared values
    pub fn new(schema: MemorySchema) -> Result<Self> {
        let store = Store::new()?;
        let seeded = schema.seed(&store)?;
        tracing::debug!("test server seeded {} values", seeded);
        Ok(Self {
            store,
            schema: Arc::new(schema),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn schema(&self) -> &MemorySchema {
        &self.schema
    }

    /// Open a new in-process connection
    pub fn connect(&self) -> TestConnection {
        TestConnection::new(self.store.clone(), self.schema.clone())
    }

    /// Wait until every store event so far has been delivered
    pub fn settle(&self) {
        self.store.flush();
    }
}
