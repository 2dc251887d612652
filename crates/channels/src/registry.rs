use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::adapter::PlatformAdapter;

/// Registry of live adapters keyed by connection id.
///
/// The gateway exclusively owns the entries: an adapter is inserted after a
/// successful connect and removed on disconnect or expiry, and is never
/// shared across connection ids.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn PlatformAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, connection_id: impl Into<String>, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.write().await.insert(connection_id.into(), adapter);
    }

    pub async fn get(&self, connection_id: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.read().await.get(connection_id).map(Arc::clone)
    }

    pub async fn remove(&self, connection_id: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.write().await.remove(connection_id)
    }

    pub async fn contains(&self, connection_id: &str) -> bool {
        self.adapters.read().await.contains_key(connection_id)
    }

    pub async fn connection_ids(&self) -> Vec<String> {
        self.adapters.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.adapters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.adapters.read().await.is_empty()
    }
}
