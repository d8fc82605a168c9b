use crate::backend::{Connection, Connector, EndpointId};
use crate::error::TableportError;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<dyn Connection>>>;

/// One lazily created connection per endpoint.
///
/// Concurrent first callers for the same endpoint wait on a single connect
/// attempt. A failed attempt leaves the slot empty so the next call retries.
/// Entries live until [`evict`](Self::evict) or [`clear`](Self::clear).
pub struct ConnectionCache {
    connector: Arc<dyn Connector>,
    slots: DashMap<EndpointId, Slot>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: DashMap::new(),
        }
    }

    pub async fn get(&self, endpoint: &EndpointId) -> Result<Arc<dyn Connection>, TableportError> {
        // The shard guard is released at the end of this statement, before any await.
        let slot: Slot = self.slots.entry(endpoint.clone()).or_default().value().clone();

        if let Some(conn) = slot.get() {
            tracing::debug!(warehouse = %endpoint, "reusing cached connection");
            return Ok(Arc::clone(conn));
        }

        let conn = slot
            .get_or_try_init(|| async {
                tracing::info!(warehouse = %endpoint, "opening connection");
                self.connector.connect(endpoint).await
            })
            .await?;
        Ok(Arc::clone(conn))
    }

    pub fn is_connected(&self, endpoint: &EndpointId) -> bool {
        self.slots
            .get(endpoint)
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of established connections.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the connection for one endpoint. Returns whether one was cached.
    pub fn evict(&self, endpoint: &EndpointId) -> bool {
        self.slots
            .remove(endpoint)
            .is_some_and(|(_, slot)| slot.initialized())
    }

    pub fn clear(&self) {
        let dropped = self.len();
        self.slots.clear();
        tracing::info!(dropped, "cleared connection cache");
    }
}
