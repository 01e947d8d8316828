//! In-process wire bus connecting local engines by wire address.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use paychan_types::WireAddress;

use super::engine::EngineInner;
use crate::error::{EngineError, EngineResult};

/// Directory of engines reachable in this process.
///
/// Cloning the bus shares the same directory, so every engine built from a
/// clone can reach every other one.
#[derive(Clone, Default)]
pub struct LocalBus {
    endpoints: Arc<RwLock<HashMap<WireAddress, Arc<EngineInner>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(&self, engine: Arc<EngineInner>) -> EngineResult<()> {
        let mut endpoints = self.endpoints.write().await;
        let address = engine.address().clone();
        if endpoints.contains_key(&address) {
            return Err(EngineError::AddressInUse(address));
        }
        endpoints.insert(address.clone(), engine);
        debug!("Registered {} on local bus", address);
        Ok(())
    }

    pub(crate) async fn lookup(&self, address: &WireAddress) -> Option<Arc<EngineInner>> {
        let endpoints = self.endpoints.read().await;
        endpoints.get(address).cloned()
    }

    pub(crate) async fn remove(&self, address: &WireAddress) {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.remove(address).is_some() {
            debug!("Removed {} from local bus", address);
        }
    }

    /// Whether an engine currently listens on `address`.
    pub async fn contains(&self, address: &WireAddress) -> bool {
        self.endpoints.read().await.contains_key(address)
    }

    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
