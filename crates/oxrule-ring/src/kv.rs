//! Key-value substrate behind the ring.
//!
//! The ring itself is a single value (the [`RingDesc`]) in a store shared
//! by all replicas. The trait keeps the substrate pluggable; the in-memory
//! implementation covers single-process deployments and tests.

use crate::error::Result;
use crate::ring::{ReplicaDesc, RingDesc};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait KvClient: Send + Sync {
    /// Reads the current ring descriptor.
    async fn ring(&self) -> Result<RingDesc>;

    /// Inserts or replaces one replica's registration.
    async fn upsert_replica(&self, desc: ReplicaDesc) -> Result<()>;

    /// Removes one replica's registration. Removing an absent replica is
    /// not an error.
    async fn remove_replica(&self, addr: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryKv {
    state: RwLock<RingDesc>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvClient for InMemoryKv {
    async fn ring(&self) -> Result<RingDesc> {
        Ok(self.state.read().await.clone())
    }

    async fn upsert_replica(&self, desc: ReplicaDesc) -> Result<()> {
        let mut state = self.state.write().await;
        state.replicas.insert(desc.addr.clone(), desc);
        Ok(())
    }

    async fn remove_replica(&self, addr: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.replicas.remove(addr);
        Ok(())
    }
}
