//! Ring state and ownership lookup.

use crate::error::{Result, RingError};
use crate::kv::KvClient;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    Active,
    Leaving,
}

/// One replica's registration: its advertised address and ring tokens.
#[derive(Debug, Clone)]
pub struct ReplicaDesc {
    pub addr: String,
    pub tokens: Vec<u32>,
    pub state: ReplicaState,
    pub heartbeat: DateTime<Utc>,
}

impl ReplicaDesc {
    fn healthy(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        self.state == ReplicaState::Active && now - self.heartbeat <= timeout
    }
}

/// The shared ring value: every replica's registration, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct RingDesc {
    pub replicas: BTreeMap<String, ReplicaDesc>,
}

/// Read access to ring membership.
#[async_trait]
pub trait Ring: Send + Sync {
    /// The single replica that owns `key` under the current membership.
    async fn owner_of(&self, key: u32) -> Result<ReplicaDesc>;

    /// Every healthy replica, in stable (address) order.
    async fn all_replicas(&self) -> Result<Vec<ReplicaDesc>>;
}

/// Token-ring lookup over a [`KvClient`].
pub struct TokenRing {
    kv: Arc<dyn KvClient>,
    heartbeat_timeout: Duration,
}

impl TokenRing {
    pub fn new(kv: Arc<dyn KvClient>, heartbeat_timeout: std::time::Duration) -> Self {
        Self {
            kv,
            heartbeat_timeout: Duration::from_std(heartbeat_timeout)
                .unwrap_or_else(|_| Duration::seconds(60)),
        }
    }

    async fn healthy_replicas(&self) -> Result<Vec<ReplicaDesc>> {
        let now = Utc::now();
        let desc = self.kv.ring().await?;
        Ok(desc
            .replicas
            .into_values()
            .filter(|r| r.healthy(self.heartbeat_timeout, now))
            .collect())
    }
}

#[async_trait]
impl Ring for TokenRing {
    async fn owner_of(&self, key: u32) -> Result<ReplicaDesc> {
        let replicas = self.healthy_replicas().await?;
        let mut tokens: BTreeMap<u32, &ReplicaDesc> = BTreeMap::new();
        for replica in &replicas {
            for token in &replica.tokens {
                tokens.insert(*token, replica);
            }
        }
        if tokens.is_empty() {
            return Err(RingError::Empty);
        }
        // First token at or after the key, wrapping to the smallest token.
        let owner = tokens
            .range(key..)
            .next()
            .or_else(|| tokens.iter().next())
            .map(|(_, r)| (*r).clone())
            .ok_or(RingError::Empty)?;
        Ok(owner)
    }

    async fn all_replicas(&self) -> Result<Vec<ReplicaDesc>> {
        let mut replicas = self.healthy_replicas().await?;
        replicas.sort_by(|a, b| a.addr.cmp(&b.addr));
        Ok(replicas)
    }
}
