//! Replica lifecycle: register, heartbeat, hand off, deregister.

use crate::error::Result;
use crate::kv::KvClient;
use crate::ring::{ReplicaDesc, ReplicaState};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

#[derive(Debug, Clone)]
pub struct LifecyclerConfig {
    /// Address other replicas use to reach this one.
    pub addr: String,
    /// Number of random tokens to claim on the ring.
    pub num_tokens: usize,
    pub heartbeat_period: Duration,
    /// How long to wait for a successor replica before deregistering.
    pub search_pending_for: Duration,
}

impl Default for LifecyclerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9095".to_string(),
            num_tokens: 128,
            heartbeat_period: Duration::from_secs(5),
            search_pending_for: Duration::from_secs(300),
        }
    }
}

/// Maintains this replica's registration in the ring.
pub struct Lifecycler {
    cfg: LifecyclerConfig,
    kv: Arc<dyn KvClient>,
    tokens: Vec<u32>,
}

impl Lifecycler {
    pub fn new(cfg: LifecyclerConfig, kv: Arc<dyn KvClient>) -> Self {
        let mut rng = rand::thread_rng();
        let mut tokens: Vec<u32> = (0..cfg.num_tokens).map(|_| rng.gen()).collect();
        tokens.sort_unstable();
        tokens.dedup();
        Self { cfg, kv, tokens }
    }

    pub fn addr(&self) -> &str {
        &self.cfg.addr
    }

    fn desc(&self, state: ReplicaState) -> ReplicaDesc {
        ReplicaDesc {
            addr: self.cfg.addr.clone(),
            tokens: self.tokens.clone(),
            state,
            heartbeat: Utc::now(),
        }
    }

    /// Joins the ring in the Active state.
    pub async fn register(&self) -> Result<()> {
        self.kv.upsert_replica(self.desc(ReplicaState::Active)).await?;
        tracing::info!(
            addr = %self.cfg.addr,
            tokens = self.tokens.len(),
            "Replica registered in ring"
        );
        Ok(())
    }

    /// Heartbeats until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval(self.cfg.heartbeat_period);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tick.tick() => {
                    if let Err(e) = self
                        .kv
                        .upsert_replica(self.desc(ReplicaState::Active))
                        .await
                    {
                        tracing::warn!(error = %e, "Ring heartbeat failed");
                    }
                }
            }
        }
    }

    /// Leaves the ring, waiting up to `search_pending_for` for another
    /// healthy replica to appear so this replica's keys have a successor.
    pub async fn deregister(&self) -> Result<()> {
        self.kv
            .upsert_replica(self.desc(ReplicaState::Leaving))
            .await?;

        let deadline = tokio::time::Instant::now() + self.cfg.search_pending_for;
        loop {
            let ring = self.kv.ring().await?;
            let successor = ring
                .replicas
                .values()
                .any(|r| r.addr != self.cfg.addr && r.state == ReplicaState::Active);
            if successor {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    addr = %self.cfg.addr,
                    "No successor replica found before deadline, leaving anyway"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        self.kv.remove_replica(&self.cfg.addr).await?;
        tracing::info!(addr = %self.cfg.addr, "Replica deregistered from ring");
        Ok(())
    }
}
