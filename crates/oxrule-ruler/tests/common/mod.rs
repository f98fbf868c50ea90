#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use oxrule_common::rules::{Rule, RuleGroup};
use oxrule_eval::{Pusher, QueryFunc, Sample};
use oxrule_ring::{InMemoryKv, Lifecycler, LifecyclerConfig, ReplicaDesc, ReplicaState, Ring, RingError};
use oxrule_ruler::store::InMemoryRuleStore;
use oxrule_ruler::{Ruler, RulerConfig, Sharding};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Ring double with scripted ownership and failure injection.
pub struct ScriptedRing {
    self_addr: String,
    owners: Mutex<HashMap<u32, String>>,
    replicas: Mutex<Vec<String>>,
    calls: AtomicUsize,
    fail_from_call: Mutex<Option<usize>>,
}

impl ScriptedRing {
    pub fn new(self_addr: &str) -> Self {
        Self {
            self_addr: self_addr.to_string(),
            owners: Mutex::new(HashMap::new()),
            replicas: Mutex::new(vec![self_addr.to_string()]),
            calls: AtomicUsize::new(0),
            fail_from_call: Mutex::new(None),
        }
    }

    /// Assigns a specific owner for one shard key; unassigned keys belong
    /// to this replica.
    pub fn set_owner(&self, key: u32, addr: &str) {
        self.owners.lock().unwrap().insert(key, addr.to_string());
    }

    pub fn set_replicas(&self, addrs: &[String]) {
        *self.replicas.lock().unwrap() = addrs.to_vec();
    }

    /// Makes `owner_of` fail from the n-th call (1-based) onwards.
    pub fn fail_from_call(&self, n: usize) {
        self.calls.store(0, Ordering::SeqCst);
        *self.fail_from_call.lock().unwrap() = Some(n);
    }

    pub fn heal(&self) {
        *self.fail_from_call.lock().unwrap() = None;
    }

    fn desc(addr: &str) -> ReplicaDesc {
        ReplicaDesc {
            addr: addr.to_string(),
            tokens: Vec::new(),
            state: ReplicaState::Active,
            heartbeat: Utc::now(),
        }
    }
}

#[async_trait]
impl Ring for ScriptedRing {
    async fn owner_of(&self, key: u32) -> Result<ReplicaDesc, RingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = *self.fail_from_call.lock().unwrap() {
            if call >= n {
                return Err(RingError::Kv("scripted ring outage".to_string()));
            }
        }
        let owners = self.owners.lock().unwrap();
        let addr = owners.get(&key).cloned().unwrap_or_else(|| self.self_addr.clone());
        Ok(Self::desc(&addr))
    }

    async fn all_replicas(&self) -> Result<Vec<ReplicaDesc>, RingError> {
        let mut addrs = self.replicas.lock().unwrap().clone();
        addrs.sort();
        Ok(addrs.iter().map(|a| Self::desc(a)).collect())
    }
}

/// Query double returning a fixed result set.
pub struct StaticQuery {
    samples: Vec<Sample>,
}

impl StaticQuery {
    pub fn empty() -> Self {
        Self { samples: vec![] }
    }
}

#[async_trait]
impl QueryFunc for StaticQuery {
    async fn query(
        &self,
        _: &str,
        _: &str,
        _: chrono::DateTime<Utc>,
    ) -> anyhow::Result<Vec<Sample>> {
        Ok(self.samples.clone())
    }
}

/// Pusher double recording every write.
#[derive(Default)]
pub struct RecordingPusher {
    pub pushed: Mutex<Vec<(String, Vec<Sample>)>>,
}

#[async_trait]
impl Pusher for RecordingPusher {
    async fn push(&self, tenant: &str, samples: Vec<Sample>) -> anyhow::Result<()> {
        self.pushed
            .lock()
            .unwrap()
            .push((tenant.to_string(), samples));
        Ok(())
    }
}

pub struct TestContext {
    pub tmp: TempDir,
    pub store: Arc<InMemoryRuleStore>,
    pub ring: Arc<ScriptedRing>,
    pub pusher: Arc<RecordingPusher>,
    pub registry: prometheus::Registry,
    pub ruler: Arc<Ruler>,
}

pub const SELF_ADDR: &str = "127.0.0.1:9095";

/// Builds a ruler around in-memory doubles. The poll and evaluation
/// intervals are long; tests drive sync passes explicitly.
pub fn build_test_ruler(enable_sharding: bool) -> TestContext {
    build_test_ruler_at(enable_sharding, SELF_ADDR)
}

pub fn build_test_ruler_at(enable_sharding: bool, self_addr: &str) -> TestContext {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(InMemoryRuleStore::new());
    let ring = Arc::new(ScriptedRing::new(self_addr));
    let pusher = Arc::new(RecordingPusher::default());
    let registry = prometheus::Registry::new();

    let cfg = RulerConfig {
        rule_path: tmp.path().join("rules"),
        poll_interval_secs: 3600,
        evaluation_interval_secs: 3600,
        enable_sharding,
        ..RulerConfig::default()
    };

    let sharding = enable_sharding.then(|| Sharding {
        ring: ring.clone() as Arc<dyn Ring>,
        lifecycler: Arc::new(Lifecycler::new(
            LifecyclerConfig {
                addr: self_addr.to_string(),
                num_tokens: 4,
                heartbeat_period: Duration::from_secs(5),
                search_pending_for: Duration::from_millis(10),
            },
            Arc::new(InMemoryKv::new()),
        )),
    });

    let ruler = Arc::new(
        Ruler::new(
            cfg,
            store.clone(),
            Arc::new(StaticQuery::empty()),
            pusher.clone(),
            sharding,
            &registry,
        )
        .expect("build ruler"),
    );

    TestContext {
        tmp,
        store,
        ring,
        pusher,
        registry,
        ruler,
    }
}

pub fn group(tenant: &str, namespace: &str, name: &str, expr: &str) -> RuleGroup {
    RuleGroup {
        tenant: tenant.into(),
        namespace: namespace.into(),
        name: name.into(),
        interval_secs: None,
        rules: vec![Rule::Recording {
            record: format!("{name}:record"),
            expr: expr.into(),
            labels: BTreeMap::new(),
        }],
    }
}

pub fn config_updates(ctx: &TestContext, tenant: &str) -> u64 {
    ctx.ruler
        .metrics()
        .config_updates
        .with_label_values(&[tenant])
        .get()
}
