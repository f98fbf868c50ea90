//! The ruler: sync loop, evaluator registry and notifier pool.

use crate::config::RulerConfig;
use crate::mapper::RuleMapper;
use crate::metrics::{RulerMetrics, TenantRegistries};
use crate::sink::NotifierSink;
use crate::store::RuleStore;
use anyhow::Context;
use oxrule_common::proto;
use oxrule_common::shard::shard_key;
use oxrule_common::tenant;
use oxrule_eval::{Pusher, QueryFunc, TenantEvaluator};
use oxrule_notify::{NotifierConfig, TenantNotifier};
use oxrule_ring::{Lifecycler, Ring};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;

/// Ring backend handles, present when sharding is enabled.
pub struct Sharding {
    pub ring: Arc<dyn Ring>,
    pub lifecycler: Arc<Lifecycler>,
}

/// Registry state: the mapper and the evaluator map share one mutex so a
/// tenant's map-files-then-update sequence is atomic with respect to
/// concurrent polls.
struct SyncState {
    mapper: RuleMapper,
    evaluators: HashMap<String, Arc<TenantEvaluator>>,
}

/// Multi-tenant rule evaluation service.
///
/// Lock ordering: the registry mutex (`sync_state`) may be held while
/// taking the notifier pool mutex, never the reverse.
pub struct Ruler {
    cfg: RulerConfig,
    store: Arc<dyn RuleStore>,
    query: Arc<dyn QueryFunc>,
    pusher: Arc<dyn Pusher>,
    sharding: Option<Sharding>,
    notifier_cfg: NotifierConfig,
    sync_state: tokio::sync::Mutex<SyncState>,
    notifiers: std::sync::Mutex<HashMap<String, Arc<TenantNotifier>>>,
    metrics: RulerMetrics,
    tenant_registries: TenantRegistries,
}

impl Ruler {
    pub fn new(
        cfg: RulerConfig,
        store: Arc<dyn RuleStore>,
        query: Arc<dyn QueryFunc>,
        pusher: Arc<dyn Pusher>,
        sharding: Option<Sharding>,
        registry: &prometheus::Registry,
    ) -> anyhow::Result<Self> {
        if cfg.enable_sharding && sharding.is_none() {
            anyhow::bail!("sharding is enabled but no ring backend was provided");
        }
        cfg.warn_deprecated();
        let notifier_cfg = cfg.notifier_config()?;
        let metrics = RulerMetrics::new(registry)?;
        let mapper = RuleMapper::new(cfg.rule_path.clone());

        Ok(Self {
            cfg,
            store,
            query,
            pusher,
            sharding,
            notifier_cfg,
            sync_state: tokio::sync::Mutex::new(SyncState {
                mapper,
                evaluators: HashMap::new(),
            }),
            notifiers: std::sync::Mutex::new(HashMap::new()),
            metrics,
            tenant_registries: TenantRegistries::new(),
        })
    }

    pub fn config(&self) -> &RulerConfig {
        &self.cfg
    }

    pub fn metrics(&self) -> &RulerMetrics {
        &self.metrics
    }

    pub fn tenant_registries(&self) -> &TenantRegistries {
        &self.tenant_registries
    }

    pub fn sharding_enabled(&self) -> bool {
        self.cfg.enable_sharding
    }

    pub fn ring(&self) -> Option<Arc<dyn Ring>> {
        self.sharding.as_ref().map(|s| s.ring.clone())
    }

    /// Tenants with a live evaluator.
    pub async fn active_tenants(&self) -> Vec<String> {
        let state = self.sync_state.lock().await;
        let mut tenants: Vec<String> = state.evaluators.keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// The tenant's notifier, if one was ever created.
    pub fn notifier(&self, tenant: &str) -> Option<Arc<TenantNotifier>> {
        self.notifiers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(tenant)
            .cloned()
    }

    /// Runs the sync loop: once immediately, then on every poll tick,
    /// until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Ruler up and running");
        let mut tick = interval(self.cfg.poll_interval());
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tick.tick() => self.sync_rules().await,
            }
        }
    }

    /// One sync pass: poll the store, shard-filter, reconcile evaluators.
    pub async fn sync_rules(&self) {
        let configs = match self.store.list_all_rule_groups().await {
            Ok(configs) => configs,
            Err(e) => {
                tracing::error!(error = %e, "Unable to poll for rules");
                return;
            }
        };

        // Shard-filter every tenant before touching any state. A ring
        // failure aborts the whole tick: acting on partial ownership data
        // could start evaluating groups that belong to another replica.
        let mut filtered: HashMap<&str, Vec<oxrule_common::rules::RuleGroup>> =
            HashMap::with_capacity(configs.len());
        for (tenant, groups) in &configs {
            if self.cfg.enable_sharding {
                let mut owned = Vec::new();
                for group in groups {
                    let key = shard_key(tenant, &group.namespace, &group.name);
                    match self.owns_rule(key).await {
                        Ok(true) => owned.push(group.clone()),
                        Ok(false) => {}
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                "Unable to verify rule group ownership, aborting sync until the next poll"
                            );
                            return;
                        }
                    }
                }
                filtered.insert(tenant.as_str(), owned);
            } else {
                filtered.insert(tenant.as_str(), groups.clone());
            }
        }

        for (tenant, groups) in filtered {
            if let Err(e) = self.sync_tenant(tenant, &groups).await {
                tracing::error!(tenant = %tenant, error = %e, "Unable to sync rules for tenant");
            }
        }

        // Tenants gone from the poll lose their evaluator; the notifier
        // stays so already queued alerts still ship.
        let departed = {
            let mut state = self.sync_state.lock().await;
            let gone: Vec<String> = state
                .evaluators
                .keys()
                .filter(|t| !configs.contains_key(*t))
                .cloned()
                .collect();
            gone.into_iter()
                .filter_map(|t| state.evaluators.remove(&t).map(|ev| (t, ev)))
                .collect::<Vec<_>>()
        };
        for (tenant, evaluator) in departed {
            tracing::info!(tenant = %tenant, "Deleting evaluator for departed tenant");
            self.tenant_registries.remove(&tenant);
            tokio::spawn(async move { evaluator.stop().await });
        }
    }

    /// Whether this replica owns the given shard key. Always true with
    /// sharding disabled.
    async fn owns_rule(&self, key: u32) -> anyhow::Result<bool> {
        let Some(sharding) = &self.sharding else {
            return Ok(true);
        };
        match sharding.ring.owner_of(key).await {
            Ok(owner) => {
                let owned = owner.addr == sharding.lifecycler.addr();
                tracing::debug!(
                    key,
                    owner = %owner.addr,
                    addr = %sharding.lifecycler.addr(),
                    owned,
                    "Checked rule group ownership"
                );
                Ok(owned)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error reading ring to verify rule group ownership");
                self.metrics.ring_check_errors.inc();
                Err(e.into())
            }
        }
    }

    /// Maps one tenant's groups to disk and, when anything changed,
    /// creates or updates the tenant's evaluator.
    async fn sync_tenant(
        &self,
        tenant: &str,
        groups: &[oxrule_common::rules::RuleGroup],
    ) -> anyhow::Result<()> {
        let mut state = self.sync_state.lock().await;

        let (changed, files) = state.mapper.map_rules(tenant, groups)?;
        if !changed {
            return Ok(());
        }

        tracing::debug!(tenant = %tenant, files = files.len(), "Updating rules");
        self.metrics.config_updates.with_label_values(&[tenant]).inc();

        let evaluator = match state.evaluators.get(tenant) {
            Some(evaluator) => evaluator.clone(),
            None => {
                let evaluator = Arc::new(self.new_evaluator(tenant)?);
                state.evaluators.insert(tenant.to_string(), evaluator.clone());
                evaluator
            }
        };
        evaluator
            .update(self.cfg.evaluation_interval(), &files)
            .await
            .context("update evaluator")?;
        Ok(())
    }

    fn new_evaluator(&self, tenant: &str) -> anyhow::Result<TenantEvaluator> {
        let notifier = self.get_or_create_notifier(tenant)?;
        let sink = Arc::new(NotifierSink::new(notifier, self.cfg.external_url.clone()));
        let registry = self.tenant_registries.for_tenant(tenant)?;
        TenantEvaluator::new(tenant, self.query.clone(), self.pusher.clone(), sink, &registry)
            .map_err(Into::into)
    }

    /// Lazily creates the tenant's notifier. Called under the registry
    /// mutex; takes the pool mutex only briefly.
    fn get_or_create_notifier(&self, tenant: &str) -> anyhow::Result<Arc<TenantNotifier>> {
        let mut notifiers = self.notifiers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(notifier) = notifiers.get(tenant) {
            return Ok(notifier.clone());
        }
        let notifier = Arc::new(TenantNotifier::new(tenant, self.notifier_cfg.clone())?);
        notifiers.insert(tenant.to_string(), notifier.clone());
        tracing::debug!(tenant = %tenant, "Created tenant notifier");
        Ok(notifier)
    }

    /// Running rules for one tenant: this replica only, or the union
    /// across the ring when sharding is enabled.
    pub async fn get_rules(&self, tenant: &str) -> anyhow::Result<Vec<proto::RuleGroupDesc>> {
        if self.cfg.enable_sharding {
            self.sharded_rules(tenant).await
        } else {
            Ok(self.local_rules(tenant).await)
        }
    }

    /// Snapshot of this replica's running rules for one tenant.
    pub async fn local_rules(&self, tenant: &str) -> Vec<proto::RuleGroupDesc> {
        let evaluator = {
            let state = self.sync_state.lock().await;
            state.evaluators.get(tenant).cloned()
        };
        let Some(evaluator) = evaluator else {
            return Vec::new();
        };

        let prefix = self.cfg.rule_path.join(tenant);
        evaluator
            .rule_groups()
            .await
            .into_iter()
            .map(|snapshot| crate::inspection::group_desc(tenant, &prefix, snapshot))
            .collect()
    }

    /// Union of every ring replica's running rules for one tenant, in
    /// ring enumeration order. Fails closed on the first peer error: a
    /// partial view cannot be told apart from "not my shard".
    async fn sharded_rules(&self, tenant: &str) -> anyhow::Result<Vec<proto::RuleGroupDesc>> {
        let sharding = self
            .sharding
            .as_ref()
            .context("sharded rule listing requires a ring backend")?;
        let replicas = sharding.ring.all_replicas().await?;

        let mut groups = Vec::with_capacity(replicas.len());
        // TODO: pool peer channels and close them on shutdown instead of
        // dialing every replica on every call.
        for replica in replicas {
            let mut client =
                proto::ruler_service_client::RulerServiceClient::connect(format!(
                    "http://{}",
                    replica.addr
                ))
                .await
                .with_context(|| format!("connect to ruler {}", replica.addr))?;

            let mut request = tonic::Request::new(proto::RulesRequest {});
            tenant::inject_grpc(tenant, &mut request)?;
            let response = client
                .rules(request)
                .await
                .with_context(|| format!("retrieve rules from ruler {}", replica.addr))?;
            groups.extend(response.into_inner().groups);
        }
        Ok(groups)
    }

    /// Ordered shutdown: notifiers first so queued alerts still ship,
    /// then evaluators, then the ring hand-off. Errors are logged, never
    /// propagated; shutdown always completes.
    pub async fn stop(&self) {
        let notifiers: Vec<Arc<TenantNotifier>> = {
            let mut map = self.notifiers.lock().unwrap_or_else(|e| e.into_inner());
            map.drain().map(|(_, n)| n).collect()
        };
        tracing::info!(count = notifiers.len(), "Stopping tenant notifiers");
        futures::future::join_all(notifiers.iter().map(|n| n.stop())).await;

        let evaluators: Vec<Arc<TenantEvaluator>> = {
            let mut state = self.sync_state.lock().await;
            state.evaluators.drain().map(|(_, ev)| ev).collect()
        };
        tracing::info!(count = evaluators.len(), "Stopping tenant evaluators");
        futures::future::join_all(evaluators.iter().map(|ev| ev.stop())).await;

        if let Some(sharding) = &self.sharding {
            if let Err(e) = sharding.lifecycler.deregister().await {
                tracing::error!(error = %e, "Failed to leave the ring");
            }
        }
        tracing::info!("Ruler stopped");
    }
}
