//! Tenant evaluator lifecycle.

use crate::error::{EvalError, Result};
use crate::group::{EvalContext, Group, GroupSnapshot};
use crate::metrics::EvalMetrics;
use crate::{AlertSink, Pusher, QueryFunc};
use chrono::{DateTime, Utc};
use oxrule_common::rules::RuleFile;
use oxrule_common::shard::fnv1a_32;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

struct GroupEntry {
    group: Arc<Mutex<Group>>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// One tenant's running rule groups.
///
/// Created by the registry on a tenant's first appearance; [`update`]d in
/// place when the tenant's rule files change; [`stop`]ped when the tenant
/// disappears from a poll. Alert state is carried across updates so a rule
/// reload does not reset Pending/Firing timers.
///
/// [`update`]: TenantEvaluator::update
/// [`stop`]: TenantEvaluator::stop
pub struct TenantEvaluator {
    tenant: String,
    ctx: Arc<EvalContext>,
    groups: Mutex<HashMap<String, GroupEntry>>,
    last_update: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl TenantEvaluator {
    pub fn new(
        tenant: &str,
        query: Arc<dyn QueryFunc>,
        pusher: Arc<dyn Pusher>,
        sink: Arc<dyn AlertSink>,
        registry: &prometheus::Registry,
    ) -> Result<Self> {
        let metrics = EvalMetrics::new(registry)?;
        Ok(Self {
            tenant: tenant.to_string(),
            ctx: Arc::new(EvalContext {
                tenant: tenant.to_string(),
                query,
                pusher,
                sink,
                metrics,
            }),
            groups: Mutex::new(HashMap::new()),
            last_update: std::sync::Mutex::new(None),
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reloads the evaluator from the given rule files.
    ///
    /// All running groups are stopped and rebuilt from the new file set;
    /// alerting-rule state survives for rules that keep their group and
    /// alert name.
    pub async fn update(&self, interval: Duration, files: &[PathBuf]) -> Result<()> {
        let mut desired: Vec<(PathBuf, oxrule_common::rules::RuleGroup)> = Vec::new();
        for file in files {
            let content = std::fs::read_to_string(file).map_err(|source| EvalError::Io {
                path: file.clone(),
                source,
            })?;
            let parsed: RuleFile =
                serde_json::from_str(&content).map_err(|source| EvalError::Parse {
                    path: file.clone(),
                    source,
                })?;
            for group in parsed.groups {
                desired.push((file.clone(), group));
            }
        }

        let mut map = self.groups.lock().await;

        // Stop everything, keeping alert state keyed by group + alert name.
        let mut carried = HashMap::new();
        for (key, entry) in map.drain() {
            let _ = entry.shutdown.send(true);
            entry.handle.abort();
            let _ = entry.handle.await;
            let mut group = entry.group.lock().await;
            for rule in &mut group.rules {
                if let Some(tracker) = rule.tracker.take() {
                    carried.insert((key.clone(), rule.rule.name().to_string()), tracker);
                }
            }
        }

        for (file, rule_group) in desired {
            let key = group_key(&file, &rule_group.name);
            let mut group = Group::new(file, rule_group, interval);
            for rule in &mut group.rules {
                if let Some(old) = carried.remove(&(key.clone(), rule.rule.name().to_string())) {
                    if let Some(tracker) = rule.tracker.as_mut() {
                        tracker.adopt_state(old);
                    }
                }
            }
            let entry = self.spawn_group(&key, group);
            map.insert(key, entry);
        }

        *self.last_update.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        tracing::debug!(
            tenant = %self.tenant,
            groups = map.len(),
            "Evaluator updated"
        );
        Ok(())
    }

    fn spawn_group(&self, key: &str, group: Group) -> GroupEntry {
        // tokio::time::interval panics on a zero period.
        let interval = group.interval.max(Duration::from_millis(10));
        // Spread a tenant's groups across their interval instead of
        // evaluating them all at the same instant.
        let stagger = Duration::from_millis(
            u64::from(fnv1a_32(key.as_bytes())) % (interval.as_millis().max(1) as u64),
        );
        let (shutdown, mut rx) = watch::channel(false);
        let group = Arc::new(Mutex::new(group));
        let task_group = group.clone();
        let ctx = self.ctx.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = rx.changed() => return,
                _ = tokio::time::sleep(stagger) => {}
            }
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = rx.changed() => return,
                    _ = tick.tick() => {
                        let mut group = task_group.lock().await;
                        group.evaluate(&ctx).await;
                    }
                }
            }
        });

        GroupEntry {
            group,
            shutdown,
            handle,
        }
    }

    /// Stops all group tasks and waits for them to exit.
    pub async fn stop(&self) {
        let mut map = self.groups.lock().await;
        for (_, entry) in map.drain() {
            let _ = entry.shutdown.send(true);
            entry.handle.abort();
            let _ = entry.handle.await;
        }
        tracing::debug!(tenant = %self.tenant, "Evaluator stopped");
    }

    /// Snapshot of every running group, ordered by file then group name.
    pub async fn rule_groups(&self) -> Vec<GroupSnapshot> {
        let map = self.groups.lock().await;
        let mut snapshots = Vec::with_capacity(map.len());
        for entry in map.values() {
            snapshots.push(entry.group.lock().await.snapshot());
        }
        snapshots.sort_by(|a, b| (&a.file, &a.name).cmp(&(&b.file, &b.name)));
        snapshots
    }
}

fn group_key(file: &Path, group: &str) -> String {
    format!("{};{}", file.display(), group)
}
