//! Rule storage backends.

use async_trait::async_trait;
use oxrule_common::rules::{RuleFile, RuleGroup};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Source of truth for every tenant's rule groups.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Fetches all rule groups for all tenants. The result is treated as
    /// authoritative for the moment of the fetch.
    async fn list_all_rule_groups(&self) -> anyhow::Result<HashMap<String, Vec<RuleGroup>>>;
}

/// In-memory store for embedded use and tests.
#[derive(Default)]
pub struct InMemoryRuleStore {
    inner: RwLock<HashMap<String, Vec<RuleGroup>>>,
    failing: AtomicBool,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rules(&self, tenant: &str, groups: Vec<RuleGroup>) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tenant.to_string(), groups);
    }

    pub fn remove_tenant(&self, tenant: &str) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tenant);
    }

    /// Makes subsequent polls fail, to exercise storage-outage paths.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn list_all_rule_groups(&self) -> anyhow::Result<HashMap<String, Vec<RuleGroup>>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("rule store unavailable");
        }
        Ok(self.inner.read().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// Store backed by a local directory laid out as
/// `<dir>/<tenant>/<namespace>`, one rule file per namespace.
pub struct LocalRuleStore {
    dir: PathBuf,
}

impl LocalRuleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RuleStore for LocalRuleStore {
    async fn list_all_rule_groups(&self) -> anyhow::Result<HashMap<String, Vec<RuleGroup>>> {
        let mut all: HashMap<String, Vec<RuleGroup>> = HashMap::new();
        if !self.dir.is_dir() {
            return Ok(all);
        }

        for tenant_entry in std::fs::read_dir(&self.dir)? {
            let tenant_entry = tenant_entry?;
            if !tenant_entry.file_type()?.is_dir() {
                continue;
            }
            let tenant = tenant_entry.file_name().to_string_lossy().into_owned();
            if oxrule_common::tenant::validate(&tenant).is_err() {
                tracing::warn!(tenant = %tenant, "Skipping rule directory with invalid tenant name");
                continue;
            }

            let mut groups: Vec<RuleGroup> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for ns_entry in std::fs::read_dir(tenant_entry.path())? {
                let ns_entry = ns_entry?;
                if !ns_entry.file_type()?.is_file() {
                    continue;
                }
                let namespace = ns_entry.file_name().to_string_lossy().into_owned();
                let content = std::fs::read_to_string(ns_entry.path())?;
                let file: RuleFile = serde_json::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("parse {}: {e}", ns_entry.path().display()))?;

                for mut group in file.groups {
                    // The path is authoritative for tenant and namespace.
                    group.tenant = tenant.clone();
                    group.namespace = namespace.clone();
                    if !seen.insert(group.identity()) {
                        tracing::warn!(
                            tenant = %tenant,
                            namespace = %namespace,
                            group = %group.name,
                            "Duplicate rule group identity, keeping the first"
                        );
                        continue;
                    }
                    groups.push(group);
                }
            }
            groups.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
            all.insert(tenant, groups);
        }
        Ok(all)
    }
}
