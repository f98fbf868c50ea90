//! Rule file mapper.
//!
//! Translates a tenant's in-memory rule groups into on-disk rule files
//! under `<root>/<tenant>/<namespace>` and reports whether anything
//! changed since the previous call. Determinism is load-bearing here: the
//! `changed` signal drives evaluator reloads, so identical input must
//! produce identical bytes and stable paths.

use anyhow::Context;
use oxrule_common::rules::{RuleFile, RuleGroup};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

pub struct RuleMapper {
    root: PathBuf,
    /// tenant -> namespace -> last written content.
    state: HashMap<String, HashMap<String, Vec<u8>>>,
}

impl RuleMapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: HashMap::new(),
        }
    }

    /// Directory holding one tenant's rule files.
    pub fn tenant_dir(&self, tenant: &str) -> PathBuf {
        self.root.join(tenant)
    }

    /// Writes the tenant's groups to disk, one file per namespace, and
    /// removes files for namespaces no longer present.
    ///
    /// Returns whether the on-disk state changed, plus the full current
    /// file set (changed or not) for the evaluator to load.
    pub fn map_rules(
        &mut self,
        tenant: &str,
        groups: &[RuleGroup],
    ) -> anyhow::Result<(bool, Vec<PathBuf>)> {
        oxrule_common::tenant::validate(tenant)?;

        let mut by_namespace: BTreeMap<String, Vec<RuleGroup>> = BTreeMap::new();
        for group in groups {
            oxrule_common::tenant::validate(&group.namespace)
                .with_context(|| format!("invalid namespace {:?}", group.namespace))?;
            by_namespace
                .entry(group.namespace.clone())
                .or_default()
                .push(group.clone());
        }
        for namespace_groups in by_namespace.values_mut() {
            namespace_groups.sort_by(|a, b| a.name.cmp(&b.name));
        }

        let dir = self.tenant_dir(tenant);
        let cache = self.state.entry(tenant.to_string()).or_default();
        let mut changed = false;
        let mut files = Vec::with_capacity(by_namespace.len());

        for (namespace, namespace_groups) in &by_namespace {
            let path = dir.join(namespace);
            let content = serde_json::to_vec_pretty(&RuleFile {
                groups: namespace_groups.clone(),
            })?;

            let unchanged =
                cache.get(namespace).is_some_and(|prev| prev == &content) && path.is_file();
            if !unchanged {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("create rule dir {}", dir.display()))?;
                // Atomic per file: temp write then rename.
                let tmp = dir.join(format!(".{namespace}.tmp"));
                std::fs::write(&tmp, &content)
                    .with_context(|| format!("write rule file {}", tmp.display()))?;
                std::fs::rename(&tmp, &path)
                    .with_context(|| format!("rename rule file into {}", path.display()))?;
                cache.insert(namespace.clone(), content);
                changed = true;
                tracing::debug!(tenant = %tenant, namespace = %namespace, "Rule file written");
            }
            files.push(path);
        }

        // Remove files for namespaces that no longer exist.
        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if by_namespace.contains_key(&name) {
                    continue;
                }
                std::fs::remove_file(entry.path())
                    .with_context(|| format!("remove stale rule file {name}"))?;
                cache.remove(&name);
                changed = true;
                tracing::debug!(tenant = %tenant, namespace = %name, "Stale rule file removed");
            }
        }

        Ok((changed, files))
    }
}
