//! Service metrics and per-tenant metric registries.

use prometheus::proto::MetricFamily;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::collections::HashMap;
use std::sync::Mutex;

/// Namespace prefix for every metric this service exports.
pub const METRICS_NAMESPACE: &str = "oxrule";

pub struct RulerMetrics {
    /// Errors hit while checking the ring for rule group ownership.
    pub ring_check_errors: IntCounter,
    /// Config updates applied, per tenant.
    pub config_updates: IntCounterVec,
}

impl RulerMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let ring_check_errors = IntCounter::with_opts(
            Opts::new(
                "ruler_ring_check_errors_total",
                "Number of errors that have occurred when checking the ring for ownership",
            )
            .namespace(METRICS_NAMESPACE),
        )?;
        registry.register(Box::new(ring_check_errors.clone()))?;

        let config_updates = IntCounterVec::new(
            Opts::new(
                "ruler_config_updates_total",
                "Total number of config updates triggered by a tenant",
            )
            .namespace(METRICS_NAMESPACE),
            &["user"],
        )?;
        registry.register(Box::new(config_updates.clone()))?;

        Ok(Self {
            ring_check_errors,
            config_updates,
        })
    }
}

/// Per-tenant metric registries.
///
/// Each evaluator gets a registry wrapped with a `{user=<tenant>}` label
/// and the service namespace prefix, so tenant metric cardinality stays
/// visible and consistent. A registry lives as long as its evaluator.
#[derive(Default)]
pub struct TenantRegistries {
    inner: Mutex<HashMap<String, Registry>>,
}

impl TenantRegistries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tenant's registry, creating it on first use.
    pub fn for_tenant(&self, tenant: &str) -> prometheus::Result<Registry> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(registry) = inner.get(tenant) {
            return Ok(registry.clone());
        }
        let registry = Registry::new_custom(
            Some(METRICS_NAMESPACE.to_string()),
            Some(HashMap::from([("user".to_string(), tenant.to_string())])),
        )?;
        inner.insert(tenant.to_string(), registry.clone());
        Ok(registry)
    }

    /// Forgets a tenant's registry; the next evaluator starts fresh.
    pub fn remove(&self, tenant: &str) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tenant);
    }

    /// Gathers every tenant's metric families, for exposition alongside
    /// the service registry.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut families = Vec::new();
        for registry in inner.values() {
            families.extend(registry.gather());
        }
        families
    }
}
