//! Per-tenant alert notification pipeline.
//!
//! Each tenant gets one [`notifier::TenantNotifier`]: a bounded queue of
//! pending alerts and a background delivery loop POSTing batches to the
//! configured Alertmanager receivers. The queue drops its oldest entries
//! on overflow so a slow receiver cannot wedge an evaluator. Every
//! outbound request carries the tenant header and runs under a fresh root
//! tracing span.

pub mod discovery;
pub mod error;
pub mod notifier;
pub mod queue;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use error::{NotifyError, Result};
pub use notifier::TenantNotifier;

/// One alert in Alertmanager wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierAlert {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL")]
    pub generator_url: String,
}

/// Alertmanager API generation; selects the alerts endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn alerts_path(self) -> &'static str {
        match self {
            ApiVersion::V1 => "/api/v1/alerts",
            ApiVersion::V2 => "/api/v2/alerts",
        }
    }
}

/// Where notifications go.
#[derive(Debug, Clone)]
pub enum TargetConfig {
    /// Fixed receiver base URLs (e.g. `http://alertmanager:9093`).
    Static(Vec<String>),
    /// DNS-SRV discovered receivers, re-resolved on an interval.
    DnsSrv { record: String, refresh: Duration },
}

/// Notifier construction parameters, applied exactly once per tenant.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub queue_capacity: usize,
    pub timeout: Duration,
    pub api_version: ApiVersion,
    pub targets: TargetConfig,
}

/// Expression deep-link appended to the external URL in `generatorURL`.
pub fn table_link_for_expression(expr: &str) -> String {
    format!("/graph?g0.expr={}&g0.tab=1", urlencoding::encode(expr))
}
