use oxrule_notify::{ApiVersion, NotifierConfig, TargetConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Ruler configuration surface.
#[derive(Debug, Clone, Deserialize)]
pub struct RulerConfig {
    /// Base URL of the alerts return path, embedded in alert generator URLs.
    #[serde(default)]
    pub external_url: String,
    /// Default rule evaluation period.
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,
    /// How frequently to poll for rule changes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// File path under which materialised rule files are stored.
    #[serde(default = "default_rule_path")]
    pub rule_path: PathBuf,

    /// Static Alertmanager base URL, or the SRV record when discovery is on.
    #[serde(default)]
    pub alertmanager_url: Option<String>,
    /// Use DNS SRV records to discover Alertmanager hosts.
    #[serde(default)]
    pub alertmanager_discovery: bool,
    /// How long to wait between refreshing discovered Alertmanager hosts.
    #[serde(default = "default_alertmanager_refresh_interval_secs")]
    pub alertmanager_refresh_interval_secs: u64,
    /// Send notifications with the Alertmanager V2 API.
    #[serde(default)]
    pub alertmanager_use_v2: bool,
    /// Capacity of the per-tenant notification queue.
    #[serde(default = "default_notification_queue_capacity")]
    pub notification_queue_capacity: usize,
    /// HTTP timeout when sending notifications.
    #[serde(default = "default_notification_timeout_secs")]
    pub notification_timeout_secs: u64,

    /// Distribute rule group evaluation using the ring backend.
    #[serde(default)]
    pub enable_sharding: bool,
    /// Time to spend searching for a pending successor when shutting down.
    #[serde(default = "default_search_pending_for_secs")]
    pub search_pending_for_secs: u64,
    /// Period with which to attempt to flush rule groups.
    #[serde(default = "default_flush_period_secs")]
    pub flush_period_secs: u64,
    /// Enable the administrative rule CRUD API.
    #[serde(default)]
    pub enable_api: bool,

    // Deprecated knobs, accepted so old configs keep parsing. They have
    // no effect; see warn_deprecated().
    #[serde(default)]
    pub client_timeout_secs: Option<u64>,
    #[serde(default)]
    pub group_timeout_secs: Option<u64>,
    #[serde(default)]
    pub num_workers: Option<usize>,
}

impl Default for RulerConfig {
    fn default() -> Self {
        Self {
            external_url: String::new(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            rule_path: default_rule_path(),
            alertmanager_url: None,
            alertmanager_discovery: false,
            alertmanager_refresh_interval_secs: default_alertmanager_refresh_interval_secs(),
            alertmanager_use_v2: false,
            notification_queue_capacity: default_notification_queue_capacity(),
            notification_timeout_secs: default_notification_timeout_secs(),
            enable_sharding: false,
            search_pending_for_secs: default_search_pending_for_secs(),
            flush_period_secs: default_flush_period_secs(),
            enable_api: false,
            client_timeout_secs: None,
            group_timeout_secs: None,
            num_workers: None,
        }
    }
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_rule_path() -> PathBuf {
    PathBuf::from("/rules")
}

fn default_alertmanager_refresh_interval_secs() -> u64 {
    60
}

fn default_notification_queue_capacity() -> usize {
    10_000
}

fn default_notification_timeout_secs() -> u64 {
    10
}

fn default_search_pending_for_secs() -> u64 {
    300
}

fn default_flush_period_secs() -> u64 {
    60
}

impl RulerConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn search_pending_for(&self) -> Duration {
        Duration::from_secs(self.search_pending_for_secs)
    }

    /// Logs a warning for every deprecated knob present in the config.
    pub fn warn_deprecated(&self) {
        if self.client_timeout_secs.is_some() {
            tracing::warn!("client_timeout_secs is deprecated and has no effect");
        }
        if self.group_timeout_secs.is_some() {
            tracing::warn!("group_timeout_secs is deprecated and has no effect");
        }
        if self.num_workers.is_some() {
            tracing::warn!(
                "num_workers is deprecated and has no effect; use sharding for concurrency"
            );
        }
    }

    /// Builds the per-tenant notifier configuration. Fails when discovery
    /// is enabled without an SRV record to resolve.
    pub fn notifier_config(&self) -> anyhow::Result<NotifierConfig> {
        let targets = if self.alertmanager_discovery {
            let record = self.alertmanager_url.clone().ok_or_else(|| {
                anyhow::anyhow!("alertmanager_discovery requires alertmanager_url")
            })?;
            TargetConfig::DnsSrv {
                record,
                refresh: Duration::from_secs(self.alertmanager_refresh_interval_secs),
            }
        } else {
            TargetConfig::Static(self.alertmanager_url.clone().into_iter().collect())
        };

        Ok(NotifierConfig {
            queue_capacity: self.notification_queue_capacity,
            timeout: Duration::from_secs(self.notification_timeout_secs),
            api_version: if self.alertmanager_use_v2 {
                ApiVersion::V2
            } else {
                ApiVersion::V1
            },
            targets,
        })
    }
}
