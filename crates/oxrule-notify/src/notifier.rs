//! Per-tenant notifier: queue plus background delivery loop.

use crate::discovery::resolve_srv;
use crate::error::{NotifyError, Result};
use crate::queue::AlertQueue;
use crate::{NotifierAlert, NotifierConfig, TargetConfig};
use hickory_resolver::TokioResolver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Alerts sent per outbound request at most.
const MAX_BATCH: usize = 64;

/// One tenant's notification pipeline.
///
/// Created lazily on the tenant's first evaluator construction and kept
/// until service shutdown, so alerts already enqueued survive an evaluator
/// teardown. The configuration is applied exactly once, here.
pub struct TenantNotifier {
    tenant: String,
    queue: Arc<AlertQueue>,
    shutdown: watch::Sender<bool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TenantNotifier {
    /// Validates the configuration, builds the HTTP client and spawns the
    /// delivery loop. Configuration errors here are programmer errors and
    /// prevent evaluator creation upstream.
    pub fn new(tenant: &str, cfg: NotifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(NotifyError::Http)?;

        let resolver = match &cfg.targets {
            TargetConfig::DnsSrv { .. } => Some(
                TokioResolver::builder_tokio()
                    .map_err(|e| NotifyError::InvalidConfig(format!("dns resolver: {e}")))?
                    .build(),
            ),
            TargetConfig::Static(_) => None,
        };

        let queue = Arc::new(AlertQueue::new(cfg.queue_capacity));
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(delivery_loop(
            tenant.to_string(),
            queue.clone(),
            client,
            cfg,
            resolver,
            rx,
        ));

        Ok(Self {
            tenant: tenant.to_string(),
            queue,
            shutdown,
            handle: std::sync::Mutex::new(Some(handle)),
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Enqueues alerts for background delivery. Never blocks; the queue
    /// drops its oldest entries when full.
    pub fn enqueue(&self, alerts: Vec<NotifierAlert>) {
        self.queue.push(alerts);
    }

    #[cfg(test)]
    pub(crate) fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Signals the delivery loop to finish and waits for it. The loop
    /// flushes what it can of the remaining queue before exiting.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn delivery_loop(
    tenant: String,
    queue: Arc<AlertQueue>,
    client: reqwest::Client,
    cfg: NotifierConfig,
    resolver: Option<TokioResolver>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut targets, refresh_period) = match &cfg.targets {
        TargetConfig::Static(targets) => (targets.clone(), Duration::from_secs(3600)),
        TargetConfig::DnsSrv { refresh, .. } => (Vec::new(), *refresh),
    };

    let mut refresh = tokio::time::interval(refresh_period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                // Final flush; anything that cannot ship now is dropped.
                let rest = queue.drain(MAX_BATCH);
                if !rest.is_empty() {
                    send_batch(&tenant, &client, &cfg, &targets, &rest).await;
                }
                return;
            }
            _ = refresh.tick() => {
                if let (Some(resolver), TargetConfig::DnsSrv { record, .. }) =
                    (resolver.as_ref(), &cfg.targets)
                {
                    match resolve_srv(resolver, record).await {
                        Ok(resolved) => {
                            if resolved != targets {
                                tracing::info!(
                                    tenant = %tenant,
                                    count = resolved.len(),
                                    "Notifier receivers updated from DNS"
                                );
                                targets = resolved;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(tenant = %tenant, error = %e, "Receiver discovery failed");
                        }
                    }
                }
            }
            batch = queue.pop_batch(MAX_BATCH) => {
                send_batch(&tenant, &client, &cfg, &targets, &batch).await;
            }
        }
    }
}

async fn send_batch(
    tenant: &str,
    client: &reqwest::Client,
    cfg: &NotifierConfig,
    targets: &[String],
    batch: &[NotifierAlert],
) {
    if targets.is_empty() {
        tracing::debug!(
            tenant = %tenant,
            count = batch.len(),
            "No notification receivers configured, discarding alerts"
        );
        return;
    }

    let mut headers = http::HeaderMap::new();
    if let Err(e) = oxrule_common::tenant::inject_http(tenant, &mut headers) {
        tracing::error!(tenant = %tenant, error = %e, "Cannot tag notification request");
        return;
    }

    for target in targets {
        let url = format!("{}{}", target.trim_end_matches('/'), cfg.api_version.alerts_path());
        // The enqueueing context carries no usable span; each request gets
        // a fresh root span instead.
        let span = tracing::info_span!(parent: None, "notify", tenant = %tenant, target = %target);
        let result = async {
            client
                .post(&url)
                .headers(headers.clone())
                .json(&batch)
                .send()
                .await
        }
        .instrument(span)
        .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(tenant = %tenant, target = %target, count = batch.len(), "Alerts delivered");
            }
            Ok(resp) => {
                tracing::warn!(
                    tenant = %tenant,
                    target = %target,
                    status = %resp.status(),
                    "Receiver rejected notification batch"
                );
            }
            Err(e) => {
                tracing::warn!(tenant = %tenant, target = %target, error = %e, "Notification delivery failed");
            }
        }
    }
}
