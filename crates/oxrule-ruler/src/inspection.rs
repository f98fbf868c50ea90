//! Rule inspection RPC: snapshot conversion and the gRPC service.

use crate::ruler::Ruler;
use chrono::{DateTime, Utc};
use oxrule_common::proto;
use oxrule_common::rules::Rule;
use oxrule_common::tenant;
use oxrule_eval::{ActiveAlert, GroupSnapshot, RuleSnapshot};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tonic::{Request, Response, Status};

fn millis(at: Option<DateTime<Utc>>) -> i64 {
    at.map(|t| t.timestamp_millis()).unwrap_or(0)
}

fn label_map(labels: &BTreeMap<String, String>) -> HashMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn alert_desc(alert: &ActiveAlert) -> proto::AlertDesc {
    proto::AlertDesc {
        state: alert.state.to_string(),
        labels: label_map(&alert.labels),
        annotations: label_map(&alert.annotations),
        value: alert.value,
        active_at_ms: alert.active_at.timestamp_millis(),
        fired_at_ms: millis(alert.fired_at),
        resolved_at_ms: millis(alert.resolved_at),
        last_sent_at_ms: millis(alert.last_sent_at),
        valid_until_ms: millis(alert.valid_until),
    }
}

fn rule_desc(snapshot: &RuleSnapshot) -> proto::RuleDesc {
    let mut desc = proto::RuleDesc {
        health: snapshot.health.to_string(),
        last_error: snapshot.last_error.clone().unwrap_or_default(),
        evaluation_timestamp_ms: millis(snapshot.evaluation_timestamp),
        evaluation_duration_ms: snapshot.evaluation_duration.as_millis() as i64,
        ..Default::default()
    };
    match &snapshot.rule {
        Rule::Recording {
            record,
            expr,
            labels,
        } => {
            desc.record = record.clone();
            desc.expr = expr.clone();
            desc.labels = label_map(labels);
        }
        Rule::Alerting {
            alert,
            expr,
            for_secs,
            labels,
            annotations,
        } => {
            desc.alert = alert.clone();
            desc.expr = expr.clone();
            desc.for_ms = (*for_secs * 1000) as i64;
            desc.labels = label_map(labels);
            desc.annotations = label_map(annotations);
            desc.state = snapshot.state.to_string();
            desc.alerts = snapshot.alerts.iter().map(alert_desc).collect();
        }
    }
    desc
}

/// Converts a running group's snapshot into its inspection description.
/// The namespace is recovered by stripping the tenant's rule directory
/// prefix from the group's file path.
pub fn group_desc(tenant: &str, prefix: &Path, snapshot: GroupSnapshot) -> proto::RuleGroupDesc {
    let namespace = snapshot
        .file
        .strip_prefix(prefix)
        .unwrap_or(&snapshot.file)
        .to_string_lossy()
        .into_owned();
    proto::RuleGroupDesc {
        name: snapshot.name.clone(),
        namespace,
        tenant: tenant.to_string(),
        interval_ms: snapshot.interval.as_millis() as i64,
        evaluation_timestamp_ms: millis(snapshot.evaluation_timestamp),
        evaluation_duration_ms: snapshot.evaluation_duration.as_millis() as i64,
        rules: snapshot.rules.iter().map(rule_desc).collect(),
    }
}

/// gRPC inspection service, serving this replica's local rules. Peers in
/// the ring call this endpoint when aggregating a sharded view.
pub struct RulerServiceImpl {
    ruler: Arc<Ruler>,
}

impl RulerServiceImpl {
    pub fn new(ruler: Arc<Ruler>) -> Self {
        Self { ruler }
    }
}

#[tonic::async_trait]
impl proto::ruler_service_server::RulerService for RulerServiceImpl {
    async fn rules(
        &self,
        request: Request<proto::RulesRequest>,
    ) -> Result<Response<proto::RulesResponse>, Status> {
        let tenant =
            tenant::from_grpc(&request).map_err(|e| Status::unauthenticated(e.to_string()))?;
        let groups = self.ruler.local_rules(&tenant).await;
        Ok(Response::new(proto::RulesResponse { groups }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrule_eval::{AlertState, RuleSnapshot};
    use oxrule_eval::group::RuleHealth;
    use std::time::Duration;

    #[test]
    fn namespace_is_recovered_from_the_file_path() {
        let snapshot = GroupSnapshot {
            name: "latency".into(),
            file: "/rules/team-a/prod".into(),
            interval: Duration::from_secs(30),
            evaluation_timestamp: None,
            evaluation_duration: Duration::ZERO,
            rules: vec![],
        };
        let desc = group_desc("team-a", Path::new("/rules/team-a"), snapshot);
        assert_eq!(desc.namespace, "prod");
        assert_eq!(desc.tenant, "team-a");
        assert_eq!(desc.interval_ms, 30_000);
    }

    #[test]
    fn alerting_rule_description_carries_alerts() {
        let now = Utc::now();
        let snapshot = RuleSnapshot {
            rule: Rule::Alerting {
                alert: "HighLatency".into(),
                expr: "up == 0".into(),
                for_secs: 300,
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
            },
            state: AlertState::Firing,
            health: RuleHealth::Ok,
            last_error: None,
            alerts: vec![ActiveAlert {
                labels: BTreeMap::from([("alertname".to_string(), "HighLatency".to_string())]),
                annotations: BTreeMap::new(),
                value: 1.0,
                state: AlertState::Firing,
                active_at: now,
                fired_at: Some(now),
                resolved_at: None,
                last_sent_at: None,
                valid_until: None,
            }],
            evaluation_timestamp: Some(now),
            evaluation_duration: Duration::from_millis(12),
        };

        let desc = rule_desc(&snapshot);
        assert_eq!(desc.alert, "HighLatency");
        assert_eq!(desc.for_ms, 300_000);
        assert_eq!(desc.state, "firing");
        assert_eq!(desc.health, "ok");
        assert_eq!(desc.alerts.len(), 1);
        assert_eq!(desc.alerts[0].state, "firing");
        assert_eq!(desc.alerts[0].fired_at_ms, now.timestamp_millis());
        // Never-resolved alerts report a zero timestamp.
        assert_eq!(desc.alerts[0].resolved_at_ms, 0);
    }
}
