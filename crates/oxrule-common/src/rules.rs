//! Rule data model.
//!
//! A [`RuleGroup`] is identified by `(tenant, namespace, name)` and bundles
//! rules evaluated together at a shared interval. Groups are serialized to
//! on-disk rule files as [`RuleFile`] documents; label and annotation maps
//! are `BTreeMap`s so the serialized form is byte-deterministic, which the
//! file mapper's change detection depends on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A named bundle of rules evaluated together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub tenant: String,
    pub namespace: String,
    pub name: String,
    /// Evaluation period in seconds; the service default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    /// The `tenant/namespace/name` identity string, also the shard hash input.
    pub fn identity(&self) -> String {
        format!("{}/{}/{}", self.tenant, self.namespace, self.name)
    }

    /// Evaluation interval, falling back to the service default.
    pub fn interval(&self, default: Duration) -> Duration {
        self.interval_secs
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

/// A single recording or alerting rule.
///
/// The variants are distinguished by which of `record` / `alert` is
/// present, matching the rule-file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Recording {
        record: String,
        expr: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        labels: BTreeMap<String, String>,
    },
    Alerting {
        alert: String,
        expr: String,
        /// Seconds an alert must keep firing before it leaves Pending.
        #[serde(rename = "for", default, skip_serializing_if = "is_zero")]
        for_secs: u64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        labels: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        annotations: BTreeMap<String, String>,
    },
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl Rule {
    /// The record or alert name.
    pub fn name(&self) -> &str {
        match self {
            Rule::Recording { record, .. } => record,
            Rule::Alerting { alert, .. } => alert,
        }
    }

    pub fn expr(&self) -> &str {
        match self {
            Rule::Recording { expr, .. } => expr,
            Rule::Alerting { expr, .. } => expr,
        }
    }
}

/// On-disk rule file: all groups of one namespace, in deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    pub groups: Vec<RuleGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group() -> RuleGroup {
        RuleGroup {
            tenant: "team-a".into(),
            namespace: "prod".into(),
            name: "latency".into(),
            interval_secs: Some(30),
            rules: vec![
                Rule::Recording {
                    record: "job:latency:p99".into(),
                    expr: "histogram_quantile(0.99, rate(latency_bucket[5m]))".into(),
                    labels: BTreeMap::new(),
                },
                Rule::Alerting {
                    alert: "HighLatency".into(),
                    expr: "job:latency:p99 > 0.5".into(),
                    for_secs: 300,
                    labels: BTreeMap::from([("severity".into(), "page".into())]),
                    annotations: BTreeMap::from([("summary".into(), "p99 too high".into())]),
                },
            ],
        }
    }

    #[test]
    fn untagged_variants_round_trip() {
        let group = sample_group();
        let bytes = serde_json::to_vec(&RuleFile {
            groups: vec![group.clone()],
        })
        .unwrap();
        let parsed: RuleFile = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.groups, vec![group]);
        assert!(matches!(parsed.groups[0].rules[0], Rule::Recording { .. }));
        assert!(matches!(parsed.groups[0].rules[1], Rule::Alerting { .. }));
    }

    #[test]
    fn serialization_is_deterministic() {
        let file = RuleFile {
            groups: vec![sample_group()],
        };
        let a = serde_json::to_vec_pretty(&file).unwrap();
        let b = serde_json::to_vec_pretty(&file).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn interval_falls_back_to_default() {
        let mut group = sample_group();
        assert_eq!(
            group.interval(Duration::from_secs(60)),
            Duration::from_secs(30)
        );
        group.interval_secs = None;
        assert_eq!(
            group.interval(Duration::from_secs(60)),
            Duration::from_secs(60)
        );
    }
}
