//! Alerting-rule state machine.
//!
//! Each alerting rule tracks one [`ActiveAlert`] per distinct label set its
//! expression returns. An alert enters Pending when its series first
//! appears, moves to Firing once it has been active for the rule's `for`
//! duration, and resolves when the series disappears. Resolved alerts stay
//! visible for a retention window so resolution notifications still ship.

use crate::Sample;
use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

/// How long a resolved alert remains tracked after resolution.
const RESOLVED_RETENTION: Duration = Duration::minutes(15);

/// How many evaluation intervals an alert claim stays valid without a
/// re-evaluation refreshing it.
const VALID_FOR_INTERVALS: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertState {
    Inactive,
    Pending,
    Firing,
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Inactive => write!(f, "inactive"),
            AlertState::Pending => write!(f, "pending"),
            AlertState::Firing => write!(f, "firing"),
        }
    }
}

/// One tracked alert instance of an alerting rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAlert {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub value: f64,
    pub state: AlertState,
    pub active_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Per-rule alert tracker.
#[derive(Debug)]
pub struct AlertTracker {
    alert_name: String,
    for_duration: Duration,
    rule_labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    active: HashMap<u64, ActiveAlert>,
}

impl AlertTracker {
    pub fn new(
        alert_name: &str,
        for_secs: u64,
        rule_labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Self {
            alert_name: alert_name.to_string(),
            for_duration: Duration::seconds(for_secs as i64),
            rule_labels,
            annotations,
            active: HashMap::new(),
        }
    }

    /// Final label set of an alert: sample labels, overridden by rule
    /// labels, plus the alertname.
    fn alert_labels(&self, sample: &Sample) -> BTreeMap<String, String> {
        let mut labels = sample.labels.clone();
        labels.remove("__name__");
        for (k, v) in &self.rule_labels {
            labels.insert(k.clone(), v.clone());
        }
        labels.insert("alertname".to_string(), self.alert_name.clone());
        labels
    }

    fn fingerprint(labels: &BTreeMap<String, String>) -> u64 {
        let mut hasher = DefaultHasher::new();
        labels.hash(&mut hasher);
        hasher.finish()
    }

    /// Applies one evaluation's query result and advances every tracked
    /// alert. Returns a snapshot of all alerts tracked afterwards.
    pub fn update(
        &mut self,
        samples: &[Sample],
        now: DateTime<Utc>,
        interval: std::time::Duration,
    ) -> Vec<ActiveAlert> {
        let valid_until = now
            + Duration::from_std(interval)
                .unwrap_or_else(|_| Duration::seconds(60))
                * VALID_FOR_INTERVALS;

        let mut current: HashMap<u64, (BTreeMap<String, String>, f64)> = HashMap::new();
        for sample in samples {
            let labels = self.alert_labels(sample);
            current.insert(Self::fingerprint(&labels), (labels, sample.value));
        }

        // Activate or refresh alerts for series present in this evaluation.
        let for_duration = self.for_duration;
        for (fp, (labels, value)) in &current {
            let annotations = self.annotations.clone();
            let alert = self.active.entry(*fp).or_insert_with(|| ActiveAlert {
                labels: labels.clone(),
                annotations,
                value: *value,
                state: AlertState::Pending,
                active_at: now,
                fired_at: None,
                resolved_at: None,
                last_sent_at: None,
                valid_until: None,
            });
            if alert.state == AlertState::Inactive {
                // A resolved alert whose series came back starts over.
                alert.state = AlertState::Pending;
                alert.active_at = now;
                alert.fired_at = None;
                alert.resolved_at = None;
            }
            alert.value = *value;
            alert.valid_until = Some(valid_until);
            if alert.state == AlertState::Pending && now - alert.active_at >= for_duration {
                alert.state = AlertState::Firing;
                alert.fired_at = Some(now);
            }
        }

        // Resolve or drop alerts whose series disappeared.
        self.active.retain(|fp, alert| {
            if current.contains_key(fp) {
                return true;
            }
            match alert.state {
                // A Pending alert that never fired just goes away.
                AlertState::Pending => false,
                AlertState::Firing => {
                    alert.state = AlertState::Inactive;
                    alert.resolved_at = Some(now);
                    true
                }
                AlertState::Inactive => alert
                    .resolved_at
                    .map(|at| now - at < RESOLVED_RETENTION)
                    .unwrap_or(false),
            }
        });

        self.snapshot()
    }

    pub fn snapshot(&self) -> Vec<ActiveAlert> {
        let mut alerts: Vec<ActiveAlert> = self.active.values().cloned().collect();
        alerts.sort_by(|a, b| a.labels.cmp(&b.labels));
        alerts
    }

    /// Records that every non-Pending alert was handed to the notifier.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        for alert in self.active.values_mut() {
            if alert.state != AlertState::Pending {
                alert.last_sent_at = Some(now);
            }
        }
    }

    /// Takes over another tracker's active alerts, keeping this tracker's
    /// rule definition. Used to carry alert state across rule reloads.
    pub fn adopt_state(&mut self, old: AlertTracker) {
        self.active = old.active;
    }

    /// Rule-level state: the most severe state among tracked alerts.
    pub fn state(&self) -> AlertState {
        self.active
            .values()
            .map(|a| a.state)
            .max()
            .unwrap_or(AlertState::Inactive)
    }
}
