//! A rule group and its evaluation.

use crate::alert::{ActiveAlert, AlertState, AlertTracker};
use crate::metrics::EvalMetrics;
use crate::{AlertSink, Pusher, QueryFunc, Sample};
use chrono::{DateTime, Utc};
use oxrule_common::rules::{Rule, RuleGroup};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Evaluation health of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleHealth {
    Unknown,
    Ok,
    Bad,
}

impl std::fmt::Display for RuleHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleHealth::Unknown => write!(f, "unknown"),
            RuleHealth::Ok => write!(f, "ok"),
            RuleHealth::Bad => write!(f, "err"),
        }
    }
}

/// Everything an evaluation needs, bundled once per tenant.
pub struct EvalContext {
    pub tenant: String,
    pub query: Arc<dyn QueryFunc>,
    pub pusher: Arc<dyn Pusher>,
    pub sink: Arc<dyn AlertSink>,
    pub metrics: EvalMetrics,
}

pub(crate) struct EvalRule {
    pub rule: Rule,
    pub health: RuleHealth,
    pub last_error: Option<String>,
    pub last_eval: Option<DateTime<Utc>>,
    pub last_duration: Duration,
    pub tracker: Option<AlertTracker>,
}

impl EvalRule {
    fn new(rule: Rule) -> Self {
        let tracker = match &rule {
            Rule::Recording { .. } => None,
            Rule::Alerting {
                alert,
                for_secs,
                labels,
                annotations,
                ..
            } => Some(AlertTracker::new(
                alert,
                *for_secs,
                labels.clone(),
                annotations.clone(),
            )),
        };
        Self {
            rule,
            health: RuleHealth::Unknown,
            last_error: None,
            last_eval: None,
            last_duration: Duration::ZERO,
            tracker,
        }
    }
}

pub(crate) struct Group {
    pub name: String,
    pub file: PathBuf,
    pub interval: Duration,
    pub rules: Vec<EvalRule>,
    pub last_eval: Option<DateTime<Utc>>,
    pub last_duration: Duration,
}

impl Group {
    pub fn new(file: PathBuf, group: RuleGroup, default_interval: Duration) -> Self {
        let interval = group.interval(default_interval);
        Self {
            name: group.name,
            file,
            interval,
            rules: group.rules.into_iter().map(EvalRule::new).collect(),
            last_eval: None,
            last_duration: Duration::ZERO,
        }
    }

    /// Evaluates every rule once, in order. Rule failures mark the rule
    /// unhealthy and are logged; they never abort the rest of the group.
    pub async fn evaluate(&mut self, ctx: &EvalContext) {
        let started = std::time::Instant::now();
        let now = Utc::now();

        for eval_rule in &mut self.rules {
            let rule_started = std::time::Instant::now();
            let result = match &eval_rule.rule {
                Rule::Recording {
                    record,
                    expr,
                    labels,
                } => {
                    match ctx.query.query(&ctx.tenant, expr, now).await {
                        Ok(samples) => {
                            let out: Vec<Sample> = samples
                                .into_iter()
                                .map(|mut s| {
                                    s.labels.insert("__name__".to_string(), record.clone());
                                    for (k, v) in labels {
                                        s.labels.insert(k.clone(), v.clone());
                                    }
                                    s.timestamp = now;
                                    s
                                })
                                .collect();
                            if out.is_empty() {
                                Ok(())
                            } else {
                                ctx.pusher.push(&ctx.tenant, out).await
                            }
                        }
                        Err(e) => Err(e),
                    }
                }
                Rule::Alerting { expr, .. } => {
                    match ctx.query.query(&ctx.tenant, expr, now).await {
                        Ok(samples) => {
                            let expr = expr.clone();
                            if let Some(tracker) = eval_rule.tracker.as_mut() {
                                let alerts = tracker.update(&samples, now, self.interval);
                                if !alerts.is_empty() {
                                    ctx.sink.send(&expr, &alerts);
                                    tracker.mark_sent(now);
                                }
                            }
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
            };

            eval_rule.last_eval = Some(now);
            eval_rule.last_duration = rule_started.elapsed();
            match result {
                Ok(()) => {
                    eval_rule.health = RuleHealth::Ok;
                    eval_rule.last_error = None;
                }
                Err(e) => {
                    eval_rule.health = RuleHealth::Bad;
                    eval_rule.last_error = Some(e.to_string());
                    ctx.metrics.failures.with_label_values(&[&self.name]).inc();
                    tracing::warn!(
                        tenant = %ctx.tenant,
                        group = %self.name,
                        rule = %eval_rule.rule.name(),
                        error = %e,
                        "Rule evaluation failed"
                    );
                }
            }
        }

        self.last_eval = Some(now);
        self.last_duration = started.elapsed();
        ctx.metrics
            .iterations
            .with_label_values(&[&self.name])
            .inc();
        ctx.metrics
            .last_duration
            .with_label_values(&[&self.name])
            .set(self.last_duration.as_secs_f64());
        ctx.metrics
            .last_evaluation
            .with_label_values(&[&self.name])
            .set(now.timestamp() as f64);
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            name: self.name.clone(),
            file: self.file.clone(),
            interval: self.interval,
            evaluation_timestamp: self.last_eval,
            evaluation_duration: self.last_duration,
            rules: self
                .rules
                .iter()
                .map(|r| RuleSnapshot {
                    rule: r.rule.clone(),
                    state: r
                        .tracker
                        .as_ref()
                        .map(AlertTracker::state)
                        .unwrap_or(AlertState::Inactive),
                    health: r.health,
                    last_error: r.last_error.clone(),
                    alerts: r
                        .tracker
                        .as_ref()
                        .map(AlertTracker::snapshot)
                        .unwrap_or_default(),
                    evaluation_timestamp: r.last_eval,
                    evaluation_duration: r.last_duration,
                })
                .collect(),
        }
    }
}

/// Read-only view of a running group, for inspection.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub name: String,
    pub file: PathBuf,
    pub interval: Duration,
    pub evaluation_timestamp: Option<DateTime<Utc>>,
    pub evaluation_duration: Duration,
    pub rules: Vec<RuleSnapshot>,
}

/// Read-only view of one rule inside a running group.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    pub rule: Rule,
    pub state: AlertState,
    pub health: RuleHealth,
    pub last_error: Option<String>,
    pub alerts: Vec<ActiveAlert>,
    pub evaluation_timestamp: Option<DateTime<Utc>>,
    pub evaluation_duration: Duration,
}
