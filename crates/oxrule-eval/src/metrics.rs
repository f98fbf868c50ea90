//! Per-tenant evaluation metrics.
//!
//! Registered against a tenant-wrapped registry, so every series carries
//! the `user` label and the workspace namespace prefix.

use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct EvalMetrics {
    pub iterations: IntCounterVec,
    pub failures: IntCounterVec,
    pub last_duration: GaugeVec,
    pub last_evaluation: GaugeVec,
}

impl EvalMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let iterations = IntCounterVec::new(
            Opts::new(
                "ruler_group_iterations_total",
                "Total rule group evaluation iterations",
            ),
            &["group"],
        )?;
        registry.register(Box::new(iterations.clone()))?;

        let failures = IntCounterVec::new(
            Opts::new(
                "ruler_group_rule_failures_total",
                "Total rule evaluation failures",
            ),
            &["group"],
        )?;
        registry.register(Box::new(failures.clone()))?;

        let last_duration = GaugeVec::new(
            Opts::new(
                "ruler_group_last_duration_seconds",
                "Duration of the last rule group evaluation",
            ),
            &["group"],
        )?;
        registry.register(Box::new(last_duration.clone()))?;

        let last_evaluation = GaugeVec::new(
            Opts::new(
                "ruler_group_last_evaluation_timestamp_seconds",
                "Unix timestamp of the last rule group evaluation",
            ),
            &["group"],
        )?;
        registry.register(Box::new(last_evaluation.clone()))?;

        Ok(Self {
            iterations,
            failures,
            last_duration,
            last_evaluation,
        })
    }
}
