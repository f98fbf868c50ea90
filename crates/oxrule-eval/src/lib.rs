//! Per-tenant rule evaluation.
//!
//! A [`manager::TenantEvaluator`] loads a tenant's rule files, runs one
//! background task per rule group at the group's interval, writes recording
//! rule output through the [`Pusher`] seam and drives alerting rules
//! through the Pending/Firing state machine, handing the resulting alerts
//! to an [`AlertSink`] after every evaluation.
//!
//! The expression engine stays behind the [`QueryFunc`] seam: the
//! evaluator never interprets expressions itself.

pub mod alert;
pub mod error;
pub mod group;
pub mod manager;
pub mod metrics;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub use alert::{ActiveAlert, AlertState};
pub use error::{EvalError, Result};
pub use group::{GroupSnapshot, RuleSnapshot};
pub use manager::TenantEvaluator;

/// One time-series sample produced by a query or written back to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Evaluates an expression at an instant for one tenant.
///
/// Implementations wrap the shared expression engine and queryable; the
/// tenant id must be propagated into every downstream storage call so
/// multitenant backends enforce isolation.
#[async_trait]
pub trait QueryFunc: Send + Sync {
    async fn query(
        &self,
        tenant: &str,
        expr: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Sample>>;
}

/// Accepts tenant-tagged sample writes from recording rules.
#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(&self, tenant: &str, samples: Vec<Sample>) -> anyhow::Result<()>;
}

/// Receives the tracked alerts of an alerting rule after each evaluation.
///
/// The sink sees every tracked alert, Pending ones included; filtering
/// what actually ships is the sink's job. Implementations must not block.
pub trait AlertSink: Send + Sync {
    fn send(&self, expr: &str, alerts: &[ActiveAlert]);
}
