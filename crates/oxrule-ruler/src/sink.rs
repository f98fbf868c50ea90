//! Bridge from evaluator alerts to the tenant's notifier.

use oxrule_eval::{ActiveAlert, AlertSink, AlertState};
use oxrule_notify::{table_link_for_expression, NotifierAlert, TenantNotifier};
use std::sync::Arc;

/// Filters and converts an evaluator's tracked alerts into notifier wire
/// alerts. Pending alerts never ship; firing and resolved alerts are
/// enqueued with their fire/resolve timestamps and a generator URL
/// pointing back at the expression.
pub struct NotifierSink {
    notifier: Arc<TenantNotifier>,
    external_url: String,
}

impl NotifierSink {
    pub fn new(notifier: Arc<TenantNotifier>, external_url: String) -> Self {
        Self {
            notifier,
            external_url,
        }
    }
}

impl AlertSink for NotifierSink {
    fn send(&self, expr: &str, alerts: &[ActiveAlert]) {
        let outgoing = wire_alerts(&self.external_url, expr, alerts);
        if !outgoing.is_empty() {
            self.notifier.enqueue(outgoing);
        }
    }
}

/// Drops Pending alerts and converts the rest to wire form.
pub fn wire_alerts(external_url: &str, expr: &str, alerts: &[ActiveAlert]) -> Vec<NotifierAlert> {
    alerts
        .iter()
        .filter(|alert| alert.state != AlertState::Pending)
        .map(|alert| NotifierAlert {
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            starts_at: alert.fired_at.unwrap_or(alert.active_at),
            ends_at: alert.resolved_at,
            generator_url: format!(
                "{}{}",
                external_url.trim_end_matches('/'),
                table_link_for_expression(expr)
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn alert(state: AlertState) -> ActiveAlert {
        let now = Utc::now();
        ActiveAlert {
            labels: BTreeMap::from([("alertname".to_string(), "A".to_string())]),
            annotations: BTreeMap::new(),
            value: 1.0,
            state,
            active_at: now,
            fired_at: (state >= AlertState::Firing).then_some(now),
            resolved_at: None,
            last_sent_at: None,
            valid_until: None,
        }
    }

    #[test]
    fn pending_alerts_are_filtered_out() {
        let out = wire_alerts(
            "http://prom.example",
            "up == 0",
            &[
                alert(AlertState::Pending),
                alert(AlertState::Firing),
                alert(AlertState::Pending),
            ],
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn firing_alert_maps_timestamps_and_generator_url() {
        let fired = alert(AlertState::Firing);
        let out = wire_alerts("http://prom.example/", "up == 0", &[fired.clone()]);
        assert_eq!(out[0].starts_at, fired.fired_at.unwrap());
        assert_eq!(out[0].ends_at, None);
        assert_eq!(
            out[0].generator_url,
            "http://prom.example/graph?g0.expr=up%20%3D%3D%200&g0.tab=1"
        );
    }

    #[test]
    fn resolved_alert_carries_its_end_timestamp() {
        let mut resolved = alert(AlertState::Inactive);
        let fired_at = Utc::now();
        resolved.fired_at = Some(fired_at);
        resolved.resolved_at = Some(fired_at + chrono::Duration::seconds(60));

        let out = wire_alerts("http://prom.example", "up == 0", &[resolved.clone()]);
        assert_eq!(out[0].starts_at, fired_at);
        assert_eq!(out[0].ends_at, resolved.resolved_at);
    }
}
