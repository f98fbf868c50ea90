use crate::notifier::TenantNotifier;
use crate::queue::AlertQueue;
use crate::{table_link_for_expression, ApiVersion, NotifierAlert, NotifierConfig, TargetConfig};
use axum::extract::State;
use axum::routing::post;
use axum::Json;
use chrono::Utc;
use oxrule_common::tenant::TENANT_HEADER;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn alert(name: &str) -> NotifierAlert {
    NotifierAlert {
        labels: BTreeMap::from([("alertname".to_string(), name.to_string())]),
        annotations: BTreeMap::new(),
        starts_at: Utc::now(),
        ends_at: None,
        generator_url: "http://prom.example/graph?g0.expr=up&g0.tab=1".to_string(),
    }
}

#[test]
fn queue_drops_oldest_on_overflow() {
    let queue = AlertQueue::new(3);
    queue.push((0..5).map(|i| alert(&format!("a{i}"))).collect());

    let batch = queue.drain(10);
    let names: Vec<&str> = batch
        .iter()
        .map(|a| a.labels.get("alertname").unwrap().as_str())
        .collect();
    assert_eq!(names, vec!["a2", "a3", "a4"]);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn pop_batch_waits_for_pushes() {
    let queue = Arc::new(AlertQueue::new(10));
    let waiter = queue.clone();
    let handle = tokio::spawn(async move { waiter.pop_batch(10).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.push(vec![alert("late")]);
    let batch = handle.await.unwrap();
    assert_eq!(batch.len(), 1);
}

#[test]
fn wire_format_is_alertmanager_shaped() {
    let body = serde_json::to_value(vec![alert("HighLatency")]).unwrap();
    let first = &body[0];
    assert!(first.get("startsAt").is_some());
    assert!(first.get("generatorURL").is_some());
    // endsAt is omitted until the alert resolves.
    assert!(first.get("endsAt").is_none());

    let mut resolved = alert("HighLatency");
    resolved.ends_at = Some(Utc::now());
    let body = serde_json::to_value(vec![resolved]).unwrap();
    assert!(body[0].get("endsAt").is_some());
}

#[test]
fn table_link_percent_encodes_the_expression() {
    assert_eq!(
        table_link_for_expression("up == 0"),
        "/graph?g0.expr=up%20%3D%3D%200&g0.tab=1"
    );
}

#[test]
fn api_version_selects_path() {
    assert_eq!(ApiVersion::V1.alerts_path(), "/api/v1/alerts");
    assert_eq!(ApiVersion::V2.alerts_path(), "/api/v2/alerts");
}

#[derive(Clone, Default)]
struct Received {
    requests: Arc<Mutex<Vec<(Option<String>, Vec<NotifierAlert>)>>>,
}

async fn receive(
    State(state): State<Received>,
    headers: axum::http::HeaderMap,
    Json(alerts): Json<Vec<NotifierAlert>>,
) -> &'static str {
    let tenant = headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push((tenant, alerts));
    "ok"
}

#[tokio::test]
async fn delivery_tags_requests_with_the_tenant() {
    let received = Received::default();
    let app = axum::Router::new()
        .route("/api/v1/alerts", post(receive))
        .with_state(received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let notifier = TenantNotifier::new(
        "team-a",
        NotifierConfig {
            queue_capacity: 100,
            timeout: Duration::from_secs(5),
            api_version: ApiVersion::V1,
            targets: TargetConfig::Static(vec![format!("http://{addr}")]),
        },
    )
    .unwrap();

    notifier.enqueue(vec![alert("HighLatency"), alert("DiskFull")]);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if !received.requests.lock().unwrap().is_empty() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no delivery before deadline");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    {
        let requests = received.requests.lock().unwrap();
        let (tenant, alerts) = &requests[0];
        assert_eq!(tenant.as_deref(), Some("team-a"));
        assert_eq!(alerts.len(), 2);
    }

    notifier.stop().await;
    assert_eq!(notifier.queue_len(), 0);
}
