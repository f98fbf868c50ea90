mod common;

use common::{build_test_ruler, build_test_ruler_at, config_updates, group};
use oxrule_common::proto;
use oxrule_common::shard::shard_key;
use oxrule_ruler::inspection::RulerServiceImpl;
use tokio_stream::wrappers::TcpListenerStream;

#[tokio::test]
async fn single_replica_owns_everything() {
    let ctx = build_test_ruler(true);
    ctx.store.set_rules("a", vec![group("a", "ns", "g1", "up")]);
    ctx.store.set_rules("b", vec![group("b", "ns", "g1", "up")]);

    ctx.ruler.sync_rules().await;

    assert_eq!(ctx.ruler.active_tenants().await, vec!["a", "b"]);
    let rules_root = ctx.tmp.path().join("rules");
    assert!(rules_root.join("a").join("ns").is_file());
    assert!(rules_root.join("b").join("ns").is_file());
    assert_eq!(config_updates(&ctx, "a"), 1);
    assert_eq!(config_updates(&ctx, "b"), 1);

    ctx.ruler.stop().await;
}

#[tokio::test]
async fn unowned_group_is_not_materialised() {
    let ctx = build_test_ruler(true);
    ctx.store.set_rules("a", vec![group("a", "ns", "g1", "up")]);
    ctx.ring
        .set_owner(shard_key("a", "ns", "g1"), "10.0.0.2:9095");

    ctx.ruler.sync_rules().await;

    // g1 was tenant a's only group, so nothing lands on this replica.
    assert!(ctx.ruler.active_tenants().await.is_empty());
    assert!(!ctx.tmp.path().join("rules").join("a").join("ns").exists());
    assert_eq!(config_updates(&ctx, "a"), 0);

    ctx.ruler.stop().await;
}

#[tokio::test]
async fn departed_tenant_loses_evaluator_but_keeps_notifier() {
    let ctx = build_test_ruler(false);
    ctx.store.set_rules("a", vec![group("a", "ns", "g1", "up")]);
    ctx.store.set_rules("b", vec![group("b", "ns", "g1", "up")]);
    ctx.ruler.sync_rules().await;
    assert_eq!(ctx.ruler.active_tenants().await, vec!["a", "b"]);
    assert!(ctx.ruler.notifier("b").is_some());

    ctx.store.remove_tenant("b");
    ctx.ruler.sync_rules().await;

    assert_eq!(ctx.ruler.active_tenants().await, vec!["a"]);
    // The notifier absorbs tenant churn; only shutdown stops it.
    assert!(ctx.ruler.notifier("b").is_some());

    ctx.ruler.stop().await;
}

#[tokio::test]
async fn rule_content_change_triggers_exactly_one_update() {
    let ctx = build_test_ruler(false);
    ctx.store.set_rules("a", vec![group("a", "ns", "g1", "up")]);
    ctx.ruler.sync_rules().await;
    assert_eq!(config_updates(&ctx, "a"), 1);

    // Identical poll result: no rewrite, no counter movement.
    ctx.ruler.sync_rules().await;
    assert_eq!(config_updates(&ctx, "a"), 1);

    // Same identity, new expression.
    ctx.store.set_rules("a", vec![group("a", "ns", "g1", "up == 0")]);
    ctx.ruler.sync_rules().await;
    assert_eq!(config_updates(&ctx, "a"), 2);

    let content =
        std::fs::read_to_string(ctx.tmp.path().join("rules").join("a").join("ns")).unwrap();
    assert!(content.contains("up == 0"));

    ctx.ruler.stop().await;
}

#[tokio::test]
async fn ring_error_aborts_the_whole_tick() {
    let ctx = build_test_ruler(true);
    ctx.store.set_rules(
        "a",
        vec![group("a", "ns", "g1", "up"), group("a", "ns", "g2", "up")],
    );

    // First ownership check passes, the second fails.
    ctx.ring.fail_from_call(2);
    ctx.ruler.sync_rules().await;

    assert!(ctx.ruler.active_tenants().await.is_empty());
    assert!(!ctx.tmp.path().join("rules").join("a").exists());
    assert_eq!(config_updates(&ctx, "a"), 0);
    assert!(ctx.ruler.metrics().ring_check_errors.get() >= 1);

    // Healthy ring on the next poll converges normally.
    ctx.ring.heal();
    ctx.ruler.sync_rules().await;
    assert_eq!(ctx.ruler.active_tenants().await, vec!["a"]);
    assert!(ctx.tmp.path().join("rules").join("a").join("ns").is_file());
    assert_eq!(config_updates(&ctx, "a"), 1);

    ctx.ruler.stop().await;
}

#[tokio::test]
async fn sharded_inspection_aggregates_across_replicas() {
    // Three replicas, each running one group for tenant a, each serving
    // the inspection RPC on a real socket.
    let mut listeners = Vec::new();
    let mut addrs = Vec::new();
    for _ in 0..3 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        addrs.push(listener.local_addr().unwrap().to_string());
        listeners.push(listener);
    }

    let mut contexts = Vec::new();
    for (i, listener) in listeners.into_iter().enumerate() {
        let ctx = build_test_ruler_at(true, &addrs[i]);
        ctx.ring.set_replicas(&addrs);
        ctx.store
            .set_rules("a", vec![group("a", "ns", &format!("g{i}"), "up")]);
        ctx.ruler.sync_rules().await;

        let service = proto::ruler_service_server::RulerServiceServer::new(
            RulerServiceImpl::new(ctx.ruler.clone()),
        );
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });
        contexts.push(ctx);
    }

    let groups = contexts[0].ruler.get_rules("a").await.unwrap();
    let mut names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["g0", "g1", "g2"]);
    // Peer calls carried the tenant; each replica answered for tenant a.
    assert!(groups.iter().all(|g| g.tenant == "a"));
    assert!(groups.iter().all(|g| g.namespace == "ns"));

    for ctx in &contexts {
        ctx.ruler.stop().await;
    }
}

#[tokio::test]
async fn storage_outage_leaves_the_registry_unchanged() {
    let ctx = build_test_ruler(false);
    ctx.store.set_rules("a", vec![group("a", "ns", "g1", "up")]);
    ctx.ruler.sync_rules().await;
    assert_eq!(ctx.ruler.active_tenants().await, vec!["a"]);

    ctx.store.set_failing(true);
    ctx.ruler.sync_rules().await;
    // The prior, consistent evaluator set survives the outage.
    assert_eq!(ctx.ruler.active_tenants().await, vec!["a"]);
    assert_eq!(config_updates(&ctx, "a"), 1);

    ctx.store.set_failing(false);
    ctx.ruler.sync_rules().await;
    assert_eq!(ctx.ruler.active_tenants().await, vec!["a"]);

    ctx.ruler.stop().await;
}

#[tokio::test]
async fn local_inspection_reports_running_groups() {
    let ctx = build_test_ruler(false);
    ctx.store.set_rules(
        "a",
        vec![group("a", "prod", "latency", "up"), group("a", "dev", "errors", "up")],
    );
    ctx.ruler.sync_rules().await;

    let groups = ctx.ruler.get_rules("a").await.unwrap();
    assert_eq!(groups.len(), 2);
    // Namespaces are recovered from the on-disk layout.
    let mut seen: Vec<(&str, &str)> = groups
        .iter()
        .map(|g| (g.namespace.as_str(), g.name.as_str()))
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![("dev", "errors"), ("prod", "latency")]);
    assert_eq!(groups[0].rules.len(), 1);

    // Unknown tenants read as empty, not as an error.
    assert!(ctx.ruler.get_rules("nobody").await.unwrap().is_empty());

    ctx.ruler.stop().await;
}
