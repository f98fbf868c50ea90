use anyhow::Result;
use oxrule_common::proto::ruler_service_server::RulerServiceServer;
use oxrule_ring::{InMemoryKv, Lifecycler, LifecyclerConfig, TokenRing};
use oxrule_ruler::inspection::RulerServiceImpl;
use oxrule_ruler::store::LocalRuleStore;
use oxrule_ruler::{admin, Ruler, Sharding};
use oxrule_server::config::ServerConfig;
use oxrule_server::remote::{HttpQueryFunc, RemoteWritePusher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("oxrule=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if matches!(args.get(1).map(String::as_str), Some("--help" | "-h")) {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Usage: oxrule-server [config.toml]");
        }
        return Ok(());
    }
    let config_path = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("config/server.toml");
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        grpc_port = config.grpc_port,
        http_port = config.http_port,
        store_dir = %config.store_dir,
        rule_path = %config.ruler.rule_path.display(),
        sharding = config.ruler.enable_sharding,
        "oxrule-server starting"
    );

    let registry = prometheus::Registry::new();
    let store = Arc::new(LocalRuleStore::new(&config.store_dir));
    let query_timeout = Duration::from_secs(config.query_timeout_secs);
    let query = Arc::new(HttpQueryFunc::new(&config.query_url, query_timeout)?);
    let pusher = Arc::new(RemoteWritePusher::new(&config.push_url, query_timeout)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Ring membership, when sharding is enabled. The KV substrate is
    // pluggable; this binary ships the in-memory client.
    let mut lifecycler_handle = None;
    let sharding = if config.ruler.enable_sharding {
        let kv = Arc::new(InMemoryKv::new());
        let addr = config
            .ring
            .advertise_addr
            .clone()
            .unwrap_or_else(|| format!("127.0.0.1:{}", config.grpc_port));
        let lifecycler = Arc::new(Lifecycler::new(
            LifecyclerConfig {
                addr,
                num_tokens: config.ring.num_tokens,
                heartbeat_period: Duration::from_secs(config.ring.heartbeat_period_secs),
                search_pending_for: config.ruler.search_pending_for(),
            },
            kv.clone(),
        ));
        lifecycler.register().await?;
        let heartbeat = lifecycler.clone();
        let heartbeat_shutdown = shutdown_rx.clone();
        lifecycler_handle = Some(tokio::spawn(async move {
            heartbeat.run(heartbeat_shutdown).await;
        }));

        let ring = Arc::new(TokenRing::new(
            kv,
            Duration::from_secs(config.ring.heartbeat_timeout_secs),
        ));
        Some(Sharding { ring, lifecycler })
    } else {
        None
    };

    let ruler = Arc::new(Ruler::new(
        config.ruler.clone(),
        store,
        query,
        pusher,
        sharding,
        &registry,
    )?);

    let sync_ruler = ruler.clone();
    let sync_shutdown = shutdown_rx.clone();
    let sync_handle = tokio::spawn(async move {
        sync_ruler.run(sync_shutdown).await;
    });

    // gRPC inspection service
    let grpc_addr: SocketAddr = format!("0.0.0.0:{}", config.grpc_port).parse()?;
    let grpc_server = TonicServer::builder()
        .add_service(RulerServiceServer::new(RulerServiceImpl::new(ruler.clone())))
        .serve(grpc_addr);

    // Admin HTTP: ring status page and metrics
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, admin::router(ruler.clone(), registry));

    tracing::info!(grpc = %grpc_addr, http = %http_addr, "Server started");

    tokio::select! {
        result = grpc_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "gRPC server error");
            }
        }
        result = http_server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = lifecycler_handle {
        let _ = handle.await;
    }
    let _ = sync_handle.await;
    ruler.stop().await;
    tracing::info!("Server stopped");

    Ok(())
}
