//! Admin HTTP surface: ring status page and metrics exposition.

use crate::ruler::Ruler;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use oxrule_ring::Ring;
use prometheus::{Encoder, Registry, TextEncoder};
use std::fmt::Write;
use std::sync::Arc;

#[derive(Clone)]
struct AdminState {
    ruler: Arc<Ruler>,
    registry: Registry,
}

pub fn router(ruler: Arc<Ruler>, registry: Registry) -> Router {
    Router::new()
        .route("/ruler", get(ruler_page))
        .route("/metrics", get(metrics_page))
        .with_state(AdminState { ruler, registry })
}

const UNSHARDED_PAGE: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <meta charset="UTF-8">
        <title>Ruler Status</title>
    </head>
    <body>
        <h1>Ruler Status</h1>
        <p>Ruler running with shards disabled</p>
    </body>
</html>"#;

async fn ruler_page(State(state): State<AdminState>) -> (StatusCode, Html<String>) {
    if !state.ruler.sharding_enabled() {
        return (StatusCode::OK, Html(UNSHARDED_PAGE.to_string()));
    }

    let Some(ring) = state.ruler.ring() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html("<p>sharding enabled but no ring backend</p>".to_string()),
        );
    };
    match ring.all_replicas().await {
        Ok(replicas) => {
            let mut body = String::from(
                "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"><title>Ruler Ring</title></head><body>\n\
                 <h1>Ruler Ring</h1>\n<table border=\"1\">\n\
                 <tr><th>Address</th><th>Tokens</th><th>Last heartbeat</th></tr>\n",
            );
            for replica in replicas {
                let _ = write!(
                    body,
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    replica.addr,
                    replica.tokens.len(),
                    replica.heartbeat.to_rfc3339(),
                );
            }
            body.push_str("</table></body></html>");
            (StatusCode::OK, Html(body))
        }
        Err(e) => {
            tracing::error!(error = %e, "Unable to render ring status page");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("<p>ring unavailable: {e}</p>")),
            )
        }
    }
}

async fn metrics_page(State(state): State<AdminState>) -> (StatusCode, String) {
    let mut families = state.registry.gather();
    families.extend(state.ruler.tenant_registries().gather());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            String::from_utf8_lossy(&buffer).into_owned(),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Unable to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
