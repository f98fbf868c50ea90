//! Receiver target discovery.

use crate::error::{NotifyError, Result};
use hickory_resolver::TokioResolver;

/// Resolves an SRV record into receiver base URLs, sorted and deduplicated
/// so refreshes are comparable.
pub async fn resolve_srv(resolver: &TokioResolver, record: &str) -> Result<Vec<String>> {
    let lookup = resolver
        .srv_lookup(record)
        .await
        .map_err(|e| NotifyError::Resolve(e.to_string()))?;

    let mut targets: Vec<String> = lookup
        .iter()
        .map(|srv| {
            let host = srv.target().to_string();
            format!("http://{}:{}", host.trim_end_matches('.'), srv.port())
        })
        .collect();
    targets.sort();
    targets.dedup();
    Ok(targets)
}
