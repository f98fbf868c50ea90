//! Tenant identity propagation.
//!
//! Every operation in the service is partitioned by an opaque tenant
//! identifier. In-process it is passed explicitly; at every network
//! boundary (sample writes, queries, notifications, inspection RPC) it is
//! carried in the [`TENANT_HEADER`] header. A boundary that forgets to
//! inject the tenant is a correctness bug, so the helpers here are the only
//! sanctioned way to read or write that header.

use http::header::{HeaderName, HeaderValue};
use tonic::metadata::MetadataValue;

/// Header key carrying the tenant identifier across HTTP and gRPC calls.
pub const TENANT_HEADER: &str = "x-oxrule-tenant";

/// Opaque tenant identifier.
pub type TenantId = String;

/// Errors raised by tenant propagation helpers.
#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    /// The request carried no tenant identifier.
    #[error("Tenant: no tenant id found in request")]
    Missing,

    /// The tenant identifier contains characters that cannot travel in a
    /// header or be used as a directory name.
    #[error("Tenant: invalid tenant id {0:?}")]
    Invalid(String),
}

/// Convenience `Result` alias for tenant operations.
pub type Result<T> = std::result::Result<T, TenantError>;

/// Validates a tenant identifier.
///
/// Tenant ids become path segments under the rule file root and header
/// values on outbound requests, so they must be non-empty, visible ASCII
/// and free of path separators.
pub fn validate(tenant: &str) -> Result<()> {
    if tenant.is_empty() {
        return Err(TenantError::Missing);
    }
    let ok = tenant
        .bytes()
        .all(|b| b.is_ascii_graphic() && b != b'/' && b != b'\\');
    if !ok {
        return Err(TenantError::Invalid(tenant.to_string()));
    }
    Ok(())
}

/// Injects the tenant id into an outbound HTTP header map.
pub fn inject_http(tenant: &str, headers: &mut http::HeaderMap) -> Result<()> {
    validate(tenant)?;
    let value =
        HeaderValue::from_str(tenant).map_err(|_| TenantError::Invalid(tenant.to_string()))?;
    headers.insert(HeaderName::from_static(TENANT_HEADER), value);
    Ok(())
}

/// Injects the tenant id into an outbound gRPC request's metadata.
pub fn inject_grpc<T>(tenant: &str, request: &mut tonic::Request<T>) -> Result<()> {
    validate(tenant)?;
    let value = MetadataValue::try_from(tenant)
        .map_err(|_| TenantError::Invalid(tenant.to_string()))?;
    request.metadata_mut().insert(TENANT_HEADER, value);
    Ok(())
}

/// Extracts the tenant id from an inbound gRPC request's metadata.
pub fn from_grpc<T>(request: &tonic::Request<T>) -> Result<TenantId> {
    let tenant = request
        .metadata()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(TenantError::Missing)?;
    validate(tenant)?;
    Ok(tenant.to_string())
}
