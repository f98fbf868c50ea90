/// Errors that can occur within the ring subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// No healthy replica is registered in the ring.
    #[error("Ring: no healthy replicas in the ring")]
    Empty,

    /// The backing key-value store failed.
    #[error("Ring: kv store error: {0}")]
    Kv(String),

    /// The replica is not registered (e.g. deregistered twice).
    #[error("Ring: replica '{0}' is not registered")]
    NotRegistered(String),
}

/// Convenience `Result` alias for ring operations.
pub type Result<T> = std::result::Result<T, RingError>;
