/// Errors that can occur within the notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Notifier configuration is invalid; surfaced at construction and
    /// treated as a programmer error by the caller.
    #[error("Notify: invalid notifier configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to a receiver failed.
    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// DNS-SRV target discovery failed.
    #[error("Notify: receiver discovery failed: {0}")]
    Resolve(String),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
