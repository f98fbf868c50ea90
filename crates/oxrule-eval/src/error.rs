use std::path::PathBuf;

/// Errors that can occur while managing a tenant's evaluator.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// A rule file could not be read from disk.
    #[error("Eval: failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A rule file did not parse as a rule document.
    #[error("Eval: failed to parse rule file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Registering per-tenant metrics failed; indicates a programming
    /// mistake (duplicate registration), not an operational condition.
    #[error("Eval: metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Convenience `Result` alias for evaluator operations.
pub type Result<T> = std::result::Result<T, EvalError>;
