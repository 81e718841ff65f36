//! Error types for stride-agent

use thiserror::Error;

/// Result type alias using stride-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running expert graphs
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model layer
    #[error(transparent)]
    Ai(#[from] stride_ai::Error),

    /// The message log or interrupt protocol was violated
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A subgraph made more model calls than allowed
    #[error("Node '{node}' exceeded {limit} model calls")]
    MaxIterations { node: String, limit: u32 },

    /// A bounded tool was called past its limit
    #[error("Tool '{tool}' usage limit exceeded ({used}/{limit})")]
    ToolUsageExceeded { tool: String, used: u32, limit: u32 },

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resume requested for a thread with no checkpoint
    #[error("No checkpoint for thread '{0}'")]
    UnknownThread(String),

    /// Resume bundle names an interrupt that is not pending
    #[error("Interrupt '{0}' is not pending")]
    UnknownInterrupt(String),

    /// A generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error must abort the whole graph step.
    ///
    /// Non-fatal errors are recorded against the failing node and its
    /// siblings keep running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_)
                | Error::Checkpoint(_)
                | Error::Io(_)
                | Error::UnknownThread(_)
                | Error::UnknownInterrupt(_)
        )
    }
}
