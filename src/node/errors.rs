use thiserror::Error;

/// Failures of the join/bootstrap protocol.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("a node cannot join itself")]
    SelfJoin,

    #[error("join rejected: expected app {expected:?}, got {actual:?}")]
    AppMismatch { expected: String, actual: String },

    #[error("no join target accepted within {elapsed_ms} ms ({accepted}/{required} seeds)")]
    Exhausted {
        elapsed_ms: u64,
        accepted: usize,
        required: usize,
    },

    #[error("node was destroyed while bootstrapping")]
    DestroyedDuringJoin,
}

impl JoinError {
    /// Stable wire/error kind for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            JoinError::SelfJoin => "invalid-join.source",
            JoinError::AppMismatch { .. } => "invalid-join.app",
            JoinError::Exhausted { .. } => "join.exhausted",
            JoinError::DestroyedDuringJoin => "join.destroyed",
        }
    }
}

/// Errors surfaced by the public node API.
///
/// Per-probe transport failures never appear here; they are input to the
/// failure detector, not errors of the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("protocol error: {0}")]
    Protocol(String),
}
