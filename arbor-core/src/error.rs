use thiserror::Error;

use crate::ids::ModelId;
use crate::lock::LockState;

/// Errors surfaced by session operations.
///
/// None of these are fatal: the cached tree and message log are left as they
/// were and the user may retry.
#[derive(Debug, Error)]
pub enum ArborError {
    /// The backend could not be reached or answered with garbage
    #[error("request failed: {0}")]
    Transport(String),

    /// The backend answered `success: false`
    #[error("server rejected the request: {0}")]
    Rejected(String),

    #[error("sending is not permitted: {0}")]
    Locked(LockState),

    #[error("no viewport for model {0}")]
    UnknownViewport(ModelId),

    #[error("malformed tree payload: {0}")]
    MalformedTree(String),
}

impl ArborError {
    pub fn transport(err: anyhow::Error) -> Self {
        Self::Transport(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, ArborError>;
