//! Error types for Faderworks

use thiserror::Error;

use crate::ChannelId;

/// Core error type
#[derive(Error, Debug)]
pub enum FwError {
    #[error("channel not found: {0:?}")]
    ChannelNotFound(ChannelId),

    #[error("cannot route channel {0:?} to itself")]
    SelfReference(ChannelId),

    #[error("route {from:?} -> {to:?} already exists")]
    DuplicateRoute { from: ChannelId, to: ChannelId },

    #[error("command queue full")]
    QueueFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("state error: {0}")]
    State(String),
}

/// Result type alias
pub type FwResult<T> = Result<T, FwError>;
