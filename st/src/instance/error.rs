//! Errors from the instance channel

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while arbitrating or using the instance channel
///
/// None of these are fatal to the process: `NameTaken` drives role selection,
/// the rest are logged and dropped by the coordinator.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel name already taken: {0}")]
    NameTaken(String),

    #[error("No listener reachable at {}: {source}", path.display())]
    Unreachable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed before a message arrived")]
    Closed,

    #[error("Malformed message ({0} bytes)")]
    Malformed(usize),

    #[error("Message too large: more than {0} bytes")]
    TooLarge(usize),

    #[error("Invalid channel name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// True when the error means nobody answered on the other end
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout(_))
    }
}
