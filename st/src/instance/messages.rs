//! Control messages exchanged between instances
//!
//! One message per connection, no length prefix: the sender closes its write
//! half and the end of the stream marks the message boundary. That only works
//! because every message is a fixed literal; switch to length-prefixed frames
//! before adding a variant that carries data.

use std::fmt;

use super::error::ChannelError;

/// Wire bytes of [`ControlMessage::Restart`]
pub const RESTART_PAYLOAD: &[u8] = b"RESTART";

/// Signals a secondary instance can send to the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Reset the primary's countdown to zero elapsed time
    Restart,
}

impl ControlMessage {
    /// Encoded form sent on the wire
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Restart => RESTART_PAYLOAD,
        }
    }

    /// Decode a complete payload
    ///
    /// Matching is exact: no trimming, no case folding, no trailing newline.
    pub fn parse(payload: &[u8]) -> Result<Self, ChannelError> {
        match payload {
            RESTART_PAYLOAD => Ok(Self::Restart),
            other => Err(ChannelError::Malformed(other.len())),
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restart => write!(f, "restart"),
        }
    }
}
