//! Single-instance coordination
//!
//! Every launch tries to take exclusive ownership of a named rendezvous point.
//! The winner becomes the primary and listens for control messages; every
//! other launch becomes a secondary, forwards `RESTART` to the primary and
//! exits.
//!
//! On disk a rendezvous point is two files in the runtime directory:
//!
//! - `<name>.lock` - held with an exclusive `flock` by the primary. The kernel
//!   drops the lock when the process dies, so a crashed primary never leaves
//!   stale ownership behind. The file itself is never deleted.
//! - `<name>.sock` - Unix domain socket the primary accepts on. Only the lock
//!   holder may create or remove it.

use std::fmt;
use std::path::{Path, PathBuf};

pub mod channel;
pub mod coordinator;
pub mod error;
pub mod messages;

pub use channel::{Connection, Listener, connect, listen};
pub use coordinator::{Coordinator, Delivery, Instance, Ownership, Primary, Role, ServeHandle};
pub use error::ChannelError;
pub use messages::{ControlMessage, RESTART_PAYLOAD};

/// Name every instance of the timer rendezvous on unless configured otherwise
pub const DEFAULT_CHANNEL_NAME: &str = "shutdown-timer-instance";

const MAX_NAME_LEN: usize = 64;

/// Validated name of a rendezvous point
///
/// Names become file names, so they are restricted to a conservative charset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Result<Self, ChannelError> {
        let name = name.into();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if name.is_empty() || name.len() > MAX_NAME_LEN || !valid_chars || name.starts_with('.') {
            return Err(ChannelError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChannelName {
    fn default() -> Self {
        Self(DEFAULT_CHANNEL_NAME.to_string())
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filesystem location of a rendezvous point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    name: ChannelName,
    socket_path: PathBuf,
    lock_path: PathBuf,
}

impl Endpoint {
    /// Endpoint for `name` inside `dir`
    pub fn new(name: ChannelName, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            socket_path: dir.join(format!("{}.sock", name)),
            lock_path: dir.join(format!("{}.lock", name)),
            name,
        }
    }

    /// Endpoint for `name` inside the default runtime directory
    pub fn in_runtime_dir(name: ChannelName) -> Self {
        Self::new(name, default_runtime_dir())
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Directory holding both files
    pub fn dir(&self) -> Option<&Path> {
        self.lock_path.parent()
    }
}

/// Directory used for rendezvous files when none is configured
pub fn default_runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("shutdown-timer")
}
