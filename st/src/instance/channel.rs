//! Named local message channel
//!
//! Thin layer over Unix domain sockets plus an advisory lock file. The lock,
//! not the socket path, decides who owns a name: binding a socket path that
//! already exists would fail for a crashed owner too, while a `flock` dies
//! with its process.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::time::Duration;

use fs2::FileExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::Endpoint;
use super::error::ChannelError;

/// Largest payload a listener will buffer from one connection
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Exclusive owner of an endpoint
///
/// Dropping the listener removes the socket file and then releases the lock,
/// so the name can be reclaimed by the next launch.
#[derive(Debug)]
pub struct Listener {
    inner: UnixListener,
    endpoint: Endpoint,
    // Released when the listener drops, after the socket file is gone
    _lock: File,
}

/// Take exclusive ownership of `endpoint` and start listening on it
///
/// Must be called from within a tokio runtime.
pub fn listen(endpoint: &Endpoint) -> Result<Listener, ChannelError> {
    debug!(socket = ?endpoint.socket_path(), "listen: called");

    if let Some(dir) = endpoint.dir() {
        fs::create_dir_all(dir)?;
    }

    let lock = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(endpoint.lock_path())?;

    if let Err(e) = lock.try_lock_exclusive() {
        if e.kind() == fs2::lock_contended_error().kind() {
            debug!(name = %endpoint.name(), "listen: lock held by another process");
            return Err(ChannelError::NameTaken(endpoint.name().to_string()));
        }
        return Err(e.into());
    }

    // Owner pid is informational only; the lock is what counts
    lock.set_len(0)?;
    (&lock).write_all(std::process::id().to_string().as_bytes())?;

    // Holding the lock means any socket file left here belongs to a dead owner
    match fs::remove_file(endpoint.socket_path()) {
        Ok(()) => debug!(socket = ?endpoint.socket_path(), "listen: removed stale socket"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let inner = UnixListener::bind(endpoint.socket_path())?;
    debug!(socket = ?endpoint.socket_path(), "listen: socket bound");

    Ok(Listener {
        inner,
        endpoint: endpoint.clone(),
        _lock: lock,
    })
}

impl Listener {
    /// Wait for the next inbound connection
    pub async fn accept(&self) -> Result<Connection, ChannelError> {
        let (stream, _addr) = self.inner.accept().await?;
        Ok(Connection { stream })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Release the name
    pub fn close(self) {
        debug!(name = %self.endpoint.name(), "Listener::close: called");
        drop(self);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        match fs::remove_file(self.endpoint.socket_path()) {
            Ok(()) => debug!(socket = ?self.endpoint.socket_path(), "Listener: socket removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(socket = ?self.endpoint.socket_path(), error = %e, "Failed to remove socket file"),
        }
    }
}

/// Connect to whoever listens on `endpoint`
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Connection, ChannelError> {
    debug!(socket = ?endpoint.socket_path(), ?timeout, "connect: called");
    match tokio::time::timeout(timeout, UnixStream::connect(endpoint.socket_path())).await {
        Ok(Ok(stream)) => Ok(Connection { stream }),
        Ok(Err(source)) => Err(ChannelError::Unreachable {
            path: endpoint.socket_path().to_path_buf(),
            source,
        }),
        Err(_) => Err(ChannelError::Timeout(timeout)),
    }
}

/// One side of a single-message exchange
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
}

impl Connection {
    /// Read everything the peer sends until it closes its write half
    pub async fn read_message(&mut self, timeout: Duration) -> Result<Vec<u8>, ChannelError> {
        let mut payload = Vec::new();
        let limit = (MAX_MESSAGE_SIZE + 1) as u64;

        let read = tokio::time::timeout(timeout, (&mut self.stream).take(limit).read_to_end(&mut payload))
            .await
            .map_err(|_| ChannelError::Timeout(timeout))??;

        if read == 0 {
            return Err(ChannelError::Closed);
        }
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ChannelError::TooLarge(MAX_MESSAGE_SIZE));
        }

        debug!(bytes = payload.len(), "Connection::read_message: complete");
        Ok(payload)
    }

    /// Send `payload`, flush, and close the connection
    pub async fn write_message(mut self, payload: &[u8], timeout: Duration) -> Result<(), ChannelError> {
        tokio::time::timeout(timeout, async {
            self.stream.write_all(payload).await?;
            self.stream.flush().await?;
            self.stream.shutdown().await
        })
        .await
        .map_err(|_| ChannelError::Timeout(timeout))??;

        debug!(bytes = payload.len(), "Connection::write_message: sent");
        Ok(())
    }
}
