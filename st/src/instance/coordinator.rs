//! Primary/secondary arbitration
//!
//! [`Coordinator::acquire`] is called once at startup. Whoever gets the listener
//! is the primary; everyone else forwards `RESTART` and is expected to exit.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::channel::{Connection, Listener, connect, listen};
use super::error::ChannelError;
use super::messages::ControlMessage;
use super::Endpoint;

/// Default bound on reaching the primary
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default bound on reading one inbound message
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pause between connect attempts while a fresh primary binds its socket
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Which side of the rendezvous this process ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

/// Outcome of a secondary's notification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Undelivered,
}

/// Whether a live primary currently answers on the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Vacant,
    Owned { pid: Option<u32> },
}

/// Result of [`Coordinator::acquire`]
#[derive(Debug)]
pub enum Instance {
    Primary(Primary),
    Secondary(Delivery),
}

impl Instance {
    pub fn role(&self) -> Role {
        match self {
            Self::Primary(_) => Role::Primary,
            Self::Secondary(_) => Role::Secondary,
        }
    }
}

/// Decides the role of this process for one endpoint
#[derive(Debug, Clone)]
pub struct Coordinator {
    endpoint: Endpoint,
    connect_timeout: Duration,
    read_timeout: Duration,
    reclaim_unreachable: bool,
}

impl Coordinator {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reclaim_unreachable: true,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Retry the bind once when the current owner cannot be reached
    pub fn with_reclaim(mut self, reclaim: bool) -> Self {
        self.reclaim_unreachable = reclaim;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Become the primary, or notify the existing one
    ///
    /// Only IO failures while setting up the listener are returned as errors.
    /// A secondary that cannot reach the primary still gets
    /// `Instance::Secondary(Delivery::Undelivered)`.
    ///
    /// Reaching the owner is bounded by the connect timeout as a whole. With
    /// reclaim enabled the first attempt gets half of it and the attempt after
    /// the retried bind gets the rest.
    pub async fn acquire(&self) -> Result<Instance, ChannelError> {
        debug!(name = %self.endpoint.name(), "Coordinator::acquire: called");
        let deadline = Instant::now() + self.connect_timeout;
        let mut reclaim_attempted = false;

        loop {
            match listen(&self.endpoint) {
                Ok(listener) => {
                    info!(name = %self.endpoint.name(), "Acquired instance channel, running as primary");
                    return Ok(Instance::Primary(Primary {
                        listener,
                        read_timeout: self.read_timeout,
                    }));
                }
                Err(ChannelError::NameTaken(_)) => {
                    debug!("Coordinator::acquire: name taken, notifying owner");
                }
                Err(e) => return Err(e),
            }

            let can_reclaim = self.reclaim_unreachable && !reclaim_attempted;
            let budget = if can_reclaim {
                self.connect_timeout / 2
            } else {
                deadline.saturating_duration_since(Instant::now())
            };

            match self.notify_within(ControlMessage::Restart, budget).await {
                Ok(()) => {
                    info!(name = %self.endpoint.name(), "Forwarded restart to primary");
                    return Ok(Instance::Secondary(Delivery::Delivered));
                }
                Err(e) if can_reclaim && e.is_unreachable() => {
                    warn!(error = %e, "Primary unreachable, retrying ownership");
                    reclaim_attempted = true;
                }
                Err(e) => {
                    warn!(error = %e, "Primary unreachable, restart not delivered");
                    return Ok(Instance::Secondary(Delivery::Undelivered));
                }
            }
        }
    }

    /// Send `message` to the current owner
    ///
    /// Missing or refusing sockets are retried until the connect timeout runs
    /// out: the owner takes its lock slightly before its socket is bound.
    pub async fn notify(&self, message: ControlMessage) -> Result<(), ChannelError> {
        self.notify_within(message, self.connect_timeout).await
    }

    async fn notify_within(&self, message: ControlMessage, budget: Duration) -> Result<(), ChannelError> {
        debug!(%message, ?budget, "Coordinator::notify_within: called");
        let deadline = Instant::now() + budget;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match connect(&self.endpoint, remaining).await {
                Ok(conn) => return conn.write_message(message.as_bytes(), self.connect_timeout).await,
                Err(e @ ChannelError::Timeout(_)) => return Err(e),
                Err(e) => {
                    if Instant::now() + RETRY_INTERVAL >= deadline {
                        return Err(e);
                    }
                    debug!(error = %e, "Coordinator::notify_within: owner not reachable yet, retrying");
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    /// Probe for a live primary without disturbing it
    ///
    /// The probe opens and immediately closes a connection, which the primary
    /// reads as an empty message and ignores.
    pub async fn ownership(&self) -> Ownership {
        match connect(&self.endpoint, self.connect_timeout).await {
            Ok(conn) => {
                drop(conn);
                let pid = fs::read_to_string(self.endpoint.lock_path())
                    .ok()
                    .and_then(|s| s.trim().parse().ok());
                Ownership::Owned { pid }
            }
            Err(e) => {
                debug!(error = %e, "Coordinator::ownership: no primary");
                Ownership::Vacant
            }
        }
    }
}

/// Listening side, held by the primary for the life of the process
#[derive(Debug)]
pub struct Primary {
    listener: Listener,
    read_timeout: Duration,
}

impl Primary {
    pub fn endpoint(&self) -> &Endpoint {
        self.listener.endpoint()
    }

    /// Accept connections until `shutdown_rx` fires or its sender is dropped
    ///
    /// Each connection is read on its own task so a stalled client cannot hold
    /// up `accept`. `on_restart` runs on that task once per valid `RESTART`;
    /// anything else is logged and dropped. The name is released on return.
    pub async fn serve<F>(self, on_restart: F, mut shutdown_rx: mpsc::Receiver<()>)
    where
        F: Fn() + Send + Sync + 'static,
    {
        info!(socket = ?self.endpoint().socket_path(), "Listening for restart requests");
        let on_restart = Arc::new(on_restart);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok(conn) => {
                            debug!("Primary::serve: connection accepted");
                            in_flight.spawn(handle_connection(conn, self.read_timeout, Arc::clone(&on_restart)));
                        }
                        Err(e) => {
                            warn!(error = %e, "Primary::serve: accept error");
                            tokio::time::sleep(RETRY_INTERVAL).await;
                        }
                    }
                }

                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}

                _ = shutdown_rx.recv() => {
                    debug!("Primary::serve: shutdown signal received");
                    break;
                }
            }
        }

        in_flight.abort_all();
        self.listener.close();
        info!("Instance channel released");
    }

    /// Run [`Primary::serve`] on a background task
    pub fn spawn<F>(self, on_restart: F) -> ServeHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.serve(on_restart, shutdown_rx));
        ServeHandle { shutdown_tx, task }
    }
}

async fn handle_connection<F>(mut conn: Connection, timeout: Duration, on_restart: Arc<F>)
where
    F: Fn() + Send + Sync,
{
    let payload = match conn.read_message(timeout).await {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "handle_connection: no message received");
            return;
        }
    };

    match ControlMessage::parse(&payload) {
        Ok(ControlMessage::Restart) => {
            debug!("handle_connection: restart received");
            on_restart();
        }
        Err(e) => debug!(error = %e, "handle_connection: ignoring message"),
    }
}

/// Handle to a primary served in the background
#[derive(Debug)]
pub struct ServeHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ServeHandle {
    /// Stop accepting and wait until the name is released
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Instance listener task failed");
        }
    }
}
