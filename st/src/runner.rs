//! Primary run loop
//!
//! Owns the [`Countdown`] and multiplexes timer ticks, restart requests from
//! the instance channel, and process shutdown. Nothing else mutates the
//! countdown.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::timer::{Countdown, TickOutcome};

/// What to do when the countdown reaches zero
#[async_trait]
pub trait ExpireAction: Send + Sync {
    async fn on_expire(&self);
}

/// Runs a list of commands, each given as an argument vector
///
/// Commands are spawned directly, never through a shell. Failures are logged
/// and the next command still runs.
#[derive(Debug, Clone, Default)]
pub struct CommandAction {
    commands: Vec<Vec<String>>,
    gap: Duration,
}

impl CommandAction {
    pub fn new(commands: Vec<Vec<String>>, gap: Duration) -> Self {
        Self { commands, gap }
    }
}

#[async_trait]
impl ExpireAction for CommandAction {
    async fn on_expire(&self) {
        debug!(count = self.commands.len(), "CommandAction::on_expire: called");
        for (index, argv) in self.commands.iter().enumerate() {
            if index > 0 && !self.gap.is_zero() {
                tokio::time::sleep(self.gap).await;
            }

            let Some((program, args)) = argv.split_first() else {
                warn!(index, "Skipping empty expire command");
                continue;
            };

            match Command::new(program).args(args).status().await {
                Ok(status) if status.success() => info!(%program, "Expire command finished"),
                Ok(status) => warn!(%program, code = ?status.code(), "Expire command failed"),
                Err(e) => warn!(%program, error = %e, "Failed to spawn expire command"),
            }
        }
    }
}

/// Why [`Runner::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Expired,
    Stopped,
}

pub struct Runner<A> {
    countdown: Countdown,
    tick: Duration,
    action: A,
}

impl<A: ExpireAction> Runner<A> {
    pub fn new(countdown: Countdown, tick: Duration, action: A) -> Self {
        Self {
            countdown,
            tick: tick.max(Duration::from_millis(1)),
            action,
        }
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Count down until expiry or shutdown
    ///
    /// A restart resets the countdown and the tick phase, like pressing the
    /// restart button on a stopwatch. Closed restart senders are ignored; a
    /// closed shutdown sender stops the loop.
    ///
    /// The expire action is not run here. Callers release the instance channel
    /// first and then call [`Runner::expire`], so a late `RESTART` finds no
    /// listener instead of being acknowledged and lost.
    pub async fn run(&mut self, mut restarts: mpsc::Receiver<()>, mut shutdown_rx: mpsc::Receiver<()>) -> RunOutcome {
        info!(duration = ?self.countdown.duration(), tick = ?self.tick, "Countdown started");
        let mut interval = tokio::time::interval_at(Instant::now() + self.tick, self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.countdown.tick(self.tick) {
                        TickOutcome::Running { remaining } => {
                            debug!(?remaining, progress = self.countdown.progress(), "Runner::run: tick");
                            if remaining.subsec_nanos() == 0 && remaining.as_secs() % 60 == 0 {
                                info!("{}", self.countdown.status_text());
                            }
                        }
                        TickOutcome::Expired => {
                            info!("Countdown expired");
                            return RunOutcome::Expired;
                        }
                    }
                }

                Some(()) = restarts.recv() => {
                    info!(elapsed = ?self.countdown.elapsed(), "Restart requested");
                    self.countdown.restart();
                    interval.reset();
                }

                _ = shutdown_rx.recv() => {
                    info!(remaining = ?self.countdown.remaining(), "Countdown stopped");
                    return RunOutcome::Stopped;
                }
            }
        }
    }

    /// Run the expire action once the countdown has reached zero
    pub async fn expire(&self) {
        if !self.countdown.is_expired() {
            warn!(remaining = ?self.countdown.remaining(), "Runner::expire: countdown still running, ignoring");
            return;
        }
        self.action.on_expire().await;
    }
}
