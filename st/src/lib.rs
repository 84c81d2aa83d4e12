//! Shutdown Timer - countdown to shutdown with single-instance restart
//!
//! The first launch owns a named local channel and runs the countdown. Any
//! later launch finds the channel taken, sends `RESTART` to the owner and
//! exits, so launching the timer twice resets it instead of starting a
//! second one.
//!
//! # Modules
//!
//! - [`instance`] - Rendezvous channel and primary/secondary arbitration
//! - [`timer`] - Countdown state
//! - [`runner`] - Primary run loop and expiry actions
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod instance;
pub mod runner;
pub mod timer;

pub use config::{Config, InstanceConfig, TimerConfig};
pub use instance::{
    ChannelError, ChannelName, ControlMessage, Coordinator, Delivery, Endpoint, Instance, Ownership, Primary, Role,
};
pub use runner::{CommandAction, ExpireAction, RunOutcome, Runner};
pub use timer::{Countdown, TickOutcome};
