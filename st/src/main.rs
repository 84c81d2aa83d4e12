//! Shutdown Timer
//!
//! CLI entry point. The first launch runs the countdown; later launches restart
//! it and exit.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use nix::sys::signal::{Signal as UnixSignal, kill};
use nix::unistd::Pid;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use shutdowntimer::cli::{Cli, Command, generate_after_help, get_log_path};
use shutdowntimer::config::Config;
use shutdowntimer::instance::{ControlMessage, Coordinator, Delivery, Instance, Ownership};
use shutdowntimer::runner::{CommandAction, RunOutcome, Runner};
use shutdowntimer::timer::Countdown;

/// Restart requests buffered between the listener and the countdown owner.
/// Restarts are idempotent, so requests beyond this are dropped.
const RESTART_QUEUE: usize = 8;

/// How often `cancel` checks whether the primary has let go of the channel
const CANCEL_POLL: Duration = Duration::from_millis(100);
const CANCEL_ATTEMPTS: u32 = 50;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shutdown-timer")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    // Append: primary and secondary instances share the file
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("shutdown-timer.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!(pid = std::process::id(), "Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let coordinator = Coordinator::new(config.instance.endpoint()?)
        .with_connect_timeout(config.instance.connect_timeout())
        .with_read_timeout(config.instance.read_timeout())
        .with_reclaim(config.instance.reclaim_unreachable);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        None | Some(Command::Run { .. }) => cmd_run(&config, &coordinator).await,
        Some(Command::Restart) => cmd_restart(&coordinator).await,
        Some(Command::Status) => cmd_status(&coordinator).await,
        Some(Command::Cancel) => cmd_cancel(&coordinator).await,
    }
}

/// Run the countdown, or restart the one already running
async fn cmd_run(config: &Config, coordinator: &Coordinator) -> Result<()> {
    debug!("cmd_run: called");
    let primary = match coordinator
        .acquire()
        .await
        .context("Failed to set up instance channel")?
    {
        Instance::Primary(primary) => primary,
        Instance::Secondary(delivery) => {
            print_delivery(delivery);
            return Ok(());
        }
    };

    // Register handlers before the countdown starts so a failure here is fatal
    let sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let signals = tokio::spawn(forward_shutdown_signal(sigint, sigterm, shutdown_tx));

    let (restart_tx, restart_rx) = mpsc::channel::<()>(RESTART_QUEUE);
    let server = primary.spawn(move || {
        let _ = restart_tx.try_send(());
    });

    let countdown = Countdown::new(config.timer.duration());
    println!("Shutdown timer running ({})", countdown.status_text());

    let action = CommandAction::new(config.timer.expire_commands.clone(), config.timer.expire_command_gap());
    let mut runner = Runner::new(countdown, config.timer.tick(), action);
    let outcome = runner.run(restart_rx, shutdown_rx).await;

    // Release the name before expiring so later launches become primary
    signals.abort();
    server.shutdown().await;

    match outcome {
        RunOutcome::Expired => {
            runner.expire().await;
            println!("Shutdown timer expired");
        }
        RunOutcome::Stopped => println!("Shutdown timer stopped"),
    }
    Ok(())
}

/// Restart the running countdown; never becomes the primary
async fn cmd_restart(coordinator: &Coordinator) -> Result<()> {
    debug!("cmd_restart: called");
    match coordinator.notify(ControlMessage::Restart).await {
        Ok(()) => print_delivery(Delivery::Delivered),
        Err(e) => {
            warn!(error = %e, "cmd_restart: restart not delivered");
            println!("No shutdown timer is running");
        }
    }
    Ok(())
}

/// Report whether a primary is running
async fn cmd_status(coordinator: &Coordinator) -> Result<()> {
    debug!("cmd_status: called");
    match coordinator.ownership().await {
        Ownership::Owned { pid } => {
            match pid {
                Some(pid) => println!("Shutdown timer is running (PID: {})", pid),
                None => println!("Shutdown timer is running"),
            }
            println!("Remaining time is logged every minute to {}", get_log_path().display());
        }
        Ownership::Vacant => println!("Shutdown timer is not running"),
    }
    Ok(())
}

/// Stop the running countdown; the primary exits without expiring
async fn cmd_cancel(coordinator: &Coordinator) -> Result<()> {
    debug!("cmd_cancel: called");
    let pid = match coordinator.ownership().await {
        Ownership::Vacant => {
            println!("No shutdown timer is running");
            return Ok(());
        }
        Ownership::Owned { pid: None } => {
            return Err(eyre::eyre!("Shutdown timer is running but its PID is unknown"));
        }
        Ownership::Owned { pid: Some(pid) } => pid,
    };

    info!(pid, "Cancelling shutdown timer");
    debug!(pid, "cmd_cancel: sending SIGTERM");
    kill(Pid::from_raw(pid as i32), UnixSignal::SIGTERM).context("Failed to send SIGTERM")?;

    let mut attempts = 0;
    while coordinator.ownership().await != Ownership::Vacant {
        if attempts >= CANCEL_ATTEMPTS {
            return Err(eyre::eyre!("Shutdown timer (PID: {}) did not stop", pid));
        }
        tokio::time::sleep(CANCEL_POLL).await;
        attempts += 1;
    }
    debug!(attempts, "cmd_cancel: primary released the channel");

    println!("Shutdown timer cancelled (was PID: {})", pid);
    Ok(())
}

fn print_delivery(delivery: Delivery) {
    match delivery {
        Delivery::Delivered => println!("Shutdown timer already running; countdown restarted"),
        Delivery::Undelivered => println!("Shutdown timer already running but not responding; countdown not restarted"),
    }
}

async fn forward_shutdown_signal(mut sigint: Signal, mut sigterm: Signal, shutdown_tx: mpsc::Sender<()>) {
    tokio::select! {
        _ = sigint.recv() => warn!("SIGINT received"),
        _ = sigterm.recv() => warn!("SIGTERM received"),
    }
    let _ = shutdown_tx.send(()).await;
}
