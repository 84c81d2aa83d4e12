//! Integration tests for the `st` binary
//!
//! Each test runs real processes against a private runtime directory, so the
//! single-instance behavior is exercised across process boundaries.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use assert_cmd::cargo::CommandCargoExt;
use predicates::prelude::*;
use tempfile::TempDir;

const NAME: &str = "X";

/// `st` with an isolated runtime dir and log location
fn st(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("st").expect("Failed to find st binary");
    cmd.env("XDG_DATA_HOME", temp.path().join("data"))
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .current_dir(temp.path())
        .args(["--name", NAME, "--runtime-dir"])
        .arg(temp.path().join("run"))
        .timeout(Duration::from_secs(10));
    cmd
}

/// Unstarted `st` process with the same isolation as [`st`]
fn st_process(temp: &TempDir) -> std::process::Command {
    let mut cmd = std::process::Command::cargo_bin("st").expect("Failed to find st binary");
    cmd.env("XDG_DATA_HOME", temp.path().join("data"))
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .current_dir(temp.path())
        .args(["--name", NAME, "--runtime-dir"])
        .arg(temp.path().join("run"))
        .stdout(Stdio::piped());
    cmd
}

/// A primary `st run` that has printed its startup line
///
/// Stdout stays open so the primary can print its final line when it exits.
struct RunningPrimary {
    child: Child,
    stdout: BufReader<ChildStdout>,
    started: Instant,
}

impl RunningPrimary {
    fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait for a normal exit and return the rest of its output
    fn finish(mut self) -> (ExitStatus, String) {
        let mut rest = String::new();
        self.stdout.read_to_string(&mut rest).expect("Failed to read primary output");
        let status = self.child.wait().expect("Failed to reap primary");
        (status, rest)
    }

    fn kill(mut self) {
        self.child.kill().expect("Failed to kill primary");
        self.child.wait().expect("Failed to reap primary");
    }
}

/// Start a primary with extra arguments and wait until it owns the channel
fn spawn_primary_with(temp: &TempDir, args: &[&str]) -> RunningPrimary {
    let mut child = st_process(temp).args(args).spawn().expect("Failed to spawn primary");

    let mut stdout = BufReader::new(child.stdout.take().expect("Primary stdout not captured"));
    let mut line = String::new();
    stdout.read_line(&mut line).expect("Failed to read primary output");
    assert!(line.contains("Shutdown timer running"), "unexpected primary output: {line}");

    RunningPrimary {
        child,
        stdout,
        started: Instant::now(),
    }
}

/// Start a long-running primary
fn spawn_primary(temp: &TempDir) -> RunningPrimary {
    spawn_primary_with(temp, &["run", "--duration-secs", "600"])
}

fn socket_path(temp: &TempDir) -> std::path::PathBuf {
    temp.path().join("run").join(format!("{NAME}.sock"))
}

#[test]
fn test_second_launch_restarts_primary_and_exits_zero() {
    let temp = TempDir::new().unwrap();
    let primary = spawn_primary(&temp);

    st(&temp)
        .assert()
        .success()
        .stdout(predicate::str::contains("countdown restarted"));

    st(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("running (PID: {})", primary.id())))
        .stdout(predicate::str::contains("Remaining time is logged every minute"));

    primary.kill();
}

#[test]
fn test_restart_command_reaches_primary() {
    let temp = TempDir::new().unwrap();
    let primary = spawn_primary(&temp);

    st(&temp)
        .arg("restart")
        .assert()
        .success()
        .stdout(predicate::str::contains("countdown restarted"));

    primary.kill();
}

#[test]
fn test_killed_primary_is_replaced() {
    let temp = TempDir::new().unwrap();
    let primary = spawn_primary(&temp);
    primary.kill();

    // SIGKILL leaves the socket file behind
    assert!(socket_path(&temp).exists());

    st(&temp)
        .args(["run", "--duration-secs", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Shutdown timer running"))
        .stdout(predicate::str::contains("Shutdown timer expired"));

    assert!(!socket_path(&temp).exists());
}

#[test]
fn test_restart_without_primary_exits_zero() {
    let temp = TempDir::new().unwrap();

    st(&temp)
        .arg("restart")
        .assert()
        .success()
        .stdout(predicate::str::contains("No shutdown timer is running"));
}

#[test]
fn test_status_without_primary() {
    let temp = TempDir::new().unwrap();

    st(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
fn test_expire_commands_run_from_config() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("expired marker");
    let config = temp.path().join("config.yml");
    std::fs::write(
        &config,
        format!(
            "timer:\n  duration-secs: 1\n  tick-ms: 100\n  expire-commands:\n    - [touch, \"{}\"]\n",
            marker.display()
        ),
    )
    .unwrap();

    st(&temp)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Shutdown timer expired"));

    assert!(marker.exists());
}

#[test]
fn test_second_launch_resets_primary_countdown() {
    let temp = TempDir::new().unwrap();
    let primary = spawn_primary_with(&temp, &["run", "--duration-secs", "2"]);

    std::thread::sleep(Duration::from_millis(1500));
    st(&temp)
        .assert()
        .success()
        .stdout(predicate::str::contains("countdown restarted"));

    let started = primary.started;
    let (status, output) = primary.finish();
    let lifetime = started.elapsed();

    assert!(status.success());
    assert!(output.contains("Shutdown timer expired"), "unexpected primary output: {output}");
    assert!(
        lifetime >= Duration::from_millis(3300),
        "primary exited after {lifetime:?}, countdown was not reset"
    );
}

#[test]
fn test_concurrent_launches_yield_one_primary() {
    let temp = TempDir::new().unwrap();

    let children: Vec<Child> = (0..6)
        .map(|_| {
            st_process(&temp)
                .args(["run", "--duration-secs", "1"])
                .spawn()
                .expect("Failed to spawn st")
        })
        .collect();

    let outputs: Vec<_> = children
        .into_iter()
        .map(|child| child.wait_with_output().expect("Failed to wait for st"))
        .collect();

    assert!(outputs.iter().all(|output| output.status.success()));

    let stdouts: Vec<String> = outputs
        .iter()
        .map(|output| String::from_utf8_lossy(&output.stdout).into_owned())
        .collect();
    let primaries = stdouts.iter().filter(|out| out.contains("Shutdown timer running")).count();
    let restarted = stdouts.iter().filter(|out| out.contains("countdown restarted")).count();
    assert_eq!(primaries, 1, "outputs: {stdouts:?}");
    assert_eq!(restarted, 5, "outputs: {stdouts:?}");
}

#[test]
fn test_cancel_stops_primary_without_expiring() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("expired");
    let config = temp.path().join("config.yml");
    std::fs::write(
        &config,
        format!("timer:\n  expire-commands:\n    - [touch, \"{}\"]\n", marker.display()),
    )
    .unwrap();

    let config_arg = config.display().to_string();
    let primary = spawn_primary_with(&temp, &["--config", config_arg.as_str(), "run", "--duration-secs", "600"]);
    let pid = primary.id();

    st(&temp)
        .arg("cancel")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("cancelled (was PID: {pid})")));

    let (status, output) = primary.finish();
    assert!(status.success());
    assert!(output.contains("Shutdown timer stopped"), "unexpected primary output: {output}");
    assert!(!marker.exists());

    st(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
fn test_cancel_without_primary_exits_zero() {
    let temp = TempDir::new().unwrap();

    st(&temp)
        .arg("cancel")
        .assert()
        .success()
        .stdout(predicate::str::contains("No shutdown timer is running"));
}

#[test]
fn test_channel_is_released_before_expire_commands() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.yml");
    std::fs::write(
        &config,
        "timer:\n  duration-secs: 1\n  tick-ms: 100\n  expire-commands:\n    - [sleep, \"2\"]\n",
    )
    .unwrap();

    let config_arg = config.display().to_string();
    let primary = spawn_primary_with(&temp, &["--config", config_arg.as_str()]);

    // Expired at about 1s, expire command runs until about 3s
    std::thread::sleep(Duration::from_millis(1600));
    st(&temp)
        .arg("restart")
        .assert()
        .success()
        .stdout(predicate::str::contains("No shutdown timer is running"));

    let (status, output) = primary.finish();
    assert!(status.success());
    assert!(output.contains("Shutdown timer expired"), "unexpected primary output: {output}");
}
