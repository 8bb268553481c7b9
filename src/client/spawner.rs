//! Server process spawner.
//!
//! Launches a server with all three standard streams piped:
//! - stdin carries outbound NDJSON;
//! - stdout carries inbound NDJSON (plus whatever text the server prints);
//! - stderr is drained and discarded so a chatty server never blocks on a
//!   full pipe.
//!
//! Environment overrides from [`ServerConfig::env`] are laid over the
//! ambient environment. Children are spawned with `kill_on_drop(true)`.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::{AppError, Result};

/// Time between closing a server's stdin and force-killing it.
pub const GRACE_PERIOD: Duration = Duration::from_millis(500);

/// A freshly spawned server with its captured streams.
#[derive(Debug)]
pub struct ServerProcess {
    /// Child process handle.
    pub child: Child,
    /// Server's stdin for outbound messages.
    pub stdin: ChildStdin,
    /// Server's stdout for inbound messages.
    pub stdout: ChildStdout,
    /// Server's stderr, to be drained.
    pub stderr: ChildStderr,
}

/// Spawn the server described by `config`.
///
/// # Errors
///
/// - `AppError::Spawn("failed to spawn …")`: OS spawn failure (missing
///   executable, permissions).
/// - `AppError::Spawn("failed to capture …")`: a stdio pipe was not created.
pub fn spawn_server(server: &str, config: &ServerConfig) -> Result<ServerProcess> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!(
            "failed to spawn server '{server}' ({}): {err}",
            config.command
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn(format!("failed to capture stdin of '{server}'")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn(format!("failed to capture stdout of '{server}'")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn(format!("failed to capture stderr of '{server}'")))?;

    info!(
        server,
        command = %config.command,
        pid = child.id(),
        "server process spawned"
    );

    Ok(ServerProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Read and discard everything the server writes to `stderr` until EOF.
///
/// The diagnostic stream is never parsed.
pub async fn drain_stderr<R>(server: String, mut stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0_u8; 4096];
    let mut total = 0_usize;
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) => {
                trace!(server, %err, "stderr drain: read failed, stopping");
                break;
            }
        }
    }
    trace!(server, bytes = total, "stderr drain: stream closed");
}

/// Spawn a background task that owns `child` until it exits.
///
/// - If the child exits on its own, `on_exit` receives an
///   [`AppError::Transport`] describing the exit.
/// - If `shutdown` fires first, the task waits up to [`GRACE_PERIOD`] for
///   the child to exit after its stdin closes, then kills it. `on_exit` is
///   not called on this path, and kill errors are swallowed.
#[must_use]
pub fn monitor_exit<F>(
    server: String,
    mut child: Child,
    shutdown: CancellationToken,
    on_exit: F,
) -> JoinHandle<()>
where
    F: FnOnce(AppError) + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let reason = match result {
                    Ok(status) => status.code().map_or_else(
                        || "server exited: terminated by signal".to_owned(),
                        |code| format!("server exited with code {code}"),
                    ),
                    Err(err) => {
                        warn!(server, %err, "error waiting for server process");
                        format!("server wait error: {err}")
                    }
                };
                info!(server, reason, "server process exited");
                on_exit(AppError::Transport(reason));
            }
            () = shutdown.cancelled() => {
                match tokio::time::timeout(GRACE_PERIOD, child.wait()).await {
                    Ok(_) => debug!(server, "server exited after stdin closed"),
                    Err(_elapsed) => {
                        debug!(server, "grace period elapsed, killing server");
                        if let Err(err) = child.kill().await {
                            debug!(server, %err, "kill failed; process likely already gone");
                        }
                    }
                }
            }
        }
    })
}
