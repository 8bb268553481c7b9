//! Stdio transport: one server process and the tasks that service it.
//!
//! [`Transport::start`] spawns the server and four detached tasks sharing a
//! single shutdown [`CancellationToken`]:
//!
//! | Task          | Role                                               |
//! |---------------|----------------------------------------------------|
//! | reader        | stdout → [`NdjsonCodec`](super::codec) → dispatch  |
//! | writer        | outbound queue → stdin                             |
//! | stderr drain  | discards diagnostic output                         |
//! | exit monitor  | owns the child; grace-period kill on shutdown      |
//!
//! The failure hook fires at most once, and only when the reader stops:
//! stdout has reached EOF or failed. Every response the server wrote before
//! exiting is therefore dispatched before pending requests are rejected.
//! Process exit and writer failure only record the cause that the hook
//! reports; an exit status observed within [`EXIT_STATUS_WAIT`] of EOF
//! takes precedence over the bare `"stream closed"`. Shutdown via
//! [`Transport::terminate`] does not fire the hook.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::lock;
use crate::client::message::Message;
use crate::client::reader::run_reader;
use crate::client::spawner::{drain_stderr, monitor_exit, spawn_server};
use crate::client::writer::run_writer;
use crate::config::ServerConfig;
use crate::{AppError, Result};

/// Capacity of the outbound message queue.
const OUTBOUND_CAPACITY: usize = 64;

/// How long the reader waits after EOF for the process exit status.
pub const EXIT_STATUS_WAIT: Duration = Duration::from_millis(500);

type FailureCallback = Box<dyn FnOnce(AppError) + Send>;

/// Single-shot failure callback shared by the transport's tasks, plus the
/// best cause recorded so far.
#[derive(Clone)]
struct FailureHook {
    callback: Arc<Mutex<Option<FailureCallback>>>,
    cause: Arc<Mutex<Option<AppError>>>,
}

impl FailureHook {
    fn new<G>(on_failure: G) -> Self
    where
        G: FnOnce(AppError) + Send + 'static,
    {
        Self {
            callback: Arc::new(Mutex::new(Some(Box::new(on_failure)))),
            cause: Arc::new(Mutex::new(None)),
        }
    }

    /// Record `err` unless a cause is already known.
    fn note(&self, err: AppError) {
        lock(&self.cause).get_or_insert(err);
    }

    /// Record the process exit, replacing any stream-level cause.
    fn note_exit(&self, err: AppError) {
        *lock(&self.cause) = Some(err);
    }

    /// Invoke the callback with the recorded cause, or `fallback`.
    fn fire(&self, fallback: AppError) {
        let Some(callback) = lock(&self.callback).take() else {
            return;
        };
        let cause = lock(&self.cause).take().unwrap_or(fallback);
        callback(cause);
    }
}

/// Handle onto a running server process.
///
/// Cloning yields another handle onto the same process.
#[derive(Debug, Clone)]
pub struct Transport {
    server: String,
    outbound: mpsc::Sender<Message>,
    shutdown: CancellationToken,
    pid: Option<u32>,
}

impl Transport {
    /// Spawn the server and start its service tasks.
    ///
    /// `dispatch` receives every decoded inbound message in stream order.
    /// `on_failure` is invoked at most once, after stdout ends or fails,
    /// unless [`Transport::terminate`] was called first. It receives the
    /// process exit when one was observed, otherwise the stream failure.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] if the process cannot be launched.
    pub fn start<F, G>(
        server: &str,
        config: &ServerConfig,
        dispatch: F,
        on_failure: G,
    ) -> Result<Self>
    where
        F: FnMut(Message) + Send + 'static,
        G: FnOnce(AppError) + Send + 'static,
    {
        let process = spawn_server(server, config)?;
        let pid = process.child.id();
        let hook = FailureHook::new(on_failure);
        let shutdown = CancellationToken::new();
        let (outbound, msg_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        tokio::spawn(drain_stderr(server.to_owned(), process.stderr));

        let exited = CancellationToken::new();

        {
            let server = server.to_owned();
            let hook = hook.clone();
            let cancel = shutdown.clone();
            let exited = exited.clone();
            let stdout = process.stdout;
            tokio::spawn(async move {
                let Some(reason) = run_reader(&server, stdout, dispatch, cancel).await else {
                    return;
                };
                tokio::select! {
                    () = exited.cancelled() => {}
                    () = tokio::time::sleep(EXIT_STATUS_WAIT) => {
                        debug!(server, "transport: stdout closed, process still running");
                    }
                }
                hook.fire(AppError::Transport(reason));
            });
        }

        {
            let server = server.to_owned();
            let hook = hook.clone();
            let cancel = shutdown.clone();
            let stdin = process.stdin;
            tokio::spawn(async move {
                if let Err(err) = run_writer(&server, stdin, msg_rx, cancel).await {
                    hook.note(err);
                }
            });
        }

        drop(monitor_exit(
            server.to_owned(),
            process.child,
            shutdown.clone(),
            move |err| {
                hook.note_exit(err);
                exited.cancel();
            },
        ));

        Ok(Self {
            server: server.to_owned(),
            outbound,
            shutdown,
            pid,
        })
    }

    /// Queue `message` for the server's stdin.
    ///
    /// Returns `false` without error once the transport has been terminated
    /// or its writer has stopped; the caller's pending state is already
    /// being rejected on those paths.
    pub async fn send(&self, message: Message) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if self.outbound.send(message).await.is_err() {
            debug!(server = %self.server, "transport: writer gone, message dropped");
            return false;
        }
        true
    }

    /// Begin shutdown: close stdin now, kill after the grace period.
    ///
    /// Returns immediately and never fails; repeated calls are no-ops.
    pub fn terminate(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(server = %self.server, "transport: terminating");
            self.shutdown.cancel();
        }
    }

    /// Whether [`Transport::terminate`] has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// OS process id of the server, if it was available at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}
