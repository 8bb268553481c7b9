//! Protocol session: one server process, one handshake, many requests.
//!
//! ```text
//! Unstarted ──initialize──▶ Starting ──handshake ok──▶ Ready
//!     │                        │                         │
//!     │                        └──spawn/handshake error──┤
//!     │                                                  ▼
//!     └───────────close──────────────────────────────▶ Closed
//! ```
//!
//! Process exit or a stream failure in `Starting` or `Ready` also moves the
//! session to `Closed` and fails every pending request with the transport
//! cause. `Closed` is terminal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::correlator::Correlator;
use crate::client::handshake::{self, ServerInfo};
use crate::client::lock;
use crate::client::message::{methods, Message, RequestId};
use crate::client::transport::Transport;
use crate::config::ServerConfig;
use crate::{AppError, Result};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created; no process yet.
    Unstarted,
    /// Process spawned; handshake in flight.
    Starting,
    /// Handshake complete; domain operations may be issued.
    Ready,
    /// Closed by the client or by process failure.
    Closed,
}

/// One connection to a spawned server.
#[derive(Debug)]
pub struct Session {
    name: String,
    config: ServerConfig,
    correlator: Correlator,
    state: Arc<Mutex<SessionState>>,
    transport: Mutex<Option<Transport>>,
    server_info: Mutex<Option<ServerInfo>>,
}

impl Session {
    /// Create an unstarted session for the server `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, config: ServerConfig) -> Self {
        let correlator = Correlator::new(config.timeout());
        Self {
            name: name.into(),
            config,
            correlator,
            state: Arc::new(Mutex::new(SessionState::Unstarted)),
            transport: Mutex::new(None),
            server_info: Mutex::new(None),
        }
    }

    /// Logical server name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Timeout applied to every request on this session.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.correlator.timeout()
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Server process id while a process is attached.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        lock(&self.transport).as_ref().and_then(Transport::pid)
    }

    /// Server identification from the handshake, once ready.
    #[must_use]
    pub fn server_info(&self) -> Option<ServerInfo> {
        lock(&self.server_info).clone()
    }

    /// Spawn the server and perform the handshake.
    ///
    /// Returns the `initialize` result payload. On failure the session is
    /// closed (its process, if any, is terminated) before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`AppError::Protocol`]: the session was already started.
    /// - [`AppError::Spawn`]: the process could not be launched.
    /// - [`AppError::Timeout`], [`AppError::Remote`] or
    ///   [`AppError::Transport`]: the handshake request failed.
    pub async fn initialize(&self) -> Result<Value> {
        {
            let mut state = lock(&self.state);
            if *state != SessionState::Unstarted {
                return Err(AppError::Protocol(format!(
                    "session '{}' already started ({:?})",
                    self.name, *state
                )));
            }
            *state = SessionState::Starting;
        }

        let transport = match self.start_transport() {
            Ok(transport) => transport,
            Err(err) => {
                warn!(server = %self.name, error = %err, "failed to start server");
                self.correlator.shutdown(err.clone());
                *lock(&self.state) = SessionState::Closed;
                return Err(err);
            }
        };
        *lock(&self.transport) = Some(transport);

        let result = match self
            .request(methods::INITIALIZE, handshake::initialize_params())
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(server = %self.name, error = %err, "handshake failed");
                self.close();
                return Err(err);
            }
        };

        // Never acknowledged; a failed write is not a handshake failure.
        self.notify(methods::INITIALIZED, None).await;

        let info = handshake::server_info(&result);
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Starting {
                *state = SessionState::Ready;
            }
        }
        info!(
            server = %self.name,
            server_name = info.as_ref().and_then(|i| i.name.as_deref()).unwrap_or("unknown"),
            server_version = info.as_ref().and_then(|i| i.version.as_deref()).unwrap_or("unknown"),
            "session ready"
        );
        *lock(&self.server_info) = info;

        Ok(result)
    }

    /// List the server's tools.
    ///
    /// Returns the `tools` array of the result in server order, or an empty
    /// list if the member is absent.
    ///
    /// # Errors
    ///
    /// Any error from [`Session::request`].
    pub async fn list_tools(&self) -> Result<Vec<Value>> {
        let result = self.request(methods::LIST_TOOLS, json!({})).await?;
        Ok(match result.get("tools") {
            Some(Value::Array(tools)) => tools.clone(),
            _ => Vec::new(),
        })
    }

    /// Invoke the tool `name` with `arguments`, returning the result's
    /// `content` member (`null` if absent).
    ///
    /// # Errors
    ///
    /// Any error from [`Session::request`].
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let mut result = self
            .request(methods::CALL_TOOL, json!({ "name": name, "arguments": arguments }))
            .await?;
        Ok(result
            .get_mut("content")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`AppError::Protocol`]: the session has not been initialized.
    /// - [`AppError::Closed`] / [`AppError::Transport`]: the session closed
    ///   or failed before or while the request was pending.
    /// - [`AppError::Timeout`]: no response within [`Session::timeout`].
    /// - [`AppError::Remote`]: the server answered with an error object.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let transport = self.transport()?;
        let pending = self.correlator.register(method)?;
        let id = pending.id();
        debug!(server = %self.name, id, method, "sending request");

        if !transport.send(Message::request(id, method, params)).await {
            self.correlator.reject(
                id,
                AppError::Transport("server input stream closed".into()),
            );
        }

        pending.recv().await
    }

    /// Send a notification. Delivery is best-effort and unconfirmed; returns
    /// whether the message was queued.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> bool {
        let Ok(transport) = self.transport() else {
            return false;
        };
        let queued = transport.send(Message::notification(method, params)).await;
        if !queued {
            debug!(server = %self.name, method, "notification not delivered");
        }
        queued
    }

    /// Close the session.
    ///
    /// Begins a graceful stop of the server (stdin closed now, kill after
    /// the grace period) and immediately fails every pending request with
    /// [`AppError::Closed`]. Closing an unstarted session makes it unusable
    /// without spawning anything. Repeated calls are no-ops.
    pub fn close(&self) {
        let transport = lock(&self.transport).take();
        {
            let mut state = lock(&self.state);
            if transport.is_none() && *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        let rejected = self.correlator.shutdown(AppError::Closed);
        match transport {
            Some(transport) => {
                transport.terminate();
                info!(server = %self.name, rejected, "session closed");
            }
            None => debug!(server = %self.name, "closed session that was never started"),
        }
    }

    fn transport(&self) -> Result<Transport> {
        if let Some(transport) = lock(&self.transport).as_ref() {
            return Ok(transport.clone());
        }
        match self.state() {
            SessionState::Unstarted => Err(AppError::Protocol(format!(
                "session '{}' has not been initialized",
                self.name
            ))),
            _ => Err(AppError::Closed),
        }
    }

    fn start_transport(&self) -> Result<Transport> {
        let dispatch = {
            let server = self.name.clone();
            let correlator = self.correlator.clone();
            move |message: Message| route_inbound(&server, &correlator, message)
        };

        let on_failure = {
            let server = self.name.clone();
            let correlator = self.correlator.clone();
            let state = Arc::clone(&self.state);
            move |err: AppError| {
                let rejected = correlator.shutdown(err.clone());
                *lock(&state) = SessionState::Closed;
                warn!(server, error = %err, rejected, "transport failed, session closed");
            }
        };

        Transport::start(&self.name, &self.config, dispatch, on_failure)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Route one inbound message. Only responses to pending requests have an
/// effect; everything else is discarded.
fn route_inbound(server: &str, correlator: &Correlator, message: Message) {
    match message {
        Message::Response {
            id: RequestId::Number(id),
            outcome,
        } => {
            if !correlator.complete(id, outcome) {
                debug!(server, id, "discarding response with no pending request");
            }
        }
        Message::Response { id, .. } => {
            debug!(server, ?id, "discarding response with foreign identifier");
        }
        Message::Request { method, .. } | Message::Notification { method, .. } => {
            debug!(server, method, "ignoring server-initiated message");
        }
    }
}
