//! Request correlation and per-request deadlines.
//!
//! The [`Correlator`] mints request identifiers and keeps one
//! [`PendingRequest`] per in-flight call. Each entry owns a
//! [`CancellationToken`] for its deadline timer. An entry leaves the map
//! exactly once, through one of three paths:
//!
//! - [`Correlator::complete`]: a matching response arrived;
//! - the deadline timer fired ([`AppError::Timeout`]);
//! - [`Correlator::reject_all`] / [`Correlator::shutdown`]: the session
//!   closed or its transport failed.
//!
//! Removal happens under the map lock, so whichever path removes the entry
//! first is the only one that delivers a completion. Every path that
//! removes an entry cancels its timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::lock;
use crate::client::message::ResponseOutcome;
use crate::{AppError, Result};

type Completion = oneshot::Sender<Result<Value>>;

/// One in-flight request.
#[derive(Debug)]
struct PendingRequest {
    method: String,
    completion: Completion,
    timer: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
    /// Set once the session has closed or failed; later registrations fail
    /// with this cause.
    closed: Option<AppError>,
}

/// Pairs outbound requests with inbound responses.
///
/// Cloning yields another handle onto the same pending map.
#[derive(Debug, Clone)]
pub struct Correlator {
    inner: Arc<Mutex<Inner>>,
    timeout: Duration,
}

/// Awaitable completion of one registered request.
#[derive(Debug)]
pub struct PendingResponse {
    id: u64,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingResponse {
    /// Identifier assigned to the request.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the request's single completion.
    ///
    /// # Errors
    ///
    /// Returns whatever the resolving path delivered: [`AppError::Remote`],
    /// [`AppError::Timeout`], or the session's close/failure cause.
    pub async fn recv(self) -> Result<Value> {
        self.rx.await.unwrap_or(Err(AppError::Closed))
    }
}

impl Correlator {
    /// Create a correlator whose requests expire after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1,
                pending: HashMap::new(),
                closed: None,
            })),
            timeout,
        }
    }

    /// Deadline applied to every request.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of requests currently awaiting completion.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    /// Allocate the next identifier, record the request, and arm its timer.
    ///
    /// Identifiers start at 1 and are never reused for the lifetime of the
    /// correlator. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the recorded cause if the correlator has been shut down.
    pub fn register(&self, method: &str) -> Result<PendingResponse> {
        let deadline = Instant::now() + self.timeout;
        let (tx, rx) = oneshot::channel();
        let timer = CancellationToken::new();

        let id = {
            let mut inner = lock(&self.inner);
            if let Some(cause) = &inner.closed {
                return Err(cause.clone());
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.pending.insert(
                id,
                PendingRequest {
                    method: method.to_owned(),
                    completion: tx,
                    timer: timer.clone(),
                },
            );
            id
        };

        let correlator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => correlator.expire(id),
            }
        });

        Ok(PendingResponse { id, rx })
    }

    /// Resolve request `id` with a response outcome.
    ///
    /// Returns `false` when no request with that identifier is pending
    /// (never issued, already timed out, or already completed).
    pub fn complete(&self, id: u64, outcome: ResponseOutcome) -> bool {
        let result = match outcome {
            ResponseOutcome::Result(value) => Ok(value),
            ResponseOutcome::Error(error) => Err(remote_error(&error)),
        };
        self.finish(id, result)
    }

    /// Fail request `id` with `cause`. Returns `false` if it was not pending.
    pub fn reject(&self, id: u64, cause: AppError) -> bool {
        self.finish(id, Err(cause))
    }

    /// Fail every pending request with `cause` and clear the map.
    ///
    /// Returns the number of requests rejected; calling it again with
    /// nothing pending is a no-op.
    pub fn reject_all(&self, cause: &AppError) -> usize {
        let drained: Vec<(u64, PendingRequest)> = lock(&self.inner).pending.drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            entry.timer.cancel();
            if entry.completion.send(Err(cause.clone())).is_err() {
                debug!(id, method = %entry.method, "correlator: caller gone before rejection");
            }
        }
        if count > 0 {
            debug!(count, cause = %cause, "correlator: rejected all pending requests");
        }
        count
    }

    /// Refuse further registrations and reject everything pending.
    ///
    /// The first cause recorded wins; later calls only drain the map.
    pub fn shutdown(&self, cause: AppError) -> usize {
        lock(&self.inner).closed.get_or_insert(cause.clone());
        self.reject_all(&cause)
    }

    /// Whether [`Correlator::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        lock(&self.inner).closed.is_some()
    }

    fn finish(&self, id: u64, result: Result<Value>) -> bool {
        let Some(entry) = lock(&self.inner).pending.remove(&id) else {
            return false;
        };
        entry.timer.cancel();
        if entry.completion.send(result).is_err() {
            debug!(id, method = %entry.method, "correlator: caller gone before completion");
        }
        true
    }

    fn expire(&self, id: u64) {
        let Some(entry) = lock(&self.inner).pending.remove(&id) else {
            return;
        };
        warn!(
            id,
            method = %entry.method,
            timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            "correlator: request timed out"
        );
        let cause = AppError::Timeout {
            method: entry.method.clone(),
            timeout: self.timeout,
        };
        if entry.completion.send(Err(cause)).is_err() {
            debug!(id, method = %entry.method, "correlator: caller gone before timeout");
        }
    }
}

/// Convert a server error object into [`AppError::Remote`].
///
/// Uses the object's `message` when present, otherwise its serialized form.
#[must_use]
pub fn remote_error(error: &Value) -> AppError {
    let code = error.get("code").and_then(Value::as_i64);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map_or_else(|| error.to_string(), str::to_owned);
    AppError::Remote { code, message }
}
