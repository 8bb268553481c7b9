//! MCP client over a child process's stdio.
//!
//! Layers, leaf first:
//! - `spawner`, `reader`, `writer`, `transport`: own one server process and
//!   its three streams.
//! - `codec`, `message`: NDJSON framing and the JSON-RPC message model.
//! - `correlator`: request identifiers, pending map, per-request deadlines.
//! - `handshake`, `session`: the `initialize` exchange and tool operations.
//! - `manager`: concurrent start-up of many named sessions.

pub mod codec;
pub mod correlator;
pub mod handshake;
pub mod manager;
pub mod message;
pub mod reader;
pub mod session;
pub mod spawner;
pub mod transport;
pub mod writer;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use manager::{connect_servers, SessionRegistry};
pub use session::{Session, SessionState};

/// Lock `mutex`, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
