//! Concurrent start-up of many named sessions.

use std::collections::HashMap;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::client::session::Session;
use crate::config::ServerConfig;
use crate::{AppError, Result};

/// Initialized sessions keyed by logical server name.
pub type SessionRegistry = HashMap<String, Session>;

/// Spawn and initialize one session per entry, concurrently.
///
/// Every initialization runs to completion; none is abandoned because a
/// sibling failed. If all succeed the registry is returned. Otherwise every
/// session that did come up is closed, so no server process outlives the
/// failed call, and the error lists each failed name.
///
/// # Errors
///
/// Returns [`AppError::Startup`] with one `(name, error)` pair per failed
/// server, sorted by name.
pub async fn connect_servers<I, K>(servers: I) -> Result<SessionRegistry>
where
    I: IntoIterator<Item = (K, ServerConfig)>,
    K: Into<String>,
{
    let attempts = servers.into_iter().map(|(name, config)| async move {
        let session = Session::new(name, config);
        let outcome = session.initialize().await;
        (session, outcome)
    });

    let mut registry = SessionRegistry::new();
    let mut failures = Vec::new();
    for (session, outcome) in join_all(attempts).await {
        match outcome {
            Ok(_) => {
                registry.insert(session.name().to_owned(), session);
            }
            Err(err) => {
                warn!(server = session.name(), error = %err, "server failed to initialize");
                failures.push((session.name().to_owned(), err));
            }
        }
    }

    if failures.is_empty() {
        info!(servers = registry.len(), "all servers initialized");
        return Ok(registry);
    }

    for session in registry.values() {
        session.close();
    }
    failures.sort_by(|a, b| a.0.cmp(&b.0));
    Err(AppError::Startup(failures))
}
