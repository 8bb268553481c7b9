//! Initialization handshake payloads.
//!
//! A session opens with an LSP-style exchange:
//!
//! 1. an `initialize` request carrying the protocol version, an empty
//!    capability set, and this client's identification;
//! 2. the server's response, whose `serverInfo` identifies the server;
//! 3. a `notifications/initialized` notification, written without waiting
//!    for (or receiving) any acknowledgement.

use serde::Deserialize;
use serde_json::{json, Value};

/// Protocol revision announced in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name announced in `clientInfo`.
pub const CLIENT_NAME: &str = "mcp-stdio";

/// Server identification from the handshake response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    /// Server name, if reported.
    #[serde(default)]
    pub name: Option<String>,
    /// Server version, if reported.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters of the `initialize` request.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Extract `serverInfo` from an `initialize` result, if well formed.
#[must_use]
pub fn server_info(result: &Value) -> Option<ServerInfo> {
    result
        .get("serverInfo")
        .cloned()
        .and_then(|info| serde_json::from_value(info).ok())
}
