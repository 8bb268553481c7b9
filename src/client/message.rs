//! JSON-RPC 2.0 message model.
//!
//! Every line on the wire decodes into exactly one [`Message`] variant. The
//! variant is chosen once, at decode time, from which members are present:
//!
//! | `method` | `id`    | Variant                    |
//! |----------|---------|----------------------------|
//! | present  | present | [`Message::Request`]       |
//! | present  | absent  | [`Message::Notification`]  |
//! | absent   | present | [`Message::Response`]      |
//! | absent   | absent  | not a message (skipped)    |

use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Protocol tag carried by every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Wire method names used by the client.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Notification sent once the handshake response has been processed.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Enumerate the server's tools.
    pub const LIST_TOOLS: &str = "tools/list";
    /// Invoke a named tool.
    pub const CALL_TOOL: &str = "tools/call";
}

/// Correlation identifier. Servers may use numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier; the only form this client mints.
    Number(u64),
    /// String identifier.
    String(String),
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&RequestId> for Value {
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::Number(n) => Value::from(*n),
            RequestId::String(s) => Value::from(s.as_str()),
        }
    }
}

/// Outcome carried by a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Successful result payload.
    Result(Value),
    /// Error object as sent by the server.
    Error(Value),
}

/// One decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call expecting a response.
    Request {
        /// Correlation identifier.
        id: RequestId,
        /// Method name.
        method: String,
        /// Parameter payload.
        params: Value,
    },
    /// A one-way message; never answered.
    Notification {
        /// Method name.
        method: String,
        /// Optional parameter payload.
        params: Option<Value>,
    },
    /// The answer to an earlier request.
    Response {
        /// Identifier of the request being answered.
        id: RequestId,
        /// Result or error.
        outcome: ResponseOutcome,
    },
}

/// Loose envelope used only to classify a decoded line.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Message {
    /// Build a request with a client-minted identifier.
    #[must_use]
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            id: RequestId::Number(id),
            method: method.into(),
            params,
        }
    }

    /// Build a notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification {
            method: method.into(),
            params,
        }
    }

    /// Decode one line (without its terminator) into a message.
    ///
    /// Returns `None` for blank lines, text that is not a JSON object, and
    /// objects that carry neither a `method` nor an `id`. A response with
    /// both members present is treated as an error; one with neither
    /// resolves to a `null` result.
    #[must_use]
    pub fn parse(line: &[u8]) -> Option<Self> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }

        let raw: RawMessage = serde_json::from_slice(line).ok()?;

        match (raw.method, raw.id) {
            (Some(method), Some(id)) => Some(Self::Request {
                id,
                method,
                params: raw.params.unwrap_or(Value::Null),
            }),
            (Some(method), None) => Some(Self::Notification {
                method,
                params: raw.params,
            }),
            (None, Some(id)) => {
                let outcome = match raw.error {
                    Some(error) => ResponseOutcome::Error(error),
                    None => ResponseOutcome::Result(raw.result.unwrap_or(Value::Null)),
                };
                Some(Self::Response { id, outcome })
            }
            (None, None) => None,
        }
    }

    /// Wire representation of this message.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Request { id, method, params } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": Value::from(id),
                "method": method,
                "params": params,
            }),
            Self::Notification { method, params } => {
                let mut body = Map::new();
                body.insert("jsonrpc".into(), JSONRPC_VERSION.into());
                body.insert("method".into(), method.as_str().into());
                if let Some(params) = params {
                    body.insert("params".into(), params.clone());
                }
                Value::Object(body)
            }
            Self::Response { id, outcome } => {
                let (key, payload) = match outcome {
                    ResponseOutcome::Result(result) => ("result", result),
                    ResponseOutcome::Error(error) => ("error", error),
                };
                let mut body = Map::new();
                body.insert("jsonrpc".into(), JSONRPC_VERSION.into());
                body.insert("id".into(), Value::from(id));
                body.insert(key.into(), payload.clone());
                Value::Object(body)
            }
        }
    }
}
