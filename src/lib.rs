#![forbid(unsafe_code)]

//! `mcp-stdio` is a Model Context Protocol client for servers spoken to
//! over their standard input and output.

pub mod client;
pub mod config;
pub mod errors;

pub use client::{connect_servers, Session, SessionRegistry, SessionState};
pub use config::{ClientConfig, ServerConfig};
pub use errors::{AppError, Result};
