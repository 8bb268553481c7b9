//! Reader task.
//!
//! Drives a [`FramedRead`] over a server's stdout using [`NdjsonCodec`] and
//! hands every decoded [`Message`] to a caller-supplied dispatch function.
//! Non-protocol lines never reach this task; the codec drops them.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::codec::NdjsonCodec;
use crate::client::message::Message;

/// Read messages from `stdout` until EOF, I/O error, or cancellation.
///
/// # Returns
///
/// - `Some(reason)` when the stream ended on its own (`"stream closed"` or
///   `"stream error: …"`); the caller treats this as a transport failure.
/// - `None` when `cancel` fired first.
pub async fn run_reader<R, F>(
    server: &str,
    stdout: R,
    mut dispatch: F,
    cancel: CancellationToken,
) -> Option<String>
where
    R: AsyncRead + Unpin,
    F: FnMut(Message),
{
    let mut framed = FramedRead::new(stdout, NdjsonCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(server, "reader: cancellation received, stopping");
                return None;
            }

            item = framed.next() => match item {
                None => {
                    debug!(server, "reader: EOF detected");
                    return Some("stream closed".to_owned());
                }
                Some(Err(e)) => {
                    debug!(server, error = %e, "reader: IO error, stopping");
                    return Some(format!("stream error: {e}"));
                }
                Some(Ok(message)) => dispatch(message),
            }
        }
    }
}
