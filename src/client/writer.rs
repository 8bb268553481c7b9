//! Writer task.
//!
//! Receives outbound [`Message`]s from a tokio [`mpsc`] channel and writes
//! each as one NDJSON line to the server's stdin through a [`FramedWrite`].
//! Dropping the task's sink closes stdin, which is the graceful stop signal
//! for a stdio server.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::codec::NdjsonCodec;
use crate::client::message::Message;
use crate::{AppError, Result};

/// Write queued messages to `stdin` until cancelled or the queue closes.
///
/// # Errors
///
/// Returns [`AppError::Transport`]`("write failed: …")` if writing to
/// `stdin` fails (e.g. the server has exited).
pub async fn run_writer<W>(
    server: &str,
    stdin: W,
    mut msg_rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut framed = FramedWrite::new(stdin, NdjsonCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(server, "writer: cancellation received, closing stdin");
                break;
            }

            msg = msg_rx.recv() => match msg {
                None => {
                    debug!(server, "writer: message channel closed, closing stdin");
                    break;
                }
                Some(message) => {
                    framed.send(message).await.map_err(|e| {
                        warn!(server, error = %e, "writer: write to stdin failed");
                        AppError::Transport(format!("write failed: {e}"))
                    })?;
                }
            }
        }
    }

    Ok(())
}
