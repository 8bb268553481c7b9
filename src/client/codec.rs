//! NDJSON codec for server stdio streams.
//!
//! Splits the inbound byte stream on `\n` and decodes each complete line
//! into a [`Message`]. Use [`NdjsonCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] (inbound) and
//! [`tokio_util::codec::FramedWrite`] (outbound).
//!
//! Servers commonly print banners or debug text on stdout before and
//! between protocol messages. Such lines are dropped inside
//! [`Decoder::decode`] rather than surfaced as errors, so a single stray
//! line can never terminate the read loop. No line-length limit is applied.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::client::message::Message;
use crate::{AppError, Result};

/// Newline-delimited JSON codec.
///
/// The decoder keeps a scan offset so a large message arriving in many
/// small chunks is not rescanned from the start on every chunk.
#[derive(Debug, Default)]
pub struct NdjsonCodec {
    next_index: usize,
}

impl NdjsonCodec {
    /// Create a codec with an empty scan state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for NdjsonCodec {
    type Item = Message;
    type Error = AppError;

    /// Decode the next protocol message from `src`.
    ///
    /// Returns `Ok(None)` when `src` holds no further complete line. Lines
    /// that are blank or do not decode are consumed and skipped.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                return Ok(None);
            };

            let newline = self.next_index + offset;
            self.next_index = 0;
            let line = src.split_to(newline + 1);

            match Message::parse(&line[..newline]) {
                Some(message) => return Ok(Some(message)),
                None => {
                    trace!(
                        bytes = newline,
                        "ndjson codec: skipping line that is not a protocol message"
                    );
                }
            }
        }
    }

    /// Drain remaining complete lines at EOF; an unterminated tail is dropped.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if !src.is_empty() {
            debug!(
                bytes = src.len(),
                "ndjson codec: discarding unterminated line at end of stream"
            );
            src.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl Encoder<Message> for NdjsonCodec {
    type Error = AppError;

    /// Encode `item` as one compact JSON line terminated by `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the message cannot be serialised.
    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let encoded = serde_json::to_vec(&item.to_value())
            .map_err(|e| AppError::Protocol(format!("failed to serialise message: {e}")))?;
        dst.reserve(encoded.len() + 1);
        dst.extend_from_slice(&encoded);
        dst.put_u8(b'\n');
        Ok(())
    }
}
