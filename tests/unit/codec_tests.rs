//! Unit tests for the NDJSON codec: framing, chunk boundaries, and
//! tolerance of non-protocol output.

use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

use mcp_stdio::client::codec::NdjsonCodec;
use mcp_stdio::client::message::{Message, RequestId, ResponseOutcome};

fn response(id: u64, result: serde_json::Value) -> Message {
    Message::Response {
        id: RequestId::Number(id),
        outcome: ResponseOutcome::Result(result),
    }
}

/// Decode everything currently decodable from `buf`.
fn drain(codec: &mut NdjsonCodec, buf: &mut BytesMut) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some(message) = codec.decode(buf).expect("decode never fails on content") {
        out.push(message);
    }
    out
}

// ── Framing ──────────────────────────────────────────────────────────────────

/// A complete line decodes into one message and leaves the buffer empty.
#[test]
fn single_line_decodes_to_one_message() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");

    let messages = drain(&mut codec, &mut buf);

    assert_eq!(messages, vec![response(1, json!({}))]);
    assert!(buf.is_empty(), "consumed line must be removed from the buffer");
}

/// Several messages in one chunk are each decoded, in order.
#[test]
fn batched_lines_are_each_decoded() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from(concat!(
        "{\"id\":1,\"result\":{\"n\":1}}\n",
        "{\"id\":2,\"result\":{\"n\":2}}\n",
        "{\"id\":3,\"result\":{\"n\":3}}\n",
    ));

    let messages = drain(&mut codec, &mut buf);

    assert_eq!(
        messages,
        vec![
            response(1, json!({"n": 1})),
            response(2, json!({"n": 2})),
            response(3, json!({"n": 3})),
        ]
    );
}

/// A message split across chunks is held until its newline arrives.
#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"id\":7,\"res");

    assert!(drain(&mut codec, &mut buf).is_empty());

    buf.extend_from_slice(b"ult\":{\"ok\":true}");
    assert!(drain(&mut codec, &mut buf).is_empty());

    buf.extend_from_slice(b"}\n{\"id\":8,");
    assert_eq!(
        drain(&mut codec, &mut buf),
        vec![response(7, json!({"ok": true}))]
    );

    buf.extend_from_slice(b"\"result\":null}\n");
    assert_eq!(
        drain(&mut codec, &mut buf),
        vec![response(8, serde_json::Value::Null)]
    );
}

/// Feeding a stream one byte at a time yields exactly the same messages as
/// feeding it whole.
#[test]
fn byte_at_a_time_delivery_yields_each_message_once() {
    let stream = concat!(
        "server banner\n",
        "{\"id\":1,\"result\":{\"a\":1}}\n",
        "\n",
        "{\"id\":2,\"error\":{\"message\":\"no\"}}\n",
    );

    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::new();
    let mut messages = Vec::new();
    for byte in stream.as_bytes() {
        buf.extend_from_slice(&[*byte]);
        messages.extend(drain(&mut codec, &mut buf));
    }

    assert_eq!(
        messages,
        vec![
            response(1, json!({"a": 1})),
            Message::Response {
                id: RequestId::Number(2),
                outcome: ResponseOutcome::Error(json!({"message": "no"})),
            },
        ]
    );
}

// ── Tolerance ────────────────────────────────────────────────────────────────

/// Non-JSON text between two responses is skipped; both responses survive.
#[test]
fn garbage_between_responses_is_skipped() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from(concat!(
        "{\"id\":1,\"result\":{}}\n",
        "Listening on stdio... {not json\n",
        "{\"id\":2,\"result\":{}}\n",
    ));

    let messages = drain(&mut codec, &mut buf);

    assert_eq!(messages, vec![response(1, json!({})), response(2, json!({}))]);
}

/// Blank and whitespace-only lines, including CRLF endings, are skipped.
#[test]
fn blank_lines_and_crlf_are_tolerated() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("\n   \n\r\n{\"id\":3,\"result\":{}}\r\n");

    assert_eq!(drain(&mut codec, &mut buf), vec![response(3, json!({}))]);
}

/// Invalid UTF-8 and JSON values that are not objects never stop decoding.
#[test]
fn invalid_utf8_and_non_objects_are_skipped() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"\xff\xfe\xfd\n");
    buf.extend_from_slice(b"42\n[1,2]\n\"text\"\n{}\n");
    buf.extend_from_slice(b"{\"id\":5,\"result\":{}}\n");

    assert_eq!(drain(&mut codec, &mut buf), vec![response(5, json!({}))]);
}

/// At EOF an unterminated trailing fragment is discarded, not parsed.
#[test]
fn unterminated_tail_is_discarded_at_eof() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"id\":1,\"result\":{}}\n{\"id\":2,\"result\":{}}");

    let first = codec.decode_eof(&mut buf).expect("decode_eof must not fail");
    assert_eq!(first, Some(response(1, json!({}))));

    let second = codec.decode_eof(&mut buf).expect("decode_eof must not fail");
    assert_eq!(second, None, "partial line must never be parsed");
    assert!(buf.is_empty(), "tail must be dropped");
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Outbound requests are encoded as one compact line ending in `\n`.
#[test]
fn request_encodes_as_single_terminated_line() {
    let mut codec = NdjsonCodec::new();
    let mut dst = BytesMut::new();

    codec
        .encode(
            Message::request(3, "tools/call", json!({"name": "a", "arguments": {}})),
            &mut dst,
        )
        .expect("encode must succeed");

    let text = std::str::from_utf8(&dst).expect("utf-8 output");
    assert!(text.ends_with('\n'));
    assert_eq!(text.matches('\n').count(), 1, "exactly one line terminator");

    let value: serde_json::Value = serde_json::from_str(text.trim_end()).expect("valid JSON");
    assert_eq!(
        value,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "a", "arguments": {}}
        })
    );
}

/// String payloads with embedded newlines are escaped, keeping one line.
#[test]
fn embedded_newlines_are_escaped() {
    let mut codec = NdjsonCodec::new();
    let mut dst = BytesMut::new();

    codec
        .encode(
            Message::request(1, "tools/call", json!({"text": "a\nb"})),
            &mut dst,
        )
        .expect("encode must succeed");

    assert_eq!(dst.iter().filter(|b| **b == b'\n').count(), 1);
    let decoded = drain(&mut NdjsonCodec::new(), &mut dst);
    assert_eq!(
        decoded,
        vec![Message::request(1, "tools/call", json!({"text": "a\nb"}))]
    );
}
