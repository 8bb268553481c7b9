//! Unit tests for the reader and writer tasks over in-memory streams.

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mcp_stdio::client::message::{Message, RequestId, ResponseOutcome};
use mcp_stdio::client::reader::run_reader;
use mcp_stdio::client::writer::run_writer;

// ── Reader ───────────────────────────────────────────────────────────────────

/// Every protocol message is dispatched in order; EOF ends the task with
/// `"stream closed"`.
#[tokio::test]
async fn reader_dispatches_messages_then_reports_eof() {
    let input: &[u8] = concat!(
        "npx: installed 1 package\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\"}\n",
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n",
        "{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}",
    )
    .as_bytes();

    let mut seen = Vec::new();
    let reason = run_reader("test", input, |m| seen.push(m), CancellationToken::new()).await;

    assert_eq!(reason.as_deref(), Some("stream closed"));
    assert_eq!(
        seen,
        vec![
            Message::notification("notifications/message", None),
            Message::Response {
                id: RequestId::Number(1),
                outcome: ResponseOutcome::Result(json!({})),
            },
        ],
        "unterminated final line must not be dispatched"
    );
}

/// Cancellation stops the reader without a failure reason.
#[tokio::test]
async fn reader_cancellation_returns_none() {
    let (_server_side, client_side) = tokio::io::duplex(64);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let reason = run_reader("test", client_side, |_| {}, cancel).await;
    assert_eq!(reason, None);
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Queued messages are written as NDJSON; closing the queue closes the sink.
#[tokio::test]
async fn writer_emits_one_line_per_message() {
    let (stdin, mut server_side) = tokio::io::duplex(1024);
    let (tx, rx) = mpsc::channel(4);

    tx.send(Message::request(1, "initialize", json!({})))
        .await
        .expect("queue");
    tx.send(Message::notification("notifications/initialized", None))
        .await
        .expect("queue");
    drop(tx);

    run_writer("test", stdin, rx, CancellationToken::new())
        .await
        .expect("writer must finish cleanly");

    let mut written = String::new();
    server_side
        .read_to_string(&mut written)
        .await
        .expect("read written bytes");

    let lines: Vec<serde_json::Value> = written
        .lines()
        .map(|l| serde_json::from_str(l).expect("each line is JSON"))
        .collect();
    assert_eq!(
        lines,
        vec![
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ]
    );
}

/// Writing into a closed pipe surfaces a transport error.
#[tokio::test]
async fn writer_reports_broken_pipe() {
    let (stdin, mut server_side) = tokio::io::duplex(8);
    server_side.shutdown().await.expect("shutdown");
    drop(server_side);

    let (tx, rx) = mpsc::channel(1);
    tx.send(Message::request(1, "tools/list", json!({})))
        .await
        .expect("queue");

    let result = run_writer("test", stdin, rx, CancellationToken::new()).await;
    assert!(
        matches!(result, Err(mcp_stdio::AppError::Transport(_))),
        "expected transport error, got: {result:?}"
    );
}
