//! Streaming transport tests against a loopback WebSocket device.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{eventually, init_tracing};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use teleop_link::{Connection, ConnectionState, Error, PingMode, RetryPolicy, StreamingOptions};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Loopback Device
// ============================================================================

/// How the fake device treats each accepted socket.
#[derive(Clone, Copy)]
enum Device {
    /// Answers every text frame with `ack:<text>`.
    Echo,
    /// Closes the first socket right after the handshake, echoes afterwards.
    DropFirst,
    /// Completes the handshake and then never reads (pings go unanswered).
    Mute,
    /// Answers `{"ping":n}` with `{"pong":n}` and echoes everything else.
    TextPong,
}

struct Loopback {
    url: String,
    received: mpsc::UnboundedReceiver<String>,
    accepted: Arc<AtomicUsize>,
}

async fn spawn_device(device: Device) -> Loopback {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, received) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let nth = counter.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                match device {
                    Device::Mute => {
                        std::future::pending::<()>().await;
                    }
                    Device::DropFirst if nth == 0 => {
                        let _ = ws.close(None).await;
                        return;
                    }
                    _ => {}
                }
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        let text = text.as_str();
                        if let Some(id) = text
                            .strip_prefix("{\"ping\":")
                            .and_then(|rest| rest.strip_suffix('}'))
                        {
                            if matches!(device, Device::TextPong) {
                                let _ = ws.send(Message::text(format!("{{\"pong\":{id}}}"))).await;
                            }
                            continue;
                        }
                        let _ = tx.send(text.to_string());
                        let reply = Message::text(format!("ack:{text}"));
                        if ws.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    Loopback {
        url: format!("ws://{addr}/"),
        received,
        accepted,
    }
}

fn fast_options() -> StreamingOptions {
    StreamingOptions::new()
        .with_connect_timeout(Duration::from_secs(2))
        .with_ping_interval(Duration::from_millis(25))
        .with_ping_timeout(Duration::from_millis(200))
        .with_retry(RetryPolicy::fixed(Duration::from_millis(20)))
}

fn connect(url: &str, options: StreamingOptions) -> Connection {
    Connection::builder()
        .streaming(url)
        .streaming_options(options)
        .build()
        .expect("valid streaming config")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_link_up_before_first_message() {
    let device = spawn_device(Device::Echo).await;
    let conn = connect(&device.url, fast_options());

    conn.start().unwrap();
    conn.wait_for_state(ConnectionState::Connected, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(conn.inbound_value().is_none());
}

#[tokio::test]
async fn test_pushes_outbound_and_receives_telemetry() {
    let mut device = spawn_device(Device::Echo).await;
    let conn = connect(&device.url, fast_options());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    conn.on_response_data(move |data| sink.lock().push(data.to_string()));

    conn.set_structured_value(&serde_json::json!({ "y": 1, "x": 2 }))
        .unwrap();
    conn.start().unwrap();

    assert_eq!(device.received.recv().await.unwrap(), "{\"x\":2,\"y\":1}");
    eventually(|| conn.inbound_value().is_some()).await;
    assert_eq!(
        conn.inbound_value().unwrap().as_str(),
        "ack:{\"x\":2,\"y\":1}"
    );
    assert_eq!(*seen.lock(), vec!["ack:{\"x\":2,\"y\":1}".to_string()]);
}

#[tokio::test]
async fn test_unchanged_value_is_not_pushed_again() {
    let mut device = spawn_device(Device::Echo).await;
    let conn = connect(&device.url, fast_options());

    conn.start().unwrap();
    conn.set_raw_text("a").unwrap();
    assert_eq!(device.received.recv().await.unwrap(), "a");
    eventually(|| conn.inbound_value().is_some()).await;

    conn.set_raw_text("a").unwrap();
    conn.set_raw_text("b").unwrap();
    assert_eq!(device.received.recv().await.unwrap(), "b");

    conn.set_raw_text("b").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(device.received.try_recv().is_err());
}

#[tokio::test]
async fn test_ping_measures_round_trip() {
    let device = spawn_device(Device::Echo).await;
    let conn = connect(&device.url, fast_options());

    conn.start().unwrap();
    eventually(|| conn.round_trip().is_some()).await;

    assert!(conn.round_trip().unwrap() < Duration::from_secs(1));
    assert_eq!(conn.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_text_ping_measures_round_trip() {
    let mut device = spawn_device(Device::TextPong).await;
    let options = fast_options().with_ping_mode(PingMode::Text);
    let conn = connect(&device.url, options);

    conn.start().unwrap();
    eventually(|| conn.round_trip().is_some()).await;

    assert_eq!(conn.state(), ConnectionState::Connected);
    assert!(conn.inbound_value().is_none());
    assert!(device.received.try_recv().is_err());
}

#[tokio::test]
async fn test_unanswered_text_pings_fail_the_link() {
    let device = spawn_device(Device::Echo).await;
    let options = fast_options()
        .with_ping_mode(PingMode::Text)
        .with_ping_timeout(Duration::from_millis(75))
        .with_retry(RetryPolicy::fixed(Duration::from_secs(60)));
    let conn = connect(&device.url, options);

    conn.start().unwrap();
    conn.wait_for_state(ConnectionState::Error, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(matches!(*conn.last_error().unwrap(), Error::PingTimeout { .. }));
    assert!(conn.round_trip().is_none());
}

#[tokio::test]
async fn test_reopens_after_remote_close() {
    let device = spawn_device(Device::DropFirst).await;
    let conn = connect(&device.url, fast_options());

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    conn.on_state_change(move |new, _| {
        if new == ConnectionState::Error {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    conn.start().unwrap();
    eventually(|| device.accepted.load(Ordering::SeqCst) >= 2).await;
    conn.wait_for_state(ConnectionState::Connected, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(errors.load(Ordering::SeqCst) >= 1);
    assert!(conn.last_error().is_none());
}

#[tokio::test]
async fn test_unanswered_pings_fail_the_link() {
    let device = spawn_device(Device::Mute).await;
    let options = fast_options()
        .with_ping_timeout(Duration::from_millis(75))
        .with_retry(RetryPolicy::fixed(Duration::from_secs(60)));
    let conn = connect(&device.url, options);

    conn.start().unwrap();
    conn.wait_for_state(ConnectionState::Error, Duration::from_secs(5))
        .await
        .unwrap();

    let error = conn.last_error().expect("error recorded");
    assert!(matches!(*error, Error::PingTimeout { .. }));
    assert!(error.is_timeout());
}

#[tokio::test]
async fn test_refused_connection_reports_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = fast_options().with_retry(RetryPolicy::fixed(Duration::from_secs(60)));
    let conn = connect(&format!("ws://{addr}/"), options);

    conn.start().unwrap();
    conn.wait_for_state(ConnectionState::Error, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(conn.last_error().unwrap().is_connection_error());
}

#[tokio::test]
async fn test_stop_closes_socket() {
    let device = spawn_device(Device::Echo).await;
    let conn = connect(&device.url, fast_options());

    conn.start().unwrap();
    conn.wait_for_state(ConnectionState::Connected, Duration::from_secs(5))
        .await
        .unwrap();

    conn.stop();
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    conn.start().unwrap();
    eventually(|| device.accepted.load(Ordering::SeqCst) == 2).await;
    conn.wait_for_state(ConnectionState::Connected, Duration::from_secs(5))
        .await
        .unwrap();
}
