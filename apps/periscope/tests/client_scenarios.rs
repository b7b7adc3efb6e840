//! End-to-end orchestration scenarios: a full SessionClient against an
//! in-process control server and a scripted pixel transport.

use std::sync::Arc;

use axum::extract::ws::{Message as ServerWs, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Duration};
use url::Url;

use periscope_client_core::client::SessionClient;
use periscope_client_core::config::{Config, Environment};
use periscope_client_core::session::SessionTarget;
use periscope_client_core::transport::mock::MockPixelTransport;
use periscope_client_core::transport::PixelEvent;

struct ControlServer {
    addr: std::net::SocketAddr,
    seen: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<String>,
}

async fn spawn_control_server() -> ControlServer {
    let (seen_tx, seen_rx) = mpsc::unbounded_channel::<String>();
    let (push_tx, push_rx) = mpsc::unbounded_channel::<String>();
    let push_rx = Arc::new(Mutex::new(Some(push_rx)));

    let app = Router::new().route(
        "/stream/messages/task/:id",
        get(move |ws: WebSocketUpgrade| {
            let seen_tx = seen_tx.clone();
            let push_rx = push_rx.clone();
            async move {
                ws.on_upgrade(move |socket| async move {
                    let push_rx = push_rx.lock().await.take();
                    drive_socket(socket, seen_tx, push_rx).await;
                })
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ControlServer {
        addr,
        seen: seen_rx,
        push: push_tx,
    }
}

async fn drive_socket(
    mut socket: WebSocket,
    seen: mpsc::UnboundedSender<String>,
    push: Option<mpsc::UnboundedReceiver<String>>,
) {
    let mut push = push.unwrap_or_else(|| mpsc::unbounded_channel().1);
    loop {
        tokio::select! {
            frame = socket.recv() => match frame {
                Some(Ok(ServerWs::Text(text))) => {
                    let _ = seen.send(text);
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            Some(text) = push.recv() => {
                if socket.send(ServerWs::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn config_for(addr: std::net::SocketAddr) -> Config {
    Config::new(
        &format!("http://{addr}"),
        &format!("ws://{addr}"),
        Some("key-1".into()),
        Environment::Local,
        "client-7".into(),
    )
    .unwrap()
}

async fn next_command(server: &mut ControlServer) -> Value {
    let raw = server.seen.recv().await.expect("server saw a frame");
    serde_json::from_str(&raw).expect("client frames are json")
}

async fn await_pixel_connection(transport: &MockPixelTransport) {
    while transport.connection_count() == 0 {
        sleep(Duration::from_millis(10)).await;
    }
}

#[test_timeout::tokio_timeout_test]
async fn task_session_becomes_ready_once_canvas_appears() {
    let server = spawn_control_server().await;
    let transport = MockPixelTransport::new();
    let client = SessionClient::builder(config_for(server.addr))
        .target(Some(SessionTarget::Task("t-1".into())))
        .pixel_transport(Arc::new(transport.clone()))
        .start()
        .unwrap();

    await_pixel_connection(&transport).await;
    let dialed = transport.dialed_urls();
    assert_eq!(
        dialed[0],
        Url::parse(&format!(
            "ws://{}/stream/vnc/task/t-1?client_id=client-7&apikey=key-1",
            server.addr
        ))
        .unwrap()
    );

    // No browser session id on a task target: existence polling is skipped
    // and readiness only waits on the pixel stream.
    let feed = transport.feed().unwrap();
    feed.send(PixelEvent::Connected).unwrap();
    feed.send(PixelEvent::Frame(Bytes::from_static(b"\x01"))).unwrap();

    let mut ready = client.readiness_watch();
    while !*ready.borrow_and_update() {
        ready.changed().await.unwrap();
    }
    assert!(client.is_canvas_ready());
    assert!(client.is_pixel_connected());

    client.shutdown().await;
}

#[test_timeout::tokio_timeout_test]
async fn losing_eligibility_tears_everything_down() {
    let server = spawn_control_server().await;
    let transport = MockPixelTransport::new();
    let client = SessionClient::builder(config_for(server.addr))
        .target(Some(SessionTarget::Task("t-1".into())))
        .pixel_transport(Arc::new(transport.clone()))
        .start()
        .unwrap();

    await_pixel_connection(&transport).await;
    let feed = transport.feed().unwrap();
    feed.send(PixelEvent::Connected).unwrap();
    feed.send(PixelEvent::Frame(Bytes::from_static(b"\x01"))).unwrap();

    let mut ready = client.readiness_watch();
    while !*ready.borrow_and_update() {
        ready.changed().await.unwrap();
    }

    client.set_show_stream(false);
    while *ready.borrow_and_update() {
        ready.changed().await.unwrap();
    }
    assert!(!client.is_pixel_connected());
    assert!(!client.is_canvas_ready());
    assert!(!client.is_ready());

    client.shutdown().await;
}

#[test_timeout::tokio_timeout_test]
async fn interactive_toggle_drives_control_handoff() {
    let mut server = spawn_control_server().await;
    let transport = MockPixelTransport::new();
    let client = SessionClient::builder(config_for(server.addr))
        .target(Some(SessionTarget::Task("t-1".into())))
        .pixel_transport(Arc::new(transport.clone()))
        .start()
        .unwrap();

    // A freshly connected non-interactive session cedes control.
    assert_eq!(next_command(&mut server).await, json!({ "kind": "cede-control" }));

    client.set_interactive(true);
    assert_eq!(next_command(&mut server).await, json!({ "kind": "take-control" }));

    client.set_interactive(false);
    assert_eq!(next_command(&mut server).await, json!({ "kind": "cede-control" }));

    client.shutdown().await;
}

#[test_timeout::tokio_timeout_test]
async fn recording_rising_edge_seizes_control_and_events_are_buffered() {
    let mut server = spawn_control_server().await;
    let transport = MockPixelTransport::new();
    let client = SessionClient::builder(config_for(server.addr))
        .target(Some(SessionTarget::Task("t-1".into())))
        .pixel_transport(Arc::new(transport.clone()))
        .start()
        .unwrap();

    assert_eq!(next_command(&mut server).await, json!({ "kind": "cede-control" }));

    client.set_recording(true);
    assert_eq!(next_command(&mut server).await, json!({ "kind": "take-control" }));

    server
        .push
        .send(
            r#"{"kind":"exfiltrated-event","event_name":"click","params":{"x":1},"source":"page"}"#
                .into(),
        )
        .unwrap();
    while client.recorder().pending_events().is_empty() {
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.recorder().pending_events()[0].event_name, "click");

    client.set_exfiltrate(true);
    assert_eq!(
        next_command(&mut server).await,
        json!({ "kind": "begin-exfiltration" })
    );
    client.set_exfiltrate(false);
    assert_eq!(
        next_command(&mut server).await,
        json!({ "kind": "end-exfiltration" })
    );

    client.shutdown().await;
}
