//! End-to-end pairing over real sockets: HTTP session creation and status,
//! WebSocket attach, relay, and disconnect handling.

use std::time::Duration;

use deskpair_config::DeskpairConfig;
use deskpair_relay::{http, AppState};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

async fn start_server(config: DeskpairConfig) -> (String, AppState) {
    let state = AppState::new(&config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_state = state.clone();
    tokio::spawn(async move {
        http::serve(listener, server_state, None, std::future::pending())
            .await
            .unwrap();
    });

    (addr.to_string(), state)
}

async fn create_session(addr: &str) -> String {
    let body: Value = reqwest::get(format!("http://{addr}/create-session"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["session_id"].as_str().unwrap().to_string()
}

async fn session_status(addr: &str, id: &str) -> Value {
    reqwest::get(format!("http://{addr}/session-status/{id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn connect(addr: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next text frame as raw text.
async fn recv_text(ws: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = frame {
            return text.as_str().to_string();
        }
    }
}

async fn recv_json(ws: &mut Client) -> Value {
    serde_json::from_str(&recv_text(ws).await).unwrap()
}

/// Skip frames until one of the given type arrives.
async fn recv_type(ws: &mut Client, kind: &str) -> Value {
    loop {
        let msg = recv_json(ws).await;
        if msg["type"] == kind {
            return msg;
        }
    }
}

async fn attach(ws: &mut Client, id: &str, role: &str) {
    send_json(ws, json!({"type": "attach", "session_id": id, "role": role})).await;
    let ack = recv_type(ws, "attached").await;
    assert_eq!(ack["role"], role);
}

/// Assert nothing arrives for a short while.
async fn assert_silent(ws: &mut Client) {
    let res = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(res.is_err(), "unexpected frame: {res:?}");
}

async fn wait_for_status(addr: &str, id: &str, check: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..50 {
        let status = session_status(addr, id).await;
        if check(&status) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session {id} never reached expected status");
}

#[tokio::test]
async fn full_pairing_scenario() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;

    let id = create_session(&addr).await;
    assert_eq!(id.len(), 8);
    assert_eq!(
        session_status(&addr, &id).await,
        json!({"exists": true, "producer_bound": false, "consumer_bound": false})
    );

    let mut c1 = connect(&addr).await;
    attach(&mut c1, &id, "producer").await;
    let status = recv_type(&mut c1, "connection_status").await;
    assert_eq!(status["producer_bound"], true);
    assert_eq!(status["consumer_bound"], false);

    let mut c2 = connect(&addr).await;
    attach(&mut c2, &id, "consumer").await;
    assert_eq!(recv_type(&mut c2, "partner_connected").await["role"], "producer");
    assert_eq!(recv_type(&mut c1, "partner_connected").await["role"], "consumer");
    let status = recv_type(&mut c2, "connection_status").await;
    assert_eq!(status["producer_bound"], true);
    assert_eq!(status["consumer_bound"], true);
    recv_type(&mut c1, "connection_status").await;

    assert_eq!(
        session_status(&addr, &id).await,
        json!({"exists": true, "producer_bound": true, "consumer_bound": true})
    );

    // Producer → consumer, byte-for-byte.
    c1.send(Message::text(r#"{"type":"payload","data":{"frame":"X"}}"#))
        .await
        .unwrap();
    assert_eq!(
        recv_text(&mut c2).await,
        r#"{"type":"payload","data":{"frame":"X"}}"#
    );

    // Consumer → producer.
    send_json(
        &mut c2,
        json!({"type": "payload", "data": {"event": "click", "x": 10, "y": 20}}),
    )
    .await;
    let msg = recv_json(&mut c1).await;
    assert_eq!(msg["data"], json!({"event": "click", "x": 10, "y": 20}));

    c1.close(None).await.unwrap();
    let msg = recv_json(&mut c2).await;
    assert_eq!(msg, json!({"type": "partner_disconnected", "role": "producer"}));
    assert_eq!(
        session_status(&addr, &id).await,
        json!({"exists": true, "producer_bound": false, "consumer_bound": true})
    );

    c2.close(None).await.unwrap();
    let status = wait_for_status(&addr, &id, |s| s["exists"] == false).await;
    assert_eq!(status["producer_bound"], false);
    assert_eq!(status["consumer_bound"], false);
}

#[tokio::test]
async fn unknown_session_is_recoverable() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    let mut ws = connect(&addr).await;

    send_json(
        &mut ws,
        json!({"type": "attach", "session_id": "zzzzzzzz", "role": "producer"}),
    )
    .await;
    let err = recv_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "session_not_found");

    // Same socket, fresh session.
    let id = create_session(&addr).await;
    attach(&mut ws, &id, "producer").await;
}

#[tokio::test]
async fn payload_before_attach_is_dropped_silently() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    let mut ws = connect(&addr).await;

    send_json(&mut ws, json!({"type": "payload", "data": {"frame": "early"}})).await;
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn malformed_message_gets_bad_request() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    let mut ws = connect(&addr).await;

    ws.send(Message::text("not json")).await.unwrap();
    let err = recv_json(&mut ws).await;
    assert_eq!(err["code"], "bad_request");
}

#[tokio::test]
async fn query_string_attach_and_binary_relay() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    let id = create_session(&addr).await;

    let (mut producer, _) = connect_async(format!("ws://{addr}/ws?session_id={id}&role=producer"))
        .await
        .unwrap();
    recv_type(&mut producer, "attached").await;

    let (mut consumer, _) = connect_async(format!("ws://{addr}/ws?id={id}&role=consumer"))
        .await
        .unwrap();
    recv_type(&mut consumer, "connection_status").await;

    producer
        .send(Message::binary(vec![0x89, b'P', b'N', b'G']))
        .await
        .unwrap();

    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, consumer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Binary(bytes) = frame {
            assert_eq!(&bytes[..], &[0x89u8, b'P', b'N', b'G']);
            break;
        }
    }
}

#[tokio::test]
async fn half_attach_query_is_rejected() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    let result = connect_async(format!("ws://{addr}/ws?role=producer")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn second_producer_supersedes_first() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    let id = create_session(&addr).await;

    let mut first = connect(&addr).await;
    attach(&mut first, &id, "producer").await;
    let mut consumer = connect(&addr).await;
    attach(&mut consumer, &id, "consumer").await;
    recv_type(&mut consumer, "connection_status").await;

    let mut second = connect(&addr).await;
    attach(&mut second, &id, "producer").await;
    assert_eq!(
        recv_type(&mut consumer, "partner_connected").await["role"],
        "producer"
    );
    recv_type(&mut consumer, "connection_status").await;

    send_json(&mut first, json!({"type": "payload", "data": "stale"})).await;
    send_json(&mut second, json!({"type": "payload", "data": "fresh"})).await;

    let msg = recv_type(&mut consumer, "payload").await;
    assert_eq!(msg["data"], "fresh");
    assert_silent(&mut consumer).await;

    // The evicted producer leaving does not unbind its successor.
    first.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = session_status(&addr, &id).await;
    assert_eq!(status["producer_bound"], true);
    assert_silent(&mut consumer).await;
}

#[tokio::test]
async fn unknown_session_status_reports_absent() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    assert_eq!(
        session_status(&addr, "nothere").await,
        json!({"exists": false, "producer_bound": false, "consumer_bound": false})
    );
}

#[tokio::test]
async fn create_session_builds_urls_and_accepts_post() {
    let (addr, state) = start_server(DeskpairConfig::default()).await;

    let body: Value = reqwest::Client::new()
        .post(format!("http://{addr}/create-session"))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let id = body["session_id"].as_str().unwrap();
    assert_eq!(body["producer_url"], format!("https://{addr}/producer?id={id}"));
    assert_eq!(body["consumer_url"], format!("https://{addr}/consumer?id={id}"));
    assert_eq!(state.registry.count(), 1);
}

#[tokio::test]
async fn health_counts_sessions_and_connections() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    create_session(&addr).await;
    let _ws = connect(&addr).await;

    let mut health = Value::Null;
    for _ in 0..50 {
        health = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if health["connections"] == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);
    assert_eq!(health["connections"], 1);
}

#[tokio::test]
async fn unattached_socket_is_closed_after_timeout() {
    let mut config = DeskpairConfig::default();
    config.server.attach_timeout_secs = 1;
    let (addr, _state) = start_server(config).await;
    let mut ws = connect(&addr).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn payload_into_swept_session_reports_session_not_found() {
    let (addr, state) = start_server(DeskpairConfig::default()).await;
    let id = create_session(&addr).await;

    let mut producer = connect(&addr).await;
    attach(&mut producer, &id, "producer").await;
    recv_type(&mut producer, "connection_status").await;

    let later = std::time::Instant::now() + Duration::from_secs(10);
    assert_eq!(state.registry.sweep_expired(later, Duration::from_secs(1)).len(), 1);

    send_json(&mut producer, json!({"type": "payload", "data": {"frame": "X"}})).await;
    let err = recv_json(&mut producer).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "session_not_found");

    // Further payloads are dropped quietly until the client attaches again.
    send_json(&mut producer, json!({"type": "payload", "data": null})).await;
    assert_silent(&mut producer).await;

    let fresh = create_session(&addr).await;
    attach(&mut producer, &fresh, "producer").await;
}

#[tokio::test]
async fn null_payload_is_relayed() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    let id = create_session(&addr).await;

    let mut producer = connect(&addr).await;
    attach(&mut producer, &id, "producer").await;
    let mut consumer = connect(&addr).await;
    attach(&mut consumer, &id, "consumer").await;
    recv_type(&mut consumer, "connection_status").await;

    producer
        .send(Message::text(r#"{"type":"payload","data":null}"#))
        .await
        .unwrap();
    assert_eq!(recv_text(&mut consumer).await, r#"{"type":"payload","data":null}"#);
}

#[tokio::test]
async fn ping_gets_a_single_pong() {
    let (addr, _state) = start_server(DeskpairConfig::default()).await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Ping(vec![7u8, 7].into())).await.unwrap();
    let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        Message::Pong(data) => assert_eq!(&data[..], &[7u8, 7]),
        other => panic!("expected pong, got {other:?}"),
    }
    assert_silent(&mut ws).await;
}
