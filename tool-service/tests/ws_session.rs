//! End-to-end sessions over real sockets: axum server on an ephemeral port,
//! tokio-tungstenite clients.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tool_service::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> String {
    let state = AppState::with_defaults();
    let app = tool_service::router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn recv_json(client: &mut Client) -> serde_json::Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("transport error");
    serde_json::from_str(frame.to_text().unwrap()).unwrap()
}

async fn assert_silent(client: &mut Client) {
    let outcome = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(outcome.is_err(), "expected no message, got {outcome:?}");
}

async fn send_text(client: &mut Client, raw: &str) {
    client.send(Message::Text(raw.to_owned())).await.unwrap();
}

/// Connect and round-trip a ping so the session is guaranteed to be registered
/// before the test goes on.
async fn connect(url: &str) -> Client {
    let (mut client, _) = connect_async(url).await.expect("websocket handshake");
    send_text(&mut client, r#"{"action":"ping"}"#).await;
    let pong = recv_json(&mut client).await;
    assert_eq!(pong["action"], "pong");
    client
}

#[tokio::test]
async fn ping_answers_pong() {
    let url = spawn_server().await;
    let mut client = connect(&url).await;

    send_text(&mut client, r#"{"action":"ping"}"#).await;
    let pong = recv_json(&mut client).await;
    assert_eq!(pong["type"], "system");
    assert_eq!(pong["action"], "pong");
    assert!(pong["timestamp"].is_string());
}

#[tokio::test]
async fn status_query_over_the_wire() {
    let url = spawn_server().await;
    let mut client = connect(&url).await;

    send_text(&mut client, r#"{"action":"get_tool_status"}"#).await;
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "tool");
    assert_eq!(reply["action"], "get_status");
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["current_quantity"], 10);
    assert_eq!(reply["data"]["name"], "general workshop tool");
}

#[tokio::test]
async fn borrow_notifies_every_client_including_the_requester() {
    let url = spawn_server().await;
    let mut requester = connect(&url).await;
    let mut observer = connect(&url).await;

    send_text(&mut requester, r#"{"action":"borrow_tool","quantity":2}"#).await;

    let reply = recv_json(&mut requester).await;
    assert_eq!(reply["action"], "borrow_tool");
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["remaining_quantity"], 8);

    let own_notification = recv_json(&mut requester).await;
    assert_eq!(own_notification["type"], "notification");
    assert_eq!(own_notification["action"], "inventory_changed");
    assert_eq!(own_notification["data"]["new_quantity"], 8);

    let observed = recv_json(&mut observer).await;
    assert_eq!(observed["action"], "inventory_changed");
    assert_eq!(observed["data"]["old_quantity"], 10);
    assert_eq!(observed["data"]["new_quantity"], 8);
    assert_silent(&mut observer).await;
}

#[tokio::test]
async fn rejected_borrow_stays_private() {
    let url = spawn_server().await;
    let mut requester = connect(&url).await;
    let mut observer = connect(&url).await;

    send_text(&mut requester, r#"{"action":"borrow_tool","quantity":50}"#).await;
    let reply = recv_json(&mut requester).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "insufficient stock, 10 remaining");
    assert_silent(&mut observer).await;
}

#[tokio::test]
async fn unchanged_sensor_reading_broadcasts_nothing() {
    let url = spawn_server().await;
    let mut sensor = connect(&url).await;
    let mut observer = connect(&url).await;

    send_text(&mut sensor, r#"{"action":"sensor_update","current_weight":1000}"#).await;
    let reply = recv_json(&mut sensor).await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["current_quantity"], 10);
    assert_silent(&mut sensor).await;
    assert_silent(&mut observer).await;
}

#[tokio::test]
async fn malformed_frame_keeps_the_connection_open() {
    let url = spawn_server().await;
    let mut client = connect(&url).await;
    let mut observer = connect(&url).await;

    send_text(&mut client, "{{{ nope").await;
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().starts_with("invalid message"));
    assert_silent(&mut observer).await;

    // Still open and serviced.
    send_text(&mut client, r#"{"action":"ping"}"#).await;
    let pong = recv_json(&mut client).await;
    assert_eq!(pong["action"], "pong");
}

#[tokio::test]
async fn unknown_action_is_echoed_and_not_fatal() {
    let url = spawn_server().await;
    let mut client = connect(&url).await;

    send_text(&mut client, r#"{"action":"levitate"}"#).await;
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["action"], "levitate");
    assert_eq!(reply["message"], "unknown action: levitate");

    send_text(&mut client, r#"{"action":"get_tool_status"}"#).await;
    let reply = recv_json(&mut client).await;
    assert_eq!(reply["success"], true);
}

#[tokio::test]
async fn disconnecting_one_client_leaves_others_working() {
    let url = spawn_server().await;
    let mut leaver = connect(&url).await;
    let mut stayer = connect(&url).await;

    leaver.close(None).await.unwrap();
    // Give the server a moment to reap the session.
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_text(&mut stayer, r#"{"action":"borrow_tool","quantity":1}"#).await;
    let reply = recv_json(&mut stayer).await;
    assert_eq!(reply["success"], true);
    let notification = recv_json(&mut stayer).await;
    assert_eq!(notification["action"], "inventory_changed");
}
