mod common;

use common::{calm_payload, fire_payload, record, test_state};
use futures::{SinkExt, StreamExt};
use gateway::{create_router, AppState};
use sensor_store::{MemoryStore, SensorStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(state: Arc<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{}/ws", addr)
}

/// Next JSON frame, skipping transport pings.
async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(socket: &mut Socket, frame: Value) {
    socket
        .send(Message::text(frame.to_string()))
        .await
        .unwrap();
}

async fn connect(url: &str) -> Socket {
    let (mut socket, _) = connect_async(url).await.unwrap();
    let welcome = next_event(&mut socket).await;
    assert_eq!(welcome["event"], "connected");
    assert!(welcome["data"]["connectionId"].is_string());
    socket
}

/// Wait until the hub has processed pending joins.
async fn wait_for_clients(state: &AppState, count: usize) {
    for _ in 0..100 {
        if state.hub.client_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never reached {} clients", count);
}

#[tokio::test]
async fn test_emergency_fan_out_order() {
    let state = test_state(Arc::new(MemoryStore::new()));
    let url = serve(state.clone()).await;

    let mut watcher = connect(&url).await;
    send(&mut watcher, json!({"event": "subscribe-device", "data": "Node-7"})).await;
    let ack = next_event(&mut watcher).await;
    assert_eq!(ack["event"], "subscribed");
    assert_eq!(ack["data"]["room"], "device-Node-7");

    send(&mut watcher, json!({"event": "subscribe-fire-alerts"})).await;
    let ack = next_event(&mut watcher).await;
    assert_eq!(ack["data"]["room"], "fire-alerts");

    let mut bystander = connect(&url).await;
    wait_for_clients(&state, 2).await;

    state.ingress.process_payload(&fire_payload("Node-7"));

    let first = next_event(&mut watcher).await;
    assert_eq!(first["event"], "fire-emergency");
    assert_eq!(first["data"]["type"], "FIRE_EMERGENCY");
    assert_eq!(first["data"]["severityTier"], "EXTREME");
    assert_eq!(first["data"]["uiHints"]["priority"], "HIGH");
    assert_eq!(next_event(&mut watcher).await["event"], "device-emergency");
    assert_eq!(next_event(&mut watcher).await["event"], "emergency-popup");

    // Not in any room: only the global event.
    assert_eq!(next_event(&mut bystander).await["event"], "fire-emergency");
    send(&mut bystander, json!({"event": "ping"})).await;
    assert_eq!(next_event(&mut bystander).await["event"], "pong");
}

#[tokio::test]
async fn test_routine_update_and_unsubscribe() {
    let state = test_state(Arc::new(MemoryStore::new()));
    let url = serve(state.clone()).await;

    let mut socket = connect(&url).await;
    send(&mut socket, json!({"event": "subscribe-device", "data": "Node-2"})).await;
    assert_eq!(next_event(&mut socket).await["event"], "subscribed");

    state.ingress.process_payload(&calm_payload("Node-2"));
    assert_eq!(next_event(&mut socket).await["event"], "new-data");
    assert_eq!(next_event(&mut socket).await["event"], "device-update");
    let update = next_event(&mut socket).await;
    assert_eq!(update["event"], "device-data-update");
    assert_eq!(update["data"]["deviceId"], "Node-2");

    send(&mut socket, json!({"event": "unsubscribe-device", "data": "Node-2"})).await;
    assert_eq!(next_event(&mut socket).await["event"], "unsubscribed");
    assert!(state.hub.stats().rooms.is_empty());
}

#[tokio::test]
async fn test_request_latest_and_bad_frames() {
    let store = Arc::new(MemoryStore::new());
    store.put_record(&record("Node-1", 1_700_000_000_000, 24.5)).await.unwrap();
    let state = test_state(store);
    let url = serve(state).await;

    let mut socket = connect(&url).await;
    send(&mut socket, json!({"event": "request-latest", "data": "Node-1"})).await;
    let latest = next_event(&mut socket).await;
    assert_eq!(latest["event"], "latest-data");
    assert_eq!(latest["data"]["deviceId"], "Node-1");
    assert_eq!(latest["data"]["record"]["temperature"], 24.5);

    socket.send(Message::text("garbage")).await.unwrap();
    let error = next_event(&mut socket).await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["data"]["code"], "INVALID_MESSAGE");

    send(&mut socket, json!({"event": "subscribe-device", "data": ""})).await;
    let error = next_event(&mut socket).await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["data"]["code"], "PROCESSING_ERROR");
}

#[tokio::test]
async fn test_disconnect_leaves_rooms() {
    let state = test_state(Arc::new(MemoryStore::new()));
    let url = serve(state.clone()).await;

    let mut socket = connect(&url).await;
    send(&mut socket, json!({"event": "subscribe-fire-alerts"})).await;
    assert_eq!(next_event(&mut socket).await["event"], "subscribed");
    assert_eq!(state.hub.stats().rooms, vec!["fire-alerts".to_string()]);

    socket.close(None).await.unwrap();
    wait_for_clients(&state, 0).await;
    assert!(state.hub.stats().rooms.is_empty());
}
