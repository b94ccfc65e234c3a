//! Wire-level room flow against a live server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use retro_pong::{GameServer, ServerConfig};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(config: ServerConfig) -> (Arc<GameServer>, String) {
    let server = Arc::new(GameServer::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let serving = server.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    (server, url)
}

async fn connect(url: &str) -> Socket {
    connect_async(url).await.unwrap().0
}

async fn send(ws: &mut Socket, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next JSON frame, skipping control frames.
async fn recv(ws: &mut Socket) -> Value {
    timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

async fn open_room(url: &str) -> (Socket, Socket, String) {
    let mut host = connect(url).await;
    let mut guest = connect(url).await;

    send(&mut host, json!({"type": "create-room", "mode": "classic"})).await;
    let created = recv(&mut host).await;
    assert_eq!(created["type"], "room-created");
    let code = created["roomCode"].as_str().unwrap().to_string();

    send(&mut guest, json!({"type": "join-room", "roomCode": code})).await;
    assert_eq!(recv(&mut guest).await["type"], "room-joined");
    assert_eq!(recv(&mut host).await["type"], "player-joined");

    (host, guest, code)
}

fn local_config() -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_match_flow() {
    let (server, url) = start(local_config()).await;
    let (mut host, mut guest, code) = open_room(&url).await;

    send(&mut host, json!({"type": "start-game", "roomCode": code})).await;
    assert_eq!(recv(&mut host).await, json!({"type": "game-start", "mode": "classic"}));
    assert_eq!(recv(&mut guest).await, json!({"type": "game-start", "mode": "classic"}));

    let state = json!({
        "balls": [{"x": 400.0, "y": 300.0}],
        "paddles": {"self": 250.0, "opponent": 260.0},
        "score": {"p1": 0, "p2": 0}
    });
    send(
        &mut host,
        json!({"type": "game-state", "roomCode": code, "state": state.clone(), "timestamp": 1000}),
    )
    .await;
    let relayed = recv(&mut guest).await;
    assert_eq!(relayed["type"], "game-state");
    assert_eq!(relayed["state"], state);
    assert_eq!(relayed["timestamp"], 1000);

    send(
        &mut guest,
        json!({"type": "player-input", "roomCode": code, "paddleY": 310.0, "timestamp": 1001}),
    )
    .await;
    let input = recv(&mut host).await;
    assert_eq!(input["type"], "player-input");
    assert_eq!(input["paddleY"], 310.0);

    send(&mut host, json!({"type": "game-over", "roomCode": code, "score": {"p1": 11, "p2": 4}})).await;
    assert_eq!(
        recv(&mut guest).await,
        json!({"type": "game-over", "score": {"p1": 11, "p2": 4}})
    );

    server.shutdown();
}

#[tokio::test]
async fn test_guest_cannot_send_state() {
    let (server, url) = start(local_config()).await;
    let (mut host, mut guest, code) = open_room(&url).await;

    send(
        &mut guest,
        json!({"type": "game-state", "roomCode": code, "state": {}, "timestamp": 5}),
    )
    .await;
    assert_eq!(
        recv(&mut guest).await,
        json!({"type": "error", "error": "Only host can send game state"})
    );

    // The host sees only its own ping answer.
    send(&mut host, json!({"type": "ping", "timestamp": 9})).await;
    assert_eq!(recv(&mut host).await, json!({"type": "pong", "timestamp": 9}));

    server.shutdown();
}

#[tokio::test]
async fn test_host_disconnect_promotes_guest() {
    let (server, url) = start(local_config()).await;
    let (host, mut guest, code) = open_room(&url).await;

    drop(host);

    let left = recv(&mut guest).await;
    assert_eq!(left["type"], "player-left");

    // The guest is now host and may send state to nobody without error.
    send(
        &mut guest,
        json!({"type": "game-state", "roomCode": code, "state": {}, "timestamp": 1}),
    )
    .await;
    send(&mut guest, json!({"type": "ping", "timestamp": 2})).await;
    assert_eq!(recv(&mut guest).await, json!({"type": "pong", "timestamp": 2}));

    server.shutdown();
}

#[tokio::test]
async fn test_malformed_frame_gets_error() {
    let (server, url) = start(local_config()).await;
    let mut ws = connect(&url).await;

    ws.send(Message::Text("{oops".to_string())).await.unwrap();
    assert_eq!(
        recv(&mut ws).await,
        json!({"type": "error", "error": "Invalid message format"})
    );

    send(&mut ws, json!({"type": "join-room", "roomCode": "abc"})).await;
    assert_eq!(
        recv(&mut ws).await,
        json!({"type": "error", "error": "Invalid room code format"})
    );

    server.shutdown();
}

#[tokio::test]
async fn test_silent_client_is_terminated() {
    let config = ServerConfig {
        heartbeat_interval: Duration::from_millis(100),
        ..local_config()
    };
    let (server, url) = start(config).await;
    let (host, mut guest, _code) = open_room(&url).await;

    // The host stops reading, so its pings go unanswered. The guest keeps
    // reading and answers every probe.
    let left = recv(&mut guest).await;
    assert_eq!(left["type"], "player-left");
    assert_eq!(server.connection_count().await, 1);

    drop(host);
    server.shutdown();
}
