//! Client links against a live relay server.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use retro_pong::{GameServer, ServerConfig};
use retro_pong_client::network::{ClientLink, GameMode, LinkConfig, LinkError, LinkEvent, Score, ServerMessage};
use retro_pong_client::sync::{PaddlePositions, Snapshot, SnapshotState, Vec2};

async fn start_server() -> (Arc<GameServer>, String) {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let server = Arc::new(GameServer::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let serving = server.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    (server, url)
}

fn link(url: &str) -> (ClientLink, mpsc::UnboundedReceiver<LinkEvent>) {
    ClientLink::new(LinkConfig {
        server_url: url.to_string(),
        ping_interval: Duration::from_millis(50),
        reconnect_base_delay: Duration::from_millis(20),
        max_reconnect_attempts: 3,
    })
}

/// Next event other than a pong.
async fn next_event(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Some(LinkEvent::Message(ServerMessage::Pong { .. })) => continue,
                Some(event) => return event,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for a link event")
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> ServerMessage {
    match next_event(rx).await {
        LinkEvent::Message(message) => message,
        other => panic!("expected a message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_host_and_guest_play() {
    let (server, url) = start_server().await;
    let (host, mut host_rx) = link(&url);
    let (guest, mut guest_rx) = link(&url);

    host.connect().await.unwrap();
    assert_eq!(next_event(&mut host_rx).await, LinkEvent::Connected);
    host.create_room(GameMode::Arcade).unwrap();

    let code = match next_message(&mut host_rx).await {
        ServerMessage::RoomCreated { room_code, .. } => room_code,
        other => panic!("expected room-created, got {other:?}"),
    };
    assert!(host.is_host());

    guest.connect().await.unwrap();
    assert_eq!(next_event(&mut guest_rx).await, LinkEvent::Connected);
    guest.join_room(&code.to_lowercase()).unwrap();

    assert!(matches!(next_message(&mut guest_rx).await, ServerMessage::RoomJoined { .. }));
    assert!(matches!(next_message(&mut host_rx).await, ServerMessage::PlayerJoined { .. }));
    assert_eq!(guest.room().room_code.as_deref(), Some(code.as_str()));
    assert!(!guest.is_host());

    assert!(matches!(guest.start_game(), Err(LinkError::NotHost)));
    host.start_game().unwrap();
    assert_eq!(next_message(&mut host_rx).await, ServerMessage::GameStart { mode: GameMode::Arcade });
    assert_eq!(next_message(&mut guest_rx).await, ServerMessage::GameStart { mode: GameMode::Arcade });

    let state = SnapshotState {
        balls: vec![Vec2::new(400.0, 300.0)],
        paddles: PaddlePositions { own: 250.0, opponent: 260.0 },
        score: Score { p1: 1, p2: 0 },
    };
    host.send_state(&state).unwrap();
    let relayed = next_message(&mut guest_rx).await;
    let snapshot = Snapshot::from_message(&relayed).expect("game-state");
    assert_eq!(snapshot.decode(), Some(state.clone()));

    assert!(matches!(guest.send_state(&state), Err(LinkError::NotHost)));

    guest.send_input(123.0).unwrap();
    match next_message(&mut host_rx).await {
        ServerMessage::PlayerInput { paddle_y, player_id, .. } => {
            assert_eq!(paddle_y, 123.0);
            assert_eq!(Some(player_id), guest.room().player_id);
        }
        other => panic!("expected player-input, got {other:?}"),
    }

    host.send_game_over(Score { p1: 11, p2: 7 }).unwrap();
    assert_eq!(
        next_message(&mut guest_rx).await,
        ServerMessage::GameOver { score: Score { p1: 11, p2: 7 } }
    );

    host.disconnect().await;
    guest.disconnect().await;
    server.shutdown();
}

#[tokio::test]
async fn test_latency_measured() {
    let (server, url) = start_server().await;
    let (client, mut rx) = link(&url);

    client.connect().await.unwrap();
    let pong = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(LinkEvent::Message(ServerMessage::Pong { .. })) = rx.recv().await {
                break;
            }
        }
    })
    .await;

    assert!(pong.is_ok());
    assert!(client.latency().is_some());

    client.disconnect().await;
    server.shutdown();
}

#[tokio::test]
async fn test_guest_becomes_host_when_host_leaves() {
    let (server, url) = start_server().await;
    let (host, mut host_rx) = link(&url);
    let (guest, mut guest_rx) = link(&url);

    host.connect().await.unwrap();
    next_event(&mut host_rx).await;
    host.create_room(GameMode::Classic).unwrap();
    let code = match next_message(&mut host_rx).await {
        ServerMessage::RoomCreated { room_code, .. } => room_code,
        other => panic!("expected room-created, got {other:?}"),
    };

    guest.connect().await.unwrap();
    next_event(&mut guest_rx).await;
    guest.join_room(&code).unwrap();
    next_message(&mut guest_rx).await;

    host.leave_room().unwrap();
    assert!(host.room().room_code.is_none());

    assert!(matches!(next_message(&mut guest_rx).await, ServerMessage::PlayerLeft { .. }));
    assert!(guest.is_host());

    host.disconnect().await;
    guest.disconnect().await;
    server.shutdown();
}

#[tokio::test]
async fn test_duplicate_connect_suppressed() {
    let (server, url) = start_server().await;
    let (client, mut rx) = link(&url);

    let (a, b) = tokio::join!(client.connect(), client.connect());
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(next_event(&mut rx).await, LinkEvent::Connected);

    client.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connection_count().await, 1);

    let extra = timeout(Duration::from_millis(100), async {
        loop {
            match rx.recv().await {
                Some(LinkEvent::Connected) => return,
                Some(_) => continue,
                None => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    assert!(extra.is_err(), "second Connected event");

    client.disconnect().await;
    server.shutdown();
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let (server, url) = start_server().await;
    let (client, mut rx) = link(&url);

    client.connect().await.unwrap();
    assert_eq!(next_event(&mut rx).await, LinkEvent::Connected);
    client.create_room(GameMode::Classic).unwrap();
    assert!(matches!(next_message(&mut rx).await, ServerMessage::RoomCreated { .. }));

    // Stops the listener and drops every connection.
    server.shutdown();

    assert_eq!(next_event(&mut rx).await, LinkEvent::Disconnected);

    let mut delays = Vec::new();
    for expected in 1..=3 {
        match next_event(&mut rx).await {
            LinkEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt, expected);
                delays.push(delay);
            }
            other => panic!("expected reconnecting, got {other:?}"),
        }
    }
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(next_event(&mut rx).await, LinkEvent::Failed { attempts: 3 });

    assert!(client.room().room_code.is_none());
    assert!(!client.is_connected());

    // No further attempts after the terminal failure.
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let (server, url) = start_server().await;
    let (client, mut rx) = ClientLink::new(LinkConfig {
        server_url: url.clone(),
        ping_interval: Duration::from_secs(10),
        reconnect_base_delay: Duration::from_millis(500),
        max_reconnect_attempts: 5,
    });

    client.connect().await.unwrap();
    next_event(&mut rx).await;
    client.create_room(GameMode::Classic).unwrap();
    next_message(&mut rx).await;

    server.shutdown();
    assert_eq!(next_event(&mut rx).await, LinkEvent::Disconnected);
    assert!(matches!(next_event(&mut rx).await, LinkEvent::Reconnecting { attempt: 1, .. }));

    client.disconnect().await;

    assert!(timeout(Duration::from_secs(1), rx.recv()).await.is_err());
    assert!(client.room().room_code.is_none());
}
