//! Integration tests for the world server.
//!
//! These tests start a real server instance and connect via WebSocket
//! to verify end-to-end behavior.

use futures_util::{SinkExt, StreamExt};
use roomworld_server::build_worlds;
use roomworld_server::config::ServerConfig;
use roomworld_server::engine::{run_engine, Engine};
use roomworld_server::ws::{router, AppState, MAX_PARSE_ERRORS};
use roomworld_shared::protocol::{
    Action, ClientMsg, InputState, ServerMsg, WorldDataMsg, PROTOCOL_VERSION,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a test server on a random available port and return the WebSocket URL.
/// The second world only admits one player.
async fn start_test_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = ServerConfig {
        listen_addr: addr.to_string(),
        tick_rate_hz: 30,
        ..ServerConfig::default()
    };
    let mut worlds = build_worlds(&config).unwrap();
    worlds[1].max_players = 1;

    let (engine_tx, engine_rx) = mpsc::channel(256);
    let engine = Engine::new(worlds, &config);
    tokio::spawn(run_engine(engine_rx, engine, config.tick_rate_hz));

    let app = router(AppState { engine_tx });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://{}/ws", addr)
}

async fn connect(url: &str) -> Socket {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

async fn send(ws: &mut Socket, msg: &ClientMsg) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

/// Read the next text message and parse as ServerMsg.
async fn recv_msg(ws: &mut Socket) -> ServerMsg {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).expect("Failed to parse server message");
            }
            Some(Ok(_)) => continue, // Skip ping/pong
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed unexpectedly"),
        }
    }
}

/// Read messages until one matches, or panic after 2s.
async fn recv_until<T>(ws: &mut Socket, mut pick: impl FnMut(ServerMsg) -> Option<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(found) = pick(recv_msg(ws).await) {
                return found;
            }
        }
    })
    .await
    .expect("Timed out waiting for message")
}

async fn next_snapshot(ws: &mut Socket) -> WorldDataMsg {
    recv_until(ws, |msg| match msg {
        ServerMsg::WorldData(data) => Some(data),
        _ => None,
    })
    .await
}

/// Log in and return the assigned id.
async fn login(ws: &mut Socket, username: &str) -> u32 {
    send(
        ws,
        &ClientMsg::LoginData {
            username: username.to_string(),
        },
    )
    .await;
    match recv_msg(ws).await {
        ServerMsg::ClientData(data) => {
            assert_eq!(data.protocol_version, PROTOCOL_VERSION);
            data.id
        }
        other => panic!("Expected clientData, got {:?}", other),
    }
}

async fn join(ws: &mut Socket, world_index: usize) -> bool {
    send(ws, &ClientMsg::JoinWorldRequest { world_index }).await;
    recv_until(ws, |msg| match msg {
        ServerMsg::ConnectionStatus(status) => Some(status.successful),
        _ => None,
    })
    .await
}

async fn joined_client(url: &str, username: &str, world_index: usize) -> (Socket, u32) {
    let mut ws = connect(url).await;
    let id = login(&mut ws, username).await;
    assert!(join(&mut ws, world_index).await);
    (ws, id)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_login_lists_worlds() {
    let url = start_test_server().await;
    let mut ws = connect(&url).await;

    send(
        &mut ws,
        &ClientMsg::LoginData {
            username: "alice".to_string(),
        },
    )
    .await;
    match recv_msg(&mut ws).await {
        ServerMsg::ClientData(data) => {
            assert!(data.id > 0);
            assert_eq!(data.world_list.len(), 2);
            assert_eq!(data.world_list[0].name, "Test World");
            assert_eq!(data.world_list[1].max_players, 1);
            assert!(!data.world_list[1].is_full);
        }
        other => panic!("Expected clientData, got {:?}", other),
    }
}

#[tokio::test]
async fn test_clients_get_unique_ids() {
    let url = start_test_server().await;
    let mut ws1 = connect(&url).await;
    let mut ws2 = connect(&url).await;

    let id1 = login(&mut ws1, "alice").await;
    let id2 = login(&mut ws2, "bob").await;
    assert_ne!(id1, id2, "Each client should get a unique ID");
}

#[tokio::test]
async fn test_join_sends_assets_and_room() {
    let url = start_test_server().await;
    let mut ws = connect(&url).await;
    login(&mut ws, "alice").await;

    send(&mut ws, &ClientMsg::JoinWorldRequest { world_index: 0 }).await;
    match recv_msg(&mut ws).await {
        ServerMsg::ConnectionStatus(status) => assert!(status.successful),
        other => panic!("Expected connectionStatus, got {:?}", other),
    }
    match recv_msg(&mut ws).await {
        ServerMsg::Assets(assets) => assert!(!assets.tile_sheet_url.is_empty()),
        other => panic!("Expected assets, got {:?}", other),
    }
    match recv_msg(&mut ws).await {
        ServerMsg::RoomData(room) => {
            assert_eq!(room.name, "lobby");
            assert_eq!(
                room.tile_map.tiles.len(),
                (room.tile_map.cols * room.tile_map.rows) as usize
            );
        }
        other => panic!("Expected roomData, got {:?}", other),
    }
}

#[tokio::test]
async fn test_snapshot_contains_self() {
    let url = start_test_server().await;
    let (mut ws, id) = joined_client(&url, "alice", 0).await;

    let snapshot = next_snapshot(&mut ws).await;
    let me = snapshot
        .entities
        .iter()
        .find(|e| e.id == id)
        .expect("Snapshot should include own entity");
    assert_eq!(me.name, "alice");
    assert!(!me.is_moving);
}

#[tokio::test]
async fn test_input_moves_player() {
    let url = start_test_server().await;
    let (mut ws, id) = joined_client(&url, "alice", 0).await;

    let start = next_snapshot(&mut ws).await;
    let start_x = start.entities.iter().find(|e| e.id == id).unwrap().position.x;

    send(
        &mut ws,
        &ClientMsg::InputData(InputState {
            right: true,
            ..Default::default()
        }),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let moved = recv_until(&mut ws, |msg| match msg {
        ServerMsg::WorldData(data) => data
            .entities
            .into_iter()
            .find(|e| e.id == id && e.position.x > start_x),
        _ => None,
    })
    .await;
    assert!(moved.is_moving);
}

#[tokio::test]
async fn test_full_world_rejects_join() {
    let url = start_test_server().await;
    let (_ws1, _) = joined_client(&url, "alice", 1).await;

    let mut ws2 = connect(&url).await;
    login(&mut ws2, "bob").await;
    assert!(!join(&mut ws2, 1).await, "Second player should be rejected");
}

#[tokio::test]
async fn test_disconnect_frees_slot() {
    let url = start_test_server().await;
    let (ws1, _) = joined_client(&url, "alice", 1).await;
    drop(ws1);

    let mut ws2 = connect(&url).await;
    login(&mut ws2, "bob").await;

    let mut joined = false;
    for _ in 0..20 {
        if join(&mut ws2, 1).await {
            joined = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(joined, "Slot should be free after disconnect");
}

#[tokio::test]
async fn test_disconnected_player_leaves_snapshots() {
    let url = start_test_server().await;
    let (mut ws1, id1) = joined_client(&url, "alice", 0).await;
    let (mut ws2, id2) = joined_client(&url, "bob", 0).await;

    recv_until(&mut ws1, |msg| match msg {
        ServerMsg::WorldData(data) if data.entities.iter().any(|e| e.id == id2) => Some(()),
        _ => None,
    })
    .await;

    ws2.close(None).await.unwrap();

    recv_until(&mut ws1, |msg| match msg {
        ServerMsg::WorldData(data)
            if data.entities.len() == 1 && data.entities[0].id == id1 =>
        {
            Some(())
        }
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_chat_reaches_room() {
    let url = start_test_server().await;
    let (mut ws1, id1) = joined_client(&url, "alice", 0).await;
    let (mut ws2, _) = joined_client(&url, "bob", 0).await;

    send(
        &mut ws1,
        &ClientMsg::Chat {
            text: "hello there".to_string(),
        },
    )
    .await;

    let chat = recv_until(&mut ws2, |msg| match msg {
        ServerMsg::Chat(chat) => Some(chat),
        _ => None,
    })
    .await;
    assert_eq!(chat.sender_id, id1);
    assert_eq!(chat.username, "alice");
    assert_eq!(chat.text, "hello there");
}

#[tokio::test]
async fn test_far_interact_is_rejected() {
    let url = start_test_server().await;
    let (mut ws, _) = joined_client(&url, "alice", 0).await;

    send(
        &mut ws,
        &ClientMsg::Action {
            action: Action::Interact { tile: [0, 0] },
        },
    )
    .await;
    recv_until(&mut ws, |msg| match msg {
        ServerMsg::ActionRejected { .. } => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_accepted_battle_starts_minigame() {
    let url = start_test_server().await;
    let (mut ws1, id1) = joined_client(&url, "alice", 0).await;
    let (mut ws2, id2) = joined_client(&url, "bob", 0).await;

    send(
        &mut ws1,
        &ClientMsg::BattleRequest {
            receiver_id: id2,
            gamemode: "drawing".to_string(),
        },
    )
    .await;
    let request = recv_until(&mut ws2, |msg| match msg {
        ServerMsg::BattleRequestReceived(request) => Some(request),
        _ => None,
    })
    .await;
    assert_eq!(request.sender_id, id1);
    assert_eq!(request.sender_name, "alice");

    send(
        &mut ws2,
        &ClientMsg::BattleResponse {
            request_id: request.request_id,
            accept: true,
        },
    )
    .await;

    for ws in [&mut ws1, &mut ws2] {
        let start = recv_until(ws, |msg| match msg {
            ServerMsg::MinigameStart(start) => Some(start),
            _ => None,
        })
        .await;
        assert_eq!(start.gamemode, "drawing");
        assert_eq!(start.participants, vec![id1, id2]);
    }
}

#[tokio::test]
async fn test_garbage_frames_close_connection() {
    let url = start_test_server().await;
    let mut ws = connect(&url).await;

    for _ in 0..=MAX_PARSE_ERRORS {
        if ws
            .send(Message::Text("not json".to_string().into()))
            .await
            .is_err()
        {
            break;
        }
    }

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(closed, "Server should close after too many bad frames");
}
