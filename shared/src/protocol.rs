use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::{RoomDefinition, TileMap};
use crate::vec2::Vec2;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// === Server -> Client ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "clientData")]
    ClientData(ClientDataMsg),
    #[serde(rename = "connectionStatus")]
    ConnectionStatus(ConnectionStatusMsg),
    #[serde(rename = "assets")]
    Assets(AssetsMsg),
    #[serde(rename = "roomData")]
    RoomData(RoomDataMsg),
    #[serde(rename = "worldData")]
    WorldData(WorldDataMsg),
    #[serde(rename = "displayText")]
    DisplayText { text: String },
    #[serde(rename = "chat")]
    Chat(ChatMsg),
    #[serde(rename = "emote")]
    Emote(EmoteMsg),
    #[serde(rename = "actionRejected")]
    ActionRejected { reason: String },
    #[serde(rename = "battleRequestReceived")]
    BattleRequestReceived(BattleRequestReceivedMsg),
    #[serde(rename = "battleRequestResult")]
    BattleRequestResult(BattleRequestResultMsg),
    #[serde(rename = "minigameStart")]
    MinigameStart(MinigameStartMsg),
    #[serde(rename = "serverMinigameData")]
    ServerMinigameData(ServerMinigameDataMsg),
    #[serde(rename = "minigameEnd")]
    MinigameEnd(MinigameEndMsg),
    #[serde(rename = "error")]
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ClientDataMsg {
    pub protocol_version: u32,
    pub id: u32,
    pub world_list: Vec<WorldSummary>,
}

/// One entry of the world picker shown after login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct WorldSummary {
    pub name: String,
    pub max_players: u32,
    pub current_players: u32,
    pub is_full: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
pub struct ConnectionStatusMsg {
    pub successful: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct AssetsMsg {
    #[serde(rename = "tileSheetURL")]
    pub tile_sheet_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct RoomDataMsg {
    pub name: String,
    pub tile_map: TileMap,
    pub bounds: Vec<[f64; 2]>,
    pub dimensions: [u32; 2],
}

impl RoomDataMsg {
    pub fn from_room(room: &RoomDefinition) -> Self {
        Self {
            name: room.name.clone(),
            tile_map: room.tile_map.clone(),
            bounds: room.bounds.clone(),
            dimensions: room.dimensions,
        }
    }
}

/// Per-room snapshot. `entities` is ordered by id and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
pub struct WorldDataMsg {
    pub entities: Vec<EntityWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct EntityWire {
    pub id: u32,
    pub name: String,
    pub is_moving: bool,
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ChatMsg {
    pub sender_id: u32,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct EmoteMsg {
    pub entity_id: u32,
    pub emote: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct BattleRequestReceivedMsg {
    pub request_id: u32,
    pub sender_id: u32,
    pub sender_name: String,
    pub gamemode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub enum BattleStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl BattleStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BattleStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct BattleRequestResultMsg {
    pub request_id: u32,
    pub status: BattleStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct MinigameStartMsg {
    pub instance_id: u32,
    pub gamemode: String,
    pub participants: Vec<u32>,
    pub assets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ServerMinigameDataMsg {
    pub instance_id: u32,
    pub game_data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub enum MinigameEndReason {
    Completed,
    ParticipantLeft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct MinigameEndMsg {
    pub instance_id: u32,
    pub reason: MinigameEndReason,
}

// === Client -> Server ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "loginData")]
    LoginData { username: String },
    #[serde(rename = "joinWorldRequest")]
    JoinWorldRequest {
        #[serde(rename = "worldIndex")]
        world_index: usize,
    },
    #[serde(rename = "inputData")]
    InputData(InputState),
    #[serde(rename = "action")]
    Action { action: Action },
    #[serde(rename = "chat")]
    Chat { text: String },
    #[serde(rename = "battleRequest")]
    BattleRequest {
        #[serde(rename = "receiverId")]
        receiver_id: u32,
        gamemode: String,
    },
    #[serde(rename = "battleResponse")]
    BattleResponse {
        #[serde(rename = "requestId")]
        request_id: u32,
        accept: bool,
    },
    #[serde(rename = "clientMinigameData")]
    ClientMinigameData(ClientMinigameDataMsg),
}

/// Held directions of the movement controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
pub struct InputState {
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub down: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
}

/// Discrete, one-shot player actions. Continuous movement goes through
/// `InputState` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Action {
    Interact { tile: [u32; 2] },
    Emote { emote: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct ClientMinigameDataMsg {
    pub instance_id: u32,
    #[serde(default)]
    pub background_data: serde_json::Value,
    #[serde(default)]
    pub game_data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec2::vec2;

    #[test]
    fn world_data_uses_wire_names() {
        let msg = ServerMsg::WorldData(WorldDataMsg {
            entities: vec![EntityWire {
                id: 3,
                name: "alice".to_string(),
                is_moving: true,
                position: vec2(11.0, 23.0),
                velocity: vec2(1.0, 0.0),
            }],
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"worldData\""));
        assert!(json.contains("\"isMoving\":true"));
        assert!(json.contains("\"position\":{\"x\":11.0,\"y\":23.0}"));
    }

    #[test]
    fn empty_world_data_keeps_entities_field() {
        let msg = ServerMsg::WorldData(WorldDataMsg { entities: vec![] });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"entities\":[]"));
    }

    #[test]
    fn client_data_world_list_is_camel_case() {
        let msg = ServerMsg::ClientData(ClientDataMsg {
            protocol_version: PROTOCOL_VERSION,
            id: 1,
            world_list: vec![WorldSummary {
                name: "Test World".to_string(),
                max_players: 420,
                current_players: 0,
                is_full: false,
            }],
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"worldList\""));
        assert!(json.contains("\"maxPlayers\":420"));
        assert!(json.contains("\"isFull\":false"));
    }

    #[test]
    fn login_and_join_parse() {
        let login: ClientMsg =
            serde_json::from_str(r#"{"type":"loginData","username":"bob"}"#).unwrap();
        assert!(matches!(login, ClientMsg::LoginData { ref username } if username == "bob"));

        let join: ClientMsg =
            serde_json::from_str(r#"{"type":"joinWorldRequest","worldIndex":1}"#).unwrap();
        assert!(matches!(join, ClientMsg::JoinWorldRequest { world_index: 1 }));
    }

    #[test]
    fn input_data_missing_keys_default_to_released() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"inputData","left":true}"#).unwrap();
        match msg {
            ClientMsg::InputData(input) => {
                assert!(input.left);
                assert!(!input.right && !input.up && !input.down);
            }
            _ => panic!("Expected InputData"),
        }
    }

    #[test]
    fn action_is_tagged_by_kind() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"action","action":{"kind":"interact","tile":[12,1]}}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::Action { action } => assert_eq!(action, Action::Interact { tile: [12, 1] }),
            _ => panic!("Expected Action"),
        }
    }

    #[test]
    fn battle_request_parses_camel_case() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"battleRequest","receiverId":7,"gamemode":"drawing"}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::BattleRequest {
                receiver_id,
                gamemode,
            } => {
                assert_eq!(receiver_id, 7);
                assert_eq!(gamemode, "drawing");
            }
            _ => panic!("Expected BattleRequest"),
        }
    }

    #[test]
    fn battle_result_status_serializes_lowercase() {
        let msg = ServerMsg::BattleRequestResult(BattleRequestResultMsg {
            request_id: 2,
            status: BattleStatus::Expired,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"status\":\"expired\""));
        assert!(json.contains("\"requestId\":2"));
    }

    #[test]
    fn minigame_data_without_background_defaults_to_null() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"clientMinigameData","instanceId":4,"gameData":{"stroke":[1,2]}}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::ClientMinigameData(data) => {
                assert_eq!(data.instance_id, 4);
                assert!(data.background_data.is_null());
                assert_eq!(data.game_data["stroke"][1], 2);
            }
            _ => panic!("Expected ClientMinigameData"),
        }
    }

    #[test]
    fn minigame_end_reason_is_camel_case() {
        let msg = ServerMsg::MinigameEnd(MinigameEndMsg {
            instance_id: 1,
            reason: MinigameEndReason::ParticipantLeft,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"reason\":\"participantLeft\""));
    }

    #[test]
    fn assets_use_tile_sheet_url_key() {
        let msg = ServerMsg::Assets(AssetsMsg {
            tile_sheet_url: "/assets/tiles.png".to_string(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"tileSheetURL\":\"/assets/tiles.png\""));

        let parsed: ServerMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
