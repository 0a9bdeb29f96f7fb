use crate::vec2::{point_in_polygon, Vec2};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Tile grid of a room. `tiles` is row-major, `cols * rows` long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
pub struct TileMap {
    pub cols: u32,
    pub rows: u32,
    /// Tile edge length in pixels
    pub tsize: u32,
    pub tiles: Vec<u32>,
}

impl TileMap {
    /// Tile index at (col, row), None when outside the grid.
    pub fn tile_at(&self, col: u32, row: u32) -> Option<u32> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.tiles.get((row * self.cols + col) as usize).copied()
    }
}

/// A tile that moves whoever interacts with it into another room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct RoomExit {
    pub tile: [u32; 2],
    pub target_room: String,
    pub target_pos: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct RoomDefinition {
    pub name: String,
    pub start_pos: Vec2,
    pub tile_map: TileMap,
    /// Walkable area polygon, in tile units
    pub bounds: Vec<[f64; 2]>,
    pub dimensions: [u32; 2],
    /// Shown once to a client the first time it enters the room
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub message: Option<String>,
    #[serde(default)]
    pub exits: Vec<RoomExit>,
}

impl RoomDefinition {
    pub fn bounds_polygon(&self) -> Vec<Vec2> {
        self.bounds.iter().copied().map(Vec2::from).collect()
    }

    pub fn exit_at(&self, tile: [u32; 2]) -> Option<&RoomExit> {
        self.exits.iter().find(|e| e.tile == tile)
    }
}

/// Static content of a world: its rooms and where newcomers spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldData {
    pub start_room: String,
    pub room_list: Vec<RoomDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDefinition {
    pub name: String,
    pub max_players: usize,
    #[serde(default = "default_start_message")]
    pub start_message: String,
    pub data: WorldData,
}

fn default_start_message() -> String {
    "Hello.".to_string()
}

/// Top-level layout of a worlds JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldsFile {
    pub worlds: Vec<WorldDefinition>,
}

impl WorldsFile {
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: WorldsFile =
            serde_json::from_str(json).map_err(|e| format!("invalid worlds file: {}", e))?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.worlds.is_empty() {
            return Err("at least one world must be defined".to_string());
        }
        for world in &self.worlds {
            world
                .validate()
                .map_err(|e| format!("world '{}': {}", world.name, e))?;
        }
        Ok(())
    }
}

impl WorldDefinition {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_players == 0 {
            return Err("max_players must be > 0".to_string());
        }
        let rooms = &self.data.room_list;
        if rooms.is_empty() {
            return Err("room_list must not be empty".to_string());
        }
        for (i, room) in rooms.iter().enumerate() {
            if rooms[..i].iter().any(|r| r.name == room.name) {
                return Err(format!("duplicate room name '{}'", room.name));
            }
        }
        if !rooms.iter().any(|r| r.name == self.data.start_room) {
            return Err(format!("start_room '{}' is not defined", self.data.start_room));
        }
        for room in rooms {
            room.validate(rooms)
                .map_err(|e| format!("room '{}': {}", room.name, e))?;
        }
        Ok(())
    }
}

impl RoomDefinition {
    fn validate(&self, all_rooms: &[RoomDefinition]) -> Result<(), String> {
        let map = &self.tile_map;
        if map.cols == 0 || map.rows == 0 {
            return Err("tile map must have at least one column and row".to_string());
        }
        let expected = map
            .cols
            .checked_mul(map.rows)
            .ok_or_else(|| format!("tile map {}x{} is too large", map.cols, map.rows))?;
        if map.tiles.len() as u64 != u64::from(expected) {
            return Err(format!(
                "tile map has {} tiles, expected {}",
                map.tiles.len(),
                expected
            ));
        }
        if self.bounds.len() < 3 {
            return Err("bounds must have at least 3 points".to_string());
        }
        if self.bounds.iter().flatten().any(|v| !v.is_finite()) {
            return Err("bounds must be finite".to_string());
        }
        if !point_in_polygon(self.start_pos, &self.bounds_polygon()) {
            return Err("start_pos must lie inside bounds".to_string());
        }
        for exit in &self.exits {
            if map.tile_at(exit.tile[0], exit.tile[1]).is_none() {
                return Err(format!("exit tile {:?} is outside the tile map", exit.tile));
            }
            let target = all_rooms
                .iter()
                .find(|r| r.name == exit.target_room)
                .ok_or_else(|| format!("exit targets unknown room '{}'", exit.target_room))?;
            if !point_in_polygon(Vec2::from(exit.target_pos), &target.bounds_polygon()) {
                return Err(format!(
                    "exit target position {:?} is outside room '{}'",
                    exit.target_pos, target.name
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec2::vec2;

    fn room(name: &str) -> RoomDefinition {
        RoomDefinition {
            name: name.to_string(),
            start_pos: vec2(2.0, 2.0),
            tile_map: TileMap {
                cols: 4,
                rows: 4,
                tsize: 16,
                tiles: vec![1; 16],
            },
            bounds: vec![[1.0, 1.0], [3.0, 1.0], [3.0, 3.0], [1.0, 3.0]],
            dimensions: [4, 4],
            message: None,
            exits: vec![],
        }
    }

    fn world(rooms: Vec<RoomDefinition>) -> WorldDefinition {
        WorldDefinition {
            name: "Test".to_string(),
            max_players: 4,
            start_message: default_start_message(),
            data: WorldData {
                start_room: "lobby".to_string(),
                room_list: rooms,
            },
        }
    }

    #[test]
    fn minimal_world_is_valid() {
        assert!(world(vec![room("lobby")]).validate().is_ok());
    }

    #[test]
    fn missing_start_room_invalid() {
        assert!(world(vec![room("garden")]).validate().is_err());
    }

    #[test]
    fn wrong_tile_count_invalid() {
        let mut r = room("lobby");
        r.tile_map.tiles.pop();
        assert!(world(vec![r]).validate().is_err());
    }

    #[test]
    fn room_message_binding_is_optional() {
        let decl = RoomDefinition::decl();
        assert!(decl.contains("message?: string"), "{}", decl);
    }

    #[test]
    fn oversized_tile_map_invalid() {
        let mut r = room("lobby");
        r.tile_map.cols = 65_536;
        r.tile_map.rows = 65_536;
        let err = world(vec![r]).validate().unwrap_err();
        assert!(err.contains("too large"), "{}", err);
    }

    #[test]
    fn start_pos_outside_bounds_invalid() {
        let mut r = room("lobby");
        r.start_pos = vec2(0.0, 0.0);
        assert!(world(vec![r]).validate().is_err());
    }

    #[test]
    fn exit_to_unknown_room_invalid() {
        let mut r = room("lobby");
        r.exits.push(RoomExit {
            tile: [2, 1],
            target_room: "nowhere".to_string(),
            target_pos: [2.0, 2.0],
        });
        assert!(world(vec![r]).validate().is_err());
    }

    #[test]
    fn duplicate_room_names_invalid() {
        assert!(world(vec![room("lobby"), room("lobby")]).validate().is_err());
    }

    #[test]
    fn tile_at_respects_grid() {
        let mut r = room("lobby");
        r.tile_map.tiles[1 * 4 + 2] = 5;
        assert_eq!(r.tile_map.tile_at(2, 1), Some(5));
        assert_eq!(r.tile_map.tile_at(4, 0), None);
    }

    #[test]
    fn worlds_file_parses_camel_case() {
        let json = r#"{
            "worlds": [{
                "name": "Test",
                "maxPlayers": 3,
                "data": {
                    "startRoom": "lobby",
                    "roomList": [{
                        "name": "lobby",
                        "startPos": {"x": 2, "y": 2},
                        "tileMap": {"cols": 2, "rows": 2, "tsize": 16, "tiles": [1, 1, 1, 1]},
                        "bounds": [[0, 0], [2, 0], [2, 2], [0, 2]],
                        "dimensions": [2, 2]
                    }]
                }
            }]
        }"#;
        let file = WorldsFile::from_json(json).unwrap();
        assert_eq!(file.worlds[0].max_players, 3);
        assert_eq!(file.worlds[0].start_message, "Hello.");
        assert!(file.worlds[0].data.room_list[0].exits.is_empty());
    }
}
