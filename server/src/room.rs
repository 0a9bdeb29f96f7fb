use roomworld_shared::config::{RoomDefinition, WorldData};
use roomworld_shared::vec2::Vec2;
use std::collections::HashMap;
use std::fmt;

/// Index of a room inside its world. Stable for the world's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(pub u16);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room#{}", self.0)
    }
}

/// A room definition plus its precomputed walkable polygon.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub def: RoomDefinition,
    pub bounds: Vec<Vec2>,
}

/// The immutable room table of a world.
#[derive(Debug, Clone)]
pub struct Rooms {
    rooms: Vec<Room>,
    by_name: HashMap<String, RoomId>,
    start: RoomId,
}

impl Rooms {
    pub fn from_data(data: &WorldData) -> Result<Self, String> {
        if data.room_list.len() > u16::MAX as usize {
            return Err("too many rooms".to_string());
        }

        let rooms: Vec<Room> = data
            .room_list
            .iter()
            .enumerate()
            .map(|(i, def)| Room {
                id: RoomId(i as u16),
                bounds: def.bounds_polygon(),
                def: def.clone(),
            })
            .collect();
        let by_name: HashMap<String, RoomId> =
            rooms.iter().map(|r| (r.def.name.clone(), r.id)).collect();
        let start = *by_name
            .get(&data.start_room)
            .ok_or_else(|| format!("start room '{}' is not defined", data.start_room))?;

        Ok(Self {
            rooms,
            by_name,
            start,
        })
    }

    pub fn get(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(id.0 as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&Room> {
        self.by_name.get(name).and_then(|id| self.get(*id))
    }

    pub fn start_room(&self) -> &Room {
        &self.rooms[self.start.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
