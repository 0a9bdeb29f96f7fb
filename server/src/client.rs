use crate::room::RoomId;
use std::collections::HashSet;

pub type ClientId = u32;

/// A connection that has joined a world.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub username: String,
    pub room: RoomId,
    visited: HashSet<RoomId>,
}

impl Client {
    pub fn new(id: ClientId, username: impl Into<String>, room: RoomId) -> Self {
        Self {
            id,
            username: username.into(),
            room,
            visited: HashSet::new(),
        }
    }

    /// Marks `room` as visited. Returns true the first time only.
    pub fn first_visit(&mut self, room: RoomId) -> bool {
        self.visited.insert(room)
    }
}
