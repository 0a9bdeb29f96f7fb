use crate::client::{Client, ClientId};
use crate::outbox::Outbox;
use crate::physics::{HasKinematics, PhysicsEngine};
use crate::room::Rooms;
use roomworld_shared::protocol::{Action, EmoteMsg, ServerMsg};
use roomworld_shared::vec2::{distance, vec2};
use std::collections::{HashMap, VecDeque};

/// Max distance (tiles) between a player and a tile it interacts with
pub const INTERACT_REACH: f64 = 1.5;
pub const MAX_EMOTE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("client {0} has no entity in this world")]
    NoEntity(ClientId),
    #[error("room of client {0} does not exist")]
    UnknownRoom(ClientId),
    #[error("tile {0:?} is out of reach")]
    OutOfReach([u32; 2]),
    #[error("nothing to interact with at tile {0:?}")]
    NothingThere([u32; 2]),
    #[error("emote must be 1 to 32 characters")]
    InvalidEmote,
}

/// A validated interaction that moves a client to another room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomChange {
    pub client_id: ClientId,
    pub room: String,
    pub start_coords: [f64; 2],
}

/// Queue of discrete actions, applied once per tick.
#[derive(Debug, Default)]
pub struct ActionsHandler {
    queue: VecDeque<(ClientId, Action)>,
}

impl ActionsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, client_id: ClientId, action: Action) {
        self.queue.push_back((client_id, action));
    }

    /// Forget queued actions of a client that left.
    pub fn discard_for(&mut self, client_id: ClientId) {
        self.queue.retain(|(id, _)| *id != client_id);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drain the queue, validating each action against the submitter's room
    /// and position. Rejected actions are reported to their submitter only.
    /// Room changes are returned for the world to apply.
    pub fn handle_all_actions(
        &mut self,
        clients: &HashMap<ClientId, Client>,
        rooms: &Rooms,
        physics: &PhysicsEngine,
        outbox: &mut Outbox,
    ) -> Vec<RoomChange> {
        let mut changes = Vec::new();

        while let Some((client_id, action)) = self.queue.pop_front() {
            // Left before the tick ran
            let Some(client) = clients.get(&client_id) else {
                continue;
            };

            match apply(client, &action, clients, rooms, physics, outbox) {
                Ok(Some(change)) => changes.push(change),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("Rejected action {:?} from {}: {}", action, client_id, e);
                    outbox.send(
                        client_id,
                        ServerMsg::ActionRejected {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        changes
    }
}

fn apply(
    client: &Client,
    action: &Action,
    clients: &HashMap<ClientId, Client>,
    rooms: &Rooms,
    physics: &PhysicsEngine,
    outbox: &mut Outbox,
) -> Result<Option<RoomChange>, ActionError> {
    let entity = physics
        .get(client.id)
        .ok_or(ActionError::NoEntity(client.id))?;

    match action {
        Action::Interact { tile } => {
            let room = rooms
                .get(client.room)
                .ok_or(ActionError::UnknownRoom(client.id))?;
            let tile_pos = vec2(tile[0] as f64, tile[1] as f64);
            if distance(entity.position(), tile_pos) > INTERACT_REACH {
                return Err(ActionError::OutOfReach(*tile));
            }
            let exit = room.def.exit_at(*tile).ok_or(ActionError::NothingThere(*tile))?;
            Ok(Some(RoomChange {
                client_id: client.id,
                room: exit.target_room.clone(),
                start_coords: exit.target_pos,
            }))
        }
        Action::Emote { emote } => {
            let emote = emote.trim();
            let len = emote.chars().count();
            if len == 0 || len > MAX_EMOTE_LEN {
                return Err(ActionError::InvalidEmote);
            }
            let msg = EmoteMsg {
                entity_id: entity.id,
                emote: emote.to_string(),
            };
            for other in clients.values().filter(|c| c.room == client.room) {
                outbox.send(other.id, ServerMsg::Emote(msg.clone()));
            }
            Ok(None)
        }
    }
}
