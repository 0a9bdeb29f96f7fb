//! A world: rooms, the clients and players inside them, and the subsystems
//! that advance them one tick at a time.

use crate::actions::ActionsHandler;
use crate::battle::{BattleError, BattleRequestHandler, RequestId};
use crate::chat::{Chat, ChatError};
use crate::client::{Client, ClientId};
use crate::config::WorldSettings;
use crate::minigame::{InstanceId, MinigameError, MinigameHandler};
use crate::outbox::{Envelope, Outbox};
use crate::physics::{Entity, HasKinematics, PhysicsEngine, PhysicsError};
use crate::player::Player;
use crate::room::{RoomId, Rooms};
use roomworld_shared::config::WorldDefinition;
use roomworld_shared::protocol::{
    Action, BattleStatus, ClientMinigameDataMsg, EntityWire, InputState, RoomDataMsg, ServerMsg,
    WorldDataMsg, WorldSummary,
};
use roomworld_shared::vec2::Vec2;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("world is full")]
    WorldFull,
    #[error("client {0} already joined this world")]
    AlreadyJoined(ClientId),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    #[error("client {0} has not joined this world")]
    NotJoined(ClientId),
    #[error("room '{0}' does not exist")]
    UnknownRoom(String),
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error(transparent)]
    Battle(#[from] BattleError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Minigame(#[from] MinigameError),
}

pub struct World {
    pub name: String,
    pub max_players: usize,
    pub tick_rate_hz: u32,
    start_message: String,
    player_speed: f64,
    rooms: Rooms,
    clients: HashMap<ClientId, Client>,
    players: HashMap<ClientId, Player>,
    physics: PhysicsEngine,
    actions: ActionsHandler,
    chat: Chat,
    battles: BattleRequestHandler,
    minigames: MinigameHandler,
    outbox: Outbox,
    evicted: Vec<ClientId>,
}

impl World {
    pub fn new(definition: &WorldDefinition, settings: &WorldSettings) -> Result<Self, String> {
        definition.validate()?;
        let rooms = Rooms::from_data(&definition.data)?;

        let mut physics = PhysicsEngine::new();
        for room in rooms.iter() {
            physics.set_room_bounds(room.id, room.bounds.clone());
        }

        Ok(Self {
            name: definition.name.clone(),
            max_players: definition.max_players,
            tick_rate_hz: settings.tick_rate_hz,
            start_message: definition.start_message.clone(),
            player_speed: settings.player_speed,
            rooms,
            clients: HashMap::new(),
            players: HashMap::new(),
            physics,
            actions: ActionsHandler::new(),
            chat: Chat::new(settings.max_chat_len),
            battles: BattleRequestHandler::new(settings.battle_request_timeout_secs),
            minigames: MinigameHandler::new(settings.rng_seed, settings.drawing_round_secs),
            outbox: Outbox::new(),
            evicted: Vec::new(),
        })
    }

    /// Advance the world by `dt` seconds and queue this tick's snapshots.
    ///
    /// Returns the clients removed for consistency faults since the last
    /// call; they are no longer in this world.
    pub fn update(&mut self, dt: f64) -> Vec<ClientId> {
        self.physics.update(dt);

        let changes = self.actions.handle_all_actions(
            &self.clients,
            &self.rooms,
            &self.physics,
            &mut self.outbox,
        );
        for change in changes {
            if let Err(e) =
                self.change_client_room(change.client_id, &change.room, change.start_coords)
            {
                tracing::warn!("Room change for client {} failed: {}", change.client_id, e);
            }
        }

        let minigames = &self.minigames;
        let resolutions = self.battles.update(
            dt,
            |id| minigames.session_of(id).is_some(),
            &mut self.outbox,
        );
        for resolution in resolutions {
            if resolution.status == BattleStatus::Accepted {
                self.start_minigame(resolution.participants.to_vec(), &resolution.gamemode);
            }
        }

        self.minigames.update(dt, &mut self.outbox);

        self.enforce_consistency();
        self.broadcast_snapshots();
        std::mem::take(&mut self.evicted)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn current_players(&self) -> usize {
        self.players.len()
    }

    pub fn summary(&self) -> WorldSummary {
        WorldSummary {
            name: self.name.clone(),
            max_players: self.max_players as u32,
            current_players: self.current_players() as u32,
            is_full: self.is_full(),
        }
    }

    /// Add a client and its player at the start room. Either everything is
    /// registered or nothing is.
    pub fn request_player_join(
        &mut self,
        id: ClientId,
        username: &str,
    ) -> Result<(), JoinError> {
        if self.is_full() {
            return Err(JoinError::WorldFull);
        }
        if self.clients.contains_key(&id)
            || self.players.contains_key(&id)
            || self.physics.contains(id)
        {
            return Err(JoinError::AlreadyJoined(id));
        }

        let room = self.rooms.start_room();
        let room_id = room.id;
        let entity = Entity::new(id, username, room.def.start_pos).in_room(room_id);
        self.physics
            .add_entity(entity)
            .map_err(|_| JoinError::AlreadyJoined(id))?;

        let mut client = Client::new(id, username, room_id);
        let first_visit = client.first_visit(room_id);
        self.clients.insert(id, client);
        self.players.insert(id, Player::new(id, self.player_speed));

        self.outbox
            .send(id, ServerMsg::RoomData(RoomDataMsg::from_room(&room.def)));
        self.outbox.send(
            id,
            ServerMsg::DisplayText {
                text: self.start_message.clone(),
            },
        );
        if let (true, Some(message)) = (first_visit, &room.def.message) {
            self.outbox.send(
                id,
                ServerMsg::DisplayText {
                    text: message.clone(),
                },
            );
        }

        tracing::info!(
            "Client {} ({}) joined world '{}' ({}/{})",
            id,
            username,
            self.name,
            self.players.len(),
            self.max_players
        );
        Ok(())
    }

    /// Move a client's entity to `start_coords` in `room_name`.
    pub fn change_client_room(
        &mut self,
        id: ClientId,
        room_name: &str,
        start_coords: [f64; 2],
    ) -> Result<(), WorldError> {
        let room_id = self
            .rooms
            .by_name(room_name)
            .map(|r| r.id)
            .ok_or_else(|| WorldError::UnknownRoom(room_name.to_string()))?;
        if !self.clients.contains_key(&id) {
            return Err(WorldError::NotJoined(id));
        }

        if let Err(e) = self.physics.set_room(id, room_id, Vec2::from(start_coords)) {
            tracing::error!("Consistency fault: client {} has no entity: {}", id, e);
            self.evict(id);
            return Err(e.into());
        }

        let Some(client) = self.clients.get_mut(&id) else {
            return Err(WorldError::NotJoined(id));
        };
        client.room = room_id;
        let first_visit = client.first_visit(room_id);

        if let Some(room) = self.rooms.get(room_id) {
            self.outbox
                .send(id, ServerMsg::RoomData(RoomDataMsg::from_room(&room.def)));
            if let (true, Some(message)) = (first_visit, &room.def.message) {
                self.outbox.send(
                    id,
                    ServerMsg::DisplayText {
                        text: message.clone(),
                    },
                );
            }
        }
        tracing::debug!("Client {} moved to room '{}'", id, room_name);
        Ok(())
    }

    /// Remove every trace of a client. Safe to call repeatedly and for ids
    /// that never fully joined. Returns whether anything was removed.
    pub fn player_disconnect(&mut self, id: ClientId) -> bool {
        let had_client = self.clients.remove(&id).is_some();
        let had_player = self.players.remove(&id).is_some();
        let had_entity = self.physics.remove_entity(id).is_some();

        self.outbox.discard_for(id);
        self.actions.discard_for(id);
        self.battles.participant_disconnected(id, &mut self.outbox);
        self.minigames.participant_disconnected(id, &mut self.outbox);

        let removed = had_client || had_player || had_entity;
        if removed {
            tracing::info!("Client {} left world '{}'", id, self.name);
        }
        removed
    }

    /// Feed movement input to the player's controller and its entity.
    pub fn set_player_input(&mut self, id: ClientId, input: InputState) -> Result<(), WorldError> {
        let player = self.players.get_mut(&id).ok_or(WorldError::NotJoined(id))?;
        player.controller.set_input(input);
        let velocity = player.controller.velocity();
        self.physics.set_velocity(player.entity_id, velocity)?;
        Ok(())
    }

    /// Queue a discrete action for the next tick.
    pub fn submit_action(&mut self, id: ClientId, action: Action) -> Result<(), WorldError> {
        if !self.clients.contains_key(&id) {
            return Err(WorldError::NotJoined(id));
        }
        self.actions.submit(id, action);
        Ok(())
    }

    pub fn emit_chat(&mut self, id: ClientId, text: &str) -> Result<(), WorldError> {
        if !self.clients.contains_key(&id) {
            return Err(WorldError::NotJoined(id));
        }
        self.chat
            .handle_chat(id, text, &self.clients, &mut self.outbox)?;
        Ok(())
    }

    pub fn new_battle_request(
        &mut self,
        sender: ClientId,
        receiver: ClientId,
        gamemode: &str,
    ) -> Result<RequestId, WorldError> {
        let sender_name = self
            .clients
            .get(&sender)
            .map(|c| c.username.clone())
            .ok_or(BattleError::InvalidParticipant(sender))?;
        for id in [sender, receiver] {
            if self.minigames.session_of(id).is_some() {
                return Err(BattleError::Busy(id).into());
            }
        }

        let clients = &self.clients;
        let id = self.battles.new_battle_request(
            sender,
            &sender_name,
            receiver,
            gamemode,
            |id| clients.contains_key(&id),
            &mut self.outbox,
        )?;
        Ok(id)
    }

    pub fn respond_battle_request(
        &mut self,
        responder: ClientId,
        request_id: RequestId,
        accept: bool,
    ) -> Result<(), WorldError> {
        if !self.clients.contains_key(&responder) {
            return Err(WorldError::NotJoined(responder));
        }
        self.battles.respond(request_id, responder, accept)?;
        Ok(())
    }

    pub fn minigame_data(
        &mut self,
        from: ClientId,
        data: &ClientMinigameDataMsg,
    ) -> Result<(), WorldError> {
        if !self.clients.contains_key(&from) {
            return Err(WorldError::NotJoined(from));
        }
        self.minigames.client_data(from, data, &mut self.outbox)?;
        Ok(())
    }

    /// Messages queued since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        self.outbox.drain()
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn player(&self, id: ClientId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn physics(&self) -> &PhysicsEngine {
        &self.physics
    }

    #[cfg(test)]
    pub(crate) fn physics_mut(&mut self) -> &mut PhysicsEngine {
        &mut self.physics
    }

    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    pub fn battles(&self) -> &BattleRequestHandler {
        &self.battles
    }

    pub fn minigames(&self) -> &MinigameHandler {
        &self.minigames
    }

    pub fn room_of(&self, id: ClientId) -> Option<RoomId> {
        self.clients.get(&id).map(|c| c.room)
    }

    fn start_minigame(&mut self, participants: Vec<ClientId>, gamemode: &str) -> Option<InstanceId> {
        for id in &participants {
            if !self.clients.contains_key(id) {
                tracing::debug!("Not starting minigame: client {} left", id);
                return None;
            }
            if self.minigames.session_of(*id).is_some() {
                tracing::debug!("Not starting minigame: client {} is busy", id);
                return None;
            }
        }
        Some(
            self.minigames
                .new_minigame(participants, gamemode, &mut self.outbox),
        )
    }

    /// Every player needs a client and an entity, and every client a player.
    /// Broken registrations are logged and removed so the tick can go on.
    fn enforce_consistency(&mut self) {
        let broken: BTreeSet<ClientId> = self
            .players
            .keys()
            .filter(|id| !self.clients.contains_key(*id) || !self.physics.contains(**id))
            .chain(
                self.clients
                    .keys()
                    .filter(|id| !self.players.contains_key(*id)),
            )
            .copied()
            .collect();

        for id in broken {
            tracing::error!(
                "Consistency fault in world '{}': incomplete registration for client {}, removing",
                self.name,
                id
            );
            self.evict(id);
        }
    }

    fn evict(&mut self, id: ClientId) {
        if self.player_disconnect(id) {
            self.evicted.push(id);
        }
    }

    /// Send each client the entities of the room it is in.
    fn broadcast_snapshots(&mut self) {
        let mut audience: BTreeMap<RoomId, Vec<ClientId>> = BTreeMap::new();
        for client in self.clients.values() {
            audience.entry(client.room).or_default().push(client.id);
        }

        for (room, viewers) in audience {
            let entities = match self.physics.entities_in_room(room) {
                Ok(entities) => entities,
                Err(e) => {
                    tracing::error!(
                        "Consistency fault in world '{}' {}: {}; skipping snapshot",
                        self.name,
                        room,
                        e
                    );
                    self.physics.repair_room_index(room);
                    continue;
                }
            };

            let snapshot = WorldDataMsg {
                entities: entities.into_iter().map(project).collect(),
            };
            for id in viewers {
                self.outbox.send(id, ServerMsg::WorldData(snapshot.clone()));
            }
        }
    }
}

fn project(entity: &Entity) -> EntityWire {
    EntityWire {
        id: entity.id,
        name: entity.name.clone(),
        is_moving: entity.is_moving(),
        position: entity.position(),
        velocity: entity.velocity(),
    }
}
