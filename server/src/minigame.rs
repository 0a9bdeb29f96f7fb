//! Lifecycle of minigame sessions spawned by accepted battle requests.

use crate::client::ClientId;
use crate::drawing::DrawingGame;
use crate::outbox::Outbox;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use roomworld_shared::protocol::{
    ClientMinigameDataMsg, MinigameEndMsg, MinigameEndReason, MinigameStartMsg, ServerMsg,
    ServerMinigameDataMsg,
};
use serde_json::Value;
use std::collections::BTreeMap;

pub type InstanceId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Running,
    Completed,
}

/// Game logic embedded in a session.
pub trait Gamemode: Send + std::fmt::Debug {
    fn tag(&self) -> &'static str;
    /// Asset paths the client must load before the game starts
    fn assets(&self) -> Vec<String>;
    /// Initial per-participant game data
    fn start(&mut self) -> Vec<(ClientId, Value)>;
    fn tick(&mut self, dt: f64) -> GameStatus;
    /// React to data a participant sent; returns data to send out
    fn handle_client_data(
        &mut self,
        from: ClientId,
        background_data: &Value,
        game_data: &Value,
    ) -> Vec<(ClientId, Value)>;
}

/// Known gamemodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamemodeKind {
    Drawing,
}

impl GamemodeKind {
    /// Every request currently plays the drawing game, whatever was asked for.
    pub fn resolve(requested: &str) -> Self {
        if requested != "drawing" {
            tracing::debug!("Gamemode '{}' requested, playing drawing", requested);
        }
        GamemodeKind::Drawing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MinigameError {
    #[error("minigame {0} does not exist")]
    UnknownInstance(InstanceId),
    #[error("client {0} is not part of minigame {1}")]
    NotParticipant(ClientId, InstanceId),
}

#[derive(Debug)]
pub struct MinigameSession {
    pub instance_id: InstanceId,
    pub participants: Vec<ClientId>,
    pub gamemode: &'static str,
    game: Box<dyn Gamemode>,
}

impl MinigameSession {
    fn end(&self, reason: MinigameEndReason, outbox: &mut Outbox, skip: Option<ClientId>) {
        let msg = MinigameEndMsg {
            instance_id: self.instance_id,
            reason,
        };
        for id in self.participants.iter().filter(|id| Some(**id) != skip) {
            outbox.send(*id, ServerMsg::MinigameEnd(msg.clone()));
        }
    }

    fn send_data(&self, data: Vec<(ClientId, Value)>, outbox: &mut Outbox) {
        for (to, game_data) in data {
            outbox.send(
                to,
                ServerMsg::ServerMinigameData(ServerMinigameDataMsg {
                    instance_id: self.instance_id,
                    game_data,
                }),
            );
        }
    }
}

#[derive(Debug)]
pub struct MinigameHandler {
    sessions: BTreeMap<InstanceId, MinigameSession>,
    next_instance_id: InstanceId,
    rng: ChaCha8Rng,
    round_secs: f64,
}

impl MinigameHandler {
    pub fn new(rng_seed: u64, round_secs: f64) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_instance_id: 1,
            rng: ChaCha8Rng::seed_from_u64(rng_seed),
            round_secs,
        }
    }

    /// Start a session and tell every participant about it.
    pub fn new_minigame(
        &mut self,
        participants: Vec<ClientId>,
        requested: &str,
        outbox: &mut Outbox,
    ) -> InstanceId {
        let game: Box<dyn Gamemode> = match GamemodeKind::resolve(requested) {
            GamemodeKind::Drawing => Box::new(DrawingGame::new(
                &participants,
                self.round_secs,
                &mut self.rng,
            )),
        };

        let instance_id = self.next_instance_id;
        self.next_instance_id += 1;

        let mut session = MinigameSession {
            instance_id,
            gamemode: game.tag(),
            participants,
            game,
        };

        let start = MinigameStartMsg {
            instance_id,
            gamemode: session.gamemode.to_string(),
            participants: session.participants.clone(),
            assets: session.game.assets(),
        };
        for id in &session.participants {
            outbox.send(*id, ServerMsg::MinigameStart(start.clone()));
        }
        let initial = session.game.start();
        session.send_data(initial, outbox);

        tracing::info!(
            "Minigame {} ({}) started for {:?}",
            instance_id,
            session.gamemode,
            session.participants
        );
        self.sessions.insert(instance_id, session);
        instance_id
    }

    /// Advance every session; completed ones are announced and removed.
    pub fn update(&mut self, dt: f64, outbox: &mut Outbox) {
        let mut completed = Vec::new();
        for session in self.sessions.values_mut() {
            if session.game.tick(dt) == GameStatus::Completed {
                completed.push(session.instance_id);
            }
        }

        for id in completed {
            if let Some(session) = self.sessions.remove(&id) {
                session.end(MinigameEndReason::Completed, outbox, None);
                tracing::info!("Minigame {} completed", id);
            }
        }
    }

    pub fn client_data(
        &mut self,
        from: ClientId,
        data: &ClientMinigameDataMsg,
        outbox: &mut Outbox,
    ) -> Result<(), MinigameError> {
        let session = self
            .sessions
            .get_mut(&data.instance_id)
            .ok_or(MinigameError::UnknownInstance(data.instance_id))?;
        if !session.participants.contains(&from) {
            return Err(MinigameError::NotParticipant(from, data.instance_id));
        }

        let out = session
            .game
            .handle_client_data(from, &data.background_data, &data.game_data);
        session.send_data(out, outbox);
        Ok(())
    }

    /// Tear down every session containing `id`. Returns the ended instance ids.
    pub fn participant_disconnected(&mut self, id: ClientId, outbox: &mut Outbox) -> Vec<InstanceId> {
        let ended: Vec<InstanceId> = self
            .sessions
            .values()
            .filter(|s| s.participants.contains(&id))
            .map(|s| s.instance_id)
            .collect();

        for instance_id in &ended {
            if let Some(session) = self.sessions.remove(instance_id) {
                session.end(MinigameEndReason::ParticipantLeft, outbox, Some(id));
                tracing::info!(
                    "Minigame {} ended: participant {} left",
                    instance_id,
                    id
                );
            }
        }
        ended
    }

    pub fn session_of(&self, id: ClientId) -> Option<&MinigameSession> {
        self.sessions
            .values()
            .find(|s| s.participants.contains(&id))
    }

    pub fn get(&self, instance_id: InstanceId) -> Option<&MinigameSession> {
        self.sessions.get(&instance_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
