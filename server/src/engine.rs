//! The engine task: owns every world and every session, applies commands
//! from connections between ticks and routes outbound messages.

use crate::client::ClientId;
use crate::config::ServerConfig;
use crate::outbox::Envelope;
use crate::world::{JoinError, World, WorldError};
use roomworld_shared::protocol::{
    Action, AssetsMsg, ClientDataMsg, ClientMinigameDataMsg, ClientMsg, ConnectionStatusMsg,
    InputState, ServerMsg, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Upper bound for one tick's dt (seconds)
pub const MAX_FRAME_SECS: f64 = 0.25;
pub const MAX_USERNAME_LEN: usize = 24;

/// Commands from connection tasks to the engine
#[derive(Debug)]
pub enum EngineCommand {
    Connect {
        response: oneshot::Sender<(ClientId, mpsc::Receiver<ServerMsg>)>,
    },
    Login {
        client_id: ClientId,
        username: String,
    },
    JoinWorld {
        client_id: ClientId,
        world_index: usize,
    },
    Input {
        client_id: ClientId,
        input: InputState,
    },
    Action {
        client_id: ClientId,
        action: Action,
    },
    Chat {
        client_id: ClientId,
        text: String,
    },
    BattleRequest {
        client_id: ClientId,
        receiver_id: ClientId,
        gamemode: String,
    },
    BattleResponse {
        client_id: ClientId,
        request_id: u32,
        accept: bool,
    },
    MinigameData {
        client_id: ClientId,
        data: ClientMinigameDataMsg,
    },
    Disconnect {
        client_id: ClientId,
    },
}

impl EngineCommand {
    /// Wrap a parsed client frame.
    pub fn from_client(client_id: ClientId, msg: ClientMsg) -> Self {
        match msg {
            ClientMsg::LoginData { username } => Self::Login {
                client_id,
                username,
            },
            ClientMsg::JoinWorldRequest { world_index } => Self::JoinWorld {
                client_id,
                world_index,
            },
            ClientMsg::InputData(input) => Self::Input { client_id, input },
            ClientMsg::Action { action } => Self::Action { client_id, action },
            ClientMsg::Chat { text } => Self::Chat { client_id, text },
            ClientMsg::BattleRequest {
                receiver_id,
                gamemode,
            } => Self::BattleRequest {
                client_id,
                receiver_id,
                gamemode,
            },
            ClientMsg::BattleResponse { request_id, accept } => Self::BattleResponse {
                client_id,
                request_id,
                accept,
            },
            ClientMsg::ClientMinigameData(data) => Self::MinigameData { client_id, data },
        }
    }
}

/// One live connection.
#[derive(Debug)]
struct Session {
    username: Option<String>,
    world: Option<usize>,
    tx: mpsc::Sender<ServerMsg>,
}

pub struct Engine {
    worlds: Vec<World>,
    sessions: HashMap<ClientId, Session>,
    next_client_id: ClientId,
    tile_sheet_url: String,
    queue_capacity: usize,
}

impl Engine {
    pub fn new(worlds: Vec<World>, config: &ServerConfig) -> Self {
        Self {
            worlds,
            sessions: HashMap::new(),
            next_client_id: 1,
            tile_sheet_url: config.tile_sheet_url.clone(),
            queue_capacity: config.client_queue_capacity,
        }
    }

    pub fn worlds(&self) -> &[World] {
        &self.worlds
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn handle(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Connect { response } => {
                let (id, rx) = self.connect();
                if response.send((id, rx)).is_err() {
                    // Connection task went away before it got its id
                    self.disconnect(id);
                }
            }
            EngineCommand::Login {
                client_id,
                username,
            } => self.login(client_id, &username),
            EngineCommand::JoinWorld {
                client_id,
                world_index,
            } => self.join_world(client_id, world_index),
            EngineCommand::Input { client_id, input } => {
                self.with_world(client_id, |world| world.set_player_input(client_id, input))
            }
            EngineCommand::Action { client_id, action } => {
                self.with_world(client_id, |world| world.submit_action(client_id, action))
            }
            EngineCommand::Chat { client_id, text } => {
                self.with_world(client_id, |world| world.emit_chat(client_id, &text))
            }
            EngineCommand::BattleRequest {
                client_id,
                receiver_id,
                gamemode,
            } => self.with_world(client_id, |world| {
                world
                    .new_battle_request(client_id, receiver_id, &gamemode)
                    .map(|_| ())
            }),
            EngineCommand::BattleResponse {
                client_id,
                request_id,
                accept,
            } => self.with_world(client_id, |world| {
                world.respond_battle_request(client_id, request_id, accept)
            }),
            EngineCommand::MinigameData { client_id, data } => {
                self.with_world(client_id, |world| world.minigame_data(client_id, &data))
            }
            EngineCommand::Disconnect { client_id } => self.disconnect(client_id),
        }
    }

    /// Register a connection and hand out its id and outbound queue.
    pub fn connect(&mut self) -> (ClientId, mpsc::Receiver<ServerMsg>) {
        let id = self.next_client_id;
        self.next_client_id += 1;
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.sessions.insert(
            id,
            Session {
                username: None,
                world: None,
                tx,
            },
        );
        tracing::info!("Client {} connected", id);
        (id, rx)
    }

    pub fn login(&mut self, id: ClientId, username: &str) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if session.world.is_some() {
            self.send(id, error("already in a world"));
            return;
        }
        let username = username.trim();
        let len = username.chars().count();
        if len == 0 || len > MAX_USERNAME_LEN {
            tracing::debug!("Client {} sent invalid username", id);
            self.send(id, error("username must be 1 to 24 characters"));
            return;
        }

        session.username = Some(username.to_string());
        let msg = ServerMsg::ClientData(ClientDataMsg {
            protocol_version: PROTOCOL_VERSION,
            id,
            world_list: self.worlds.iter().map(World::summary).collect(),
        });
        self.send(id, msg);
        tracing::info!("Client {} logged in as {}", id, username);
    }

    pub fn join_world(&mut self, id: ClientId, world_index: usize) {
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        let Some(username) = session.username.clone() else {
            self.send(id, error("log in before joining a world"));
            return;
        };
        if session.world.is_some() {
            self.send(id, connection_status(false));
            return;
        }
        let Some(world) = self.worlds.get_mut(world_index) else {
            tracing::debug!("Client {} asked for unknown world {}", id, world_index);
            self.send(id, connection_status(false));
            return;
        };

        match world.request_player_join(id, &username) {
            Ok(()) => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.world = Some(world_index);
                }
                self.send(id, connection_status(true));
                self.send(
                    id,
                    ServerMsg::Assets(AssetsMsg {
                        tile_sheet_url: self.tile_sheet_url.clone(),
                    }),
                );
                self.flush();
            }
            Err(JoinError::WorldFull) => {
                tracing::info!("Client {} rejected: world {} is full", id, world_index);
                self.send(id, connection_status(false));
            }
            Err(e) => {
                tracing::warn!("Client {} failed to join world {}: {}", id, world_index, e);
                self.send(id, connection_status(false));
            }
        }
    }

    /// Tear down a connection. Unknown ids are ignored.
    pub fn disconnect(&mut self, id: ClientId) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        if let Some(world) = session.world.and_then(|i| self.worlds.get_mut(i)) {
            world.player_disconnect(id);
        }
        self.flush();
        tracing::info!("Client {} disconnected", id);
    }

    /// Advance every world by `dt` seconds and deliver what they produced.
    pub fn tick(&mut self, dt: f64) {
        for (index, world) in self.worlds.iter_mut().enumerate() {
            for id in world.update(dt) {
                let Some(session) = self.sessions.get_mut(&id) else {
                    continue;
                };
                if session.world == Some(index) {
                    session.world = None;
                    tracing::warn!("Client {} was evicted from world {}", id, index);
                    deliver(
                        &self.sessions,
                        Envelope {
                            to: id,
                            msg: error("removed from world"),
                        },
                    );
                }
            }
        }
        self.flush();
    }

    /// Deliver every queued message without waiting on any connection.
    pub fn flush(&mut self) {
        for world in &mut self.worlds {
            for envelope in world.drain_outbox() {
                deliver(&self.sessions, envelope);
            }
        }
    }

    fn send(&self, to: ClientId, msg: ServerMsg) {
        deliver(&self.sessions, Envelope { to, msg });
    }

    /// Run `f` against the world the client joined. Errors go back to the
    /// client only.
    fn with_world(
        &mut self,
        id: ClientId,
        f: impl FnOnce(&mut World) -> Result<(), WorldError>,
    ) {
        let Some(index) = self.sessions.get(&id).and_then(|s| s.world) else {
            self.send(id, error("not in a world"));
            return;
        };
        let Some(world) = self.worlds.get_mut(index) else {
            return;
        };
        let result = f(world);
        if let Err(e) = result {
            tracing::debug!("Rejected command from client {}: {}", id, e);
            self.send(
                id,
                ServerMsg::Error {
                    reason: e.to_string(),
                },
            );
        }
        self.flush();
    }
}

fn deliver(sessions: &HashMap<ClientId, Session>, envelope: Envelope) {
    let Some(session) = sessions.get(&envelope.to) else {
        return;
    };
    match session.tx.try_send(envelope.msg) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Outbound queue of client {} is full, dropping message", envelope.to);
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("Client {} queue closed", envelope.to);
        }
    }
}

fn error(reason: &str) -> ServerMsg {
    ServerMsg::Error {
        reason: reason.to_string(),
    }
}

fn connection_status(successful: bool) -> ServerMsg {
    ServerMsg::ConnectionStatus(ConnectionStatusMsg { successful })
}

/// Run the engine. Owns all game state until the command channel closes.
pub async fn run_engine(
    mut cmd_rx: mpsc::Receiver<EngineCommand>,
    mut engine: Engine,
    tick_rate_hz: u32,
) {
    let tick_duration = Duration::from_secs_f64(1.0 / tick_rate_hz as f64);
    let mut tick_interval = tokio::time::interval(tick_duration);
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            now = tick_interval.tick() => {
                let dt = now
                    .duration_since(last_tick)
                    .as_secs_f64()
                    .min(MAX_FRAME_SECS);
                last_tick = now;
                engine.tick(dt);
            }

            Some(cmd) = cmd_rx.recv() => engine.handle(cmd),

            else => break,
        }
    }

    tracing::info!("Engine stopped");
}
