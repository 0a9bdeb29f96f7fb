//! Room-partitioned multiplayer world server.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod actions;
pub mod battle;
pub mod chat;
pub mod client;
pub mod config;
pub mod drawing;
pub mod engine;
pub mod minigame;
pub mod outbox;
pub mod physics;
pub mod player;
pub mod room;
pub mod world;
pub mod ws;

use config::ServerConfig;
use world::World;

/// Build every world the config describes.
pub fn build_worlds(config: &ServerConfig) -> Result<Vec<World>, String> {
    let file = config.load_worlds()?;
    let settings = config.world_settings();
    file.worlds
        .iter()
        .map(|def| World::new(def, &settings).map_err(|e| format!("world '{}': {}", def.name, e)))
        .collect()
}
