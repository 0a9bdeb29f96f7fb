//! Types shared between the room world server and its clients.
//!
//! Everything that crosses the wire lives here so the TypeScript bindings
//! exported by `ts-rs` stay in one place.

pub mod config;
pub mod protocol;
pub mod vec2;
