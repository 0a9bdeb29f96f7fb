use crate::client::ClientId;
use crate::physics::EntityId;
use roomworld_shared::protocol::InputState;
use roomworld_shared::vec2::{normalize, scale, vec2, Vec2};

/// Turns held directions into a velocity.
#[derive(Debug, Clone, PartialEq)]
pub struct CharController {
    input: InputState,
    /// Tiles per second
    speed: f64,
}

impl CharController {
    pub fn new(speed: f64) -> Self {
        Self {
            input: InputState::default(),
            speed,
        }
    }

    pub fn set_input(&mut self, input: InputState) {
        self.input = input;
    }

    /// Velocity for the current input. Diagonals are normalized so they are
    /// not faster than straight movement; opposite keys cancel out.
    pub fn velocity(&self) -> Vec2 {
        let axis = |neg: bool, pos: bool| match (neg, pos) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        };
        let dir = vec2(
            axis(self.input.left, self.input.right),
            axis(self.input.up, self.input.down),
        );
        scale(normalize(dir), self.speed)
    }
}

/// A client's controllable character. Its entity lives in the physics engine
/// under `entity_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub client_id: ClientId,
    pub entity_id: EntityId,
    pub controller: CharController,
}

impl Player {
    /// Players share their id with the client and the entity they drive.
    pub fn new(client_id: ClientId, speed: f64) -> Self {
        Self {
            client_id,
            entity_id: client_id,
            controller: CharController::new(speed),
        }
    }
}
