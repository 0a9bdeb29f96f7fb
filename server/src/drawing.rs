//! The drawing minigame: one participant draws a secret word, the others guess.

use crate::client::ClientId;
use crate::minigame::{GameStatus, Gamemode};
use rand::Rng;
use serde_json::{json, Value};

const PROMPTS: &[&str] = &[
    "cat", "house", "tree", "boat", "guitar", "rocket", "castle", "umbrella", "penguin",
    "bicycle", "volcano", "lighthouse",
];

#[derive(Debug)]
pub struct DrawingGame {
    drawer: ClientId,
    participants: Vec<ClientId>,
    prompt: String,
    elapsed: f64,
    round_secs: f64,
    solved_by: Option<ClientId>,
}

impl DrawingGame {
    /// The first participant draws.
    pub fn new(participants: &[ClientId], round_secs: f64, rng: &mut impl Rng) -> Self {
        let prompt = PROMPTS[rng.gen_range(0..PROMPTS.len())].to_string();
        Self {
            drawer: participants.first().copied().unwrap_or_default(),
            participants: participants.to_vec(),
            prompt,
            elapsed: 0.0,
            round_secs,
            solved_by: None,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn drawer(&self) -> ClientId {
        self.drawer
    }

    fn everyone(&self, payload: Value) -> Vec<(ClientId, Value)> {
        self.participants
            .iter()
            .map(|id| (*id, payload.clone()))
            .collect()
    }

    fn everyone_but(&self, from: ClientId, payload: Value) -> Vec<(ClientId, Value)> {
        self.participants
            .iter()
            .filter(|id| **id != from)
            .map(|id| (*id, payload.clone()))
            .collect()
    }
}

impl Gamemode for DrawingGame {
    fn tag(&self) -> &'static str {
        "drawing"
    }

    fn assets(&self) -> Vec<String> {
        vec!["res/minigames/drawing/palette.png".to_string()]
    }

    fn start(&mut self) -> Vec<(ClientId, Value)> {
        self.participants
            .iter()
            .map(|id| {
                let payload = if *id == self.drawer {
                    json!({ "role": "drawer", "prompt": self.prompt, "roundSecs": self.round_secs })
                } else {
                    json!({
                        "role": "guesser",
                        "promptLength": self.prompt.chars().count(),
                        "roundSecs": self.round_secs,
                    })
                };
                (*id, payload)
            })
            .collect()
    }

    fn tick(&mut self, dt: f64) -> GameStatus {
        self.elapsed += dt;
        if self.solved_by.is_some() || self.elapsed >= self.round_secs {
            GameStatus::Completed
        } else {
            GameStatus::Running
        }
    }

    fn handle_client_data(
        &mut self,
        from: ClientId,
        background_data: &Value,
        game_data: &Value,
    ) -> Vec<(ClientId, Value)> {
        if self.solved_by.is_some() {
            return Vec::new();
        }

        if from == self.drawer {
            return self.everyone_but(
                from,
                json!({ "from": from, "backgroundData": background_data, "gameData": game_data }),
            );
        }

        let Some(guess) = game_data.get("guess").and_then(Value::as_str) else {
            return Vec::new();
        };
        if guess.trim().eq_ignore_ascii_case(&self.prompt) {
            self.solved_by = Some(from);
            self.everyone(json!({ "solvedBy": from, "prompt": self.prompt }))
        } else {
            self.everyone(json!({ "from": from, "guess": guess.trim() }))
        }
    }
}
