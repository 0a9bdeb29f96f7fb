use roomworld_shared::config::WorldsFile;

/// Worlds served when `WORLDS_FILE` is not set.
const BUILTIN_WORLDS: &str = include_str!("../data/worlds.json");

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub tick_rate_hz: u32,
    /// Seconds a battle request stays pending before it expires
    pub battle_request_timeout_secs: f64,
    pub max_chat_len: usize,
    /// Movement speed of player characters (tiles per second)
    pub player_speed: f64,
    /// Length of one drawing minigame round (seconds)
    pub drawing_round_secs: f64,
    /// Outbound messages buffered per connection before new ones are dropped
    pub client_queue_capacity: usize,
    pub rng_seed: u64,
    pub tile_sheet_url: String,
    pub worlds_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            tick_rate_hz: 60,
            battle_request_timeout_secs: 30.0,
            max_chat_len: 200,
            player_speed: 4.0,
            drawing_round_secs: 60.0,
            client_queue_capacity: 256,
            rng_seed: 42,
            tile_sheet_url: "res/mario_tileset0.png".to_string(),
            worlds_file: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => {
                    let host = config
                        .listen_addr
                        .rsplit_once(':')
                        .map(|(host, _)| host.to_string())
                        .unwrap_or_else(|| "0.0.0.0".to_string());
                    config.listen_addr = format!("{}:{}", host, parsed);
                }
                _ => tracing::warn!("Invalid PORT '{}', using default", port),
            }
        }

        if let Ok(rate) = std::env::var("TICK_RATE_HZ") {
            match rate.parse::<u32>() {
                Ok(parsed) => config.tick_rate_hz = parsed,
                Err(_) => tracing::warn!("Invalid TICK_RATE_HZ '{}', using default", rate),
            }
        }

        if let Ok(timeout) = std::env::var("BATTLE_REQUEST_TIMEOUT_SECS") {
            match timeout.parse::<f64>() {
                Ok(parsed) => config.battle_request_timeout_secs = parsed,
                Err(_) => tracing::warn!(
                    "Invalid BATTLE_REQUEST_TIMEOUT_SECS '{}', using default",
                    timeout
                ),
            }
        }

        if let Ok(seed) = std::env::var("RNG_SEED") {
            match seed.parse::<u64>() {
                Ok(parsed) => config.rng_seed = parsed,
                Err(_) => tracing::warn!("Invalid RNG_SEED '{}', using default", seed),
            }
        }

        if let Ok(url) = std::env::var("TILE_SHEET_URL") {
            config.tile_sheet_url = url;
        }

        if let Ok(path) = std::env::var("WORLDS_FILE") {
            config.worlds_file = Some(path);
        }

        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 1000 {
            return Err("tick_rate_hz must be in 1..=1000".to_string());
        }
        if !self.battle_request_timeout_secs.is_finite() || self.battle_request_timeout_secs <= 0.0
        {
            return Err("battle_request_timeout_secs must be finite and > 0".to_string());
        }
        if self.max_chat_len == 0 {
            return Err("max_chat_len must be > 0".to_string());
        }
        if !self.player_speed.is_finite() || self.player_speed < 0.0 {
            return Err("player_speed must be finite and >= 0".to_string());
        }
        if !self.drawing_round_secs.is_finite() || self.drawing_round_secs <= 0.0 {
            return Err("drawing_round_secs must be finite and > 0".to_string());
        }
        if self.client_queue_capacity == 0 {
            return Err("client_queue_capacity must be > 0".to_string());
        }
        Ok(())
    }

    /// Read world definitions from `worlds_file`, or the built-in sample worlds.
    pub fn load_worlds(&self) -> Result<WorldsFile, String> {
        match &self.worlds_file {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| format!("cannot read {}: {}", path, e))?;
                WorldsFile::from_json(&json)
            }
            None => WorldsFile::from_json(BUILTIN_WORLDS),
        }
    }

    /// The subset of settings each world needs.
    pub fn world_settings(&self) -> WorldSettings {
        WorldSettings {
            tick_rate_hz: self.tick_rate_hz,
            battle_request_timeout_secs: self.battle_request_timeout_secs,
            max_chat_len: self.max_chat_len,
            player_speed: self.player_speed,
            drawing_round_secs: self.drawing_round_secs,
            rng_seed: self.rng_seed,
        }
    }
}

/// Per-world tuning derived from `ServerConfig`.
#[derive(Debug, Clone)]
pub struct WorldSettings {
    pub tick_rate_hz: u32,
    pub battle_request_timeout_secs: f64,
    pub max_chat_len: usize,
    pub player_speed: f64,
    pub drawing_round_secs: f64,
    pub rng_seed: u64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        ServerConfig::default().world_settings()
    }
}
