use roomworld_server::build_worlds;
use roomworld_server::config::ServerConfig;
use roomworld_server::engine::{run_engine, Engine, EngineCommand};
use roomworld_server::ws::{router, AppState};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::load_or_default();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let worlds = match build_worlds(&config) {
        Ok(worlds) => worlds,
        Err(e) => {
            eprintln!("Invalid world definitions: {}", e);
            std::process::exit(1);
        }
    };
    for world in &worlds {
        tracing::info!(
            "Loaded world '{}' ({} rooms, max {} players)",
            world.name,
            world.rooms().len(),
            world.max_players
        );
    }

    let listen_addr = config.listen_addr.clone();
    let tick_rate_hz = config.tick_rate_hz;
    let engine = Engine::new(worlds, &config);
    let (engine_tx, engine_rx) = mpsc::channel::<EngineCommand>(1024);

    tokio::spawn(run_engine(engine_rx, engine, tick_rate_hz));

    let app = router(AppState { engine_tx });

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("World server listening on {}", listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
