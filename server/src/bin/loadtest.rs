//! Load test for the world server.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect, log in and join a world
//! - Periodically send random movement input
//! - Receive and count worldData snapshots
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 100)
//!   --duration S     Test duration in seconds (default: 30)
//!   --input-rate R   Input changes per second per client (default: 2)
//!   --world I        Index of the world to join (default: 0)
//!   --url URL        Server URL (default: ws://127.0.0.1:3000/ws)

use futures_util::{SinkExt, StreamExt};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use roomworld_shared::protocol::{ClientMsg, InputState, ServerMsg};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    joined: AtomicU64,
    rejected: AtomicU64,
    messages_received: AtomicU64,
    snapshots_received: AtomicU64,
    inputs_sent: AtomicU64,
    errors: AtomicU64,
    total_entities_seen: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

struct ClientOptions {
    url: String,
    world: usize,
    input_rate: f64,
    duration: Duration,
}

// === Client task ===

async fn send(ws: &mut Socket, msg: &ClientMsg) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => ws.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

/// Read frames until `pred` matches one, the socket fails or 5s pass.
async fn wait_for(
    ws: &mut Socket,
    metrics: &Metrics,
    mut pred: impl FnMut(&ServerMsg) -> Option<bool>,
) -> Option<bool> {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                    if let Ok(server_msg) = serde_json::from_str::<ServerMsg>(&text) {
                        if let Some(result) = pred(&server_msg) {
                            return Some(result);
                        }
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                _ => {}
            }
        }
        None
    })
    .await;
    waited.ok().flatten()
}

async fn run_client(client_id: u32, options: Arc<ClientOptions>, metrics: Arc<Metrics>) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(&options.url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let connect_latency = connect_start.elapsed();
    metrics
        .latency_sum_ms
        .fetch_add(connect_latency.as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let login = ClientMsg::LoginData {
        username: format!("bot{}", client_id),
    };
    if !send(&mut ws, &login).await {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }
    let logged_in = wait_for(&mut ws, &metrics, |msg| match msg {
        ServerMsg::ClientData(_) => Some(true),
        ServerMsg::Error { .. } => Some(false),
        _ => None,
    })
    .await;
    if logged_in != Some(true) {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let join = ClientMsg::JoinWorldRequest {
        world_index: options.world,
    };
    if !send(&mut ws, &join).await {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }
    let joined = wait_for(&mut ws, &metrics, |msg| match msg {
        ServerMsg::ConnectionStatus(status) => Some(status.successful),
        _ => None,
    })
    .await;
    match joined {
        Some(true) => {
            metrics.joined.fetch_add(1, Ordering::Relaxed);
        }
        Some(false) => {
            if client_id < 3 {
                eprintln!("Client {} was rejected (world full?)", client_id);
            }
            metrics.rejected.fetch_add(1, Ordering::Relaxed);
            metrics.connected.fetch_sub(1, Ordering::Relaxed);
            return;
        }
        None => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            metrics.connected.fetch_sub(1, Ordering::Relaxed);
            return;
        }
    }

    let input_interval = if options.input_rate > 0.0 {
        Duration::from_secs_f64(1.0 / options.input_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut input_timer = tokio::time::interval(input_interval);
    input_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = Instant::now() + options.duration;
    let mut rng = ChaCha8Rng::seed_from_u64(client_id as u64);

    loop {
        if Instant::now() >= test_end {
            break;
        }

        tokio::select! {
            _ = input_timer.tick() => {
                let input = ClientMsg::InputData(InputState {
                    up: rng.gen_bool(0.25),
                    down: rng.gen_bool(0.25),
                    left: rng.gen_bool(0.25),
                    right: rng.gen_bool(0.25),
                });
                if send(&mut ws, &input).await {
                    metrics.inputs_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        if let Ok(ServerMsg::WorldData(data)) = serde_json::from_str::<ServerMsg>(&text) {
                            metrics.snapshots_received.fetch_add(1, Ordering::Relaxed);
                            metrics.total_entities_seen.fetch_add(data.entities.len() as u64, Ordering::Relaxed);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if client_id < 3 {
                            eprintln!("Client {} got Close: {:?}", client_id, frame);
                        }
                        break;
                    }
                    None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut duration_secs: u64 = 30;
    let mut input_rate: f64 = 2.0;
    let mut world: usize = 0;
    let mut url = "ws://127.0.0.1:3000/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--input-rate" => {
                i += 1;
                input_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(2.0);
            }
            "--world" => {
                i += 1;
                world = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== World Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Input rate: {}/s per client", input_rate);
    println!("World: {}", world);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let options = Arc::new(ClientOptions {
        url,
        world,
        input_rate,
        duration: Duration::from_secs(duration_secs),
    });

    let mut handles = Vec::with_capacity(num_clients as usize);

    println!("Spawning {} clients...", num_clients);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let options = Arc::clone(&options);
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(run_client(client_id, options, metrics)));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }

            println!(
                "[{:3}s] connected={}, joined={}, msgs={}, snapshots={}, inputs={}, errors={}",
                elapsed,
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.joined.load(Ordering::Relaxed),
                metrics_clone.messages_received.load(Ordering::Relaxed),
                metrics_clone.snapshots_received.load(Ordering::Relaxed),
                metrics_clone.inputs_sent.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let joined = metrics.joined.load(Ordering::Relaxed);
    let msgs = metrics.messages_received.load(Ordering::Relaxed);
    let snapshots = metrics.snapshots_received.load(Ordering::Relaxed);
    let entities = metrics.total_entities_seen.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Clients joined: {}", joined);
    println!("Clients rejected: {}", metrics.rejected.load(Ordering::Relaxed));
    println!("Total messages received: {}", msgs);
    println!("Total worldData messages: {}", snapshots);
    println!("Total inputs sent: {}", metrics.inputs_sent.load(Ordering::Relaxed));
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));
    println!(
        "Average entities per snapshot: {}",
        if snapshots > 0 { entities / snapshots } else { 0 }
    );

    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    if joined > 0 && duration_secs > 0 {
        println!();
        println!("Messages/sec (total): {:.0}", msgs as f64 / duration_secs as f64);
        println!(
            "Snapshots per second per client: {:.1}",
            snapshots as f64 / joined as f64 / duration_secs as f64
        );
    }
}
