//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--addr 127.0.0.1:40000] [--tick-hz 60] [--net-hz 20] [--config arena.json]
//!
//! The server binds a UDP socket, runs the authoritative simulation and
//! broadcasts snapshots to every peer that has sent it a datagram.

use std::{env, path::PathBuf, time::Duration};

use anyhow::Context;
use arena_server::server::GameServer;
use arena_shared::config::ArenaConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<ArenaConfig> {
    let args: Vec<String> = env::args().collect();
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| PathBuf::from(&w[1]));
    let mut cfg = match config_path {
        Some(path) => ArenaConfig::load(&path)?,
        None => ArenaConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
                i += 2;
            }
            "--net-hz" if i + 1 < args.len() => {
                cfg.net_hz = args[i + 1].parse().unwrap_or(cfg.net_hz);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, net_hz = cfg.net_hz, "Starting server");

    let mut server = GameServer::bind(cfg.clone()).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    let tick_interval = Duration::from_secs_f64(cfg.tick_period());
    let mut next_tick = tokio::time::Instant::now();
    let mut last = next_tick;

    loop {
        let now = tokio::time::Instant::now();
        let elapsed = now - last;
        last = now;
        server.step(elapsed.as_secs_f64()).await?;

        next_tick += tick_interval;
        if next_tick < now {
            next_tick = now;
        }
        tokio::time::sleep_until(next_tick).await;
    }
}
