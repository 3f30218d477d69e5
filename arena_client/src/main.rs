//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--addr 127.0.0.1:40000] [--name Player] [--tick-hz 60] [--config arena.json]
//!
//! The client joins the server, sends idle intents and keeps a replica of
//! the arena up to date. Rendering goes to a `NullRenderer`; a real frontend
//! supplies its own `RenderBackend` and input sampling.

use std::{env, path::PathBuf, time::Duration};

use anyhow::Context;
use arena_client::{client::GameClient, input::InputState};
use arena_shared::{config::ArenaConfig, render::NullRenderer};
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
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
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
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, name = %cfg.player_name, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    let mut renderer = NullRenderer::default();
    let input = InputState::default();

    let tick_interval = Duration::from_secs_f64(cfg.tick_period());
    let mut joined = false;

    loop {
        client.tick(tick_interval.as_secs_f64(), &input).await?;
        client.render(&mut renderer);

        if client.is_joined() && !joined {
            joined = true;
            info!(
                entities = client.replica.world().len(),
                "Joined; replica is live"
            );
        }
        if renderer.frames % 600 == 0 {
            info!(
                frames = renderer.frames,
                entities = client.replica.world().len(),
                rtt_ms = client.rtt().map(|r| r * 1000.0),
                clock_offset = client.clock_offset(),
                "Client status"
            );
        }

        tokio::time::sleep(tick_interval).await;
    }
}
