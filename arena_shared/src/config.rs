//! Configuration system.
//!
//! Loads arena configuration from JSON strings or files. Every field has a
//! default so partial files are accepted.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Server UDP address, e.g. `127.0.0.1:40000`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Outer loop rate (network drain + stepper call).
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Fixed physics sub-step rate.
    #[serde(default = "default_physics_hz")]
    pub physics_hz: u32,
    /// Snapshot broadcast rate (server) and intent send rate (client).
    #[serde(default = "default_net_hz")]
    pub net_hz: u32,
    /// Nickname claimed by the client.
    #[serde(default = "default_player_name")]
    pub player_name: String,
    /// Peers silent for longer than this are evicted.
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout_secs: f32,
    /// Cadence of ping probes.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: f32,
    /// Client-side removal rule for entities missing from a snapshot.
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Which locally known entities survive being absent from a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Kinds never removed by the sweep.
    #[serde(default)]
    pub exempt_kinds: Vec<EntityKind>,
    /// Consecutive missed snapshots tolerated before removal.
    #[serde(default)]
    pub grace_snapshots: u32,
}

fn default_server_addr() -> String {
    "127.0.0.1:40000".to_string()
}

fn default_tick_hz() -> u32 {
    60
}

fn default_physics_hz() -> u32 {
    100
}

fn default_net_hz() -> u32 {
    20
}

fn default_player_name() -> String {
    "Player".to_string()
}

fn default_peer_timeout() -> f32 {
    10.0
}

fn default_ping_interval() -> f32 {
    1.0
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            tick_hz: default_tick_hz(),
            physics_hz: default_physics_hz(),
            net_hz: default_net_hz(),
            player_name: default_player_name(),
            peer_timeout_secs: default_peer_timeout(),
            ping_interval_secs: default_ping_interval(),
            sweep: SweepConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn physics_step(&self) -> f64 {
        1.0 / f64::from(self.physics_hz.max(1))
    }

    pub fn net_period(&self) -> f64 {
        1.0 / f64::from(self.net_hz.max(1))
    }

    pub fn tick_period(&self) -> f64 {
        1.0 / f64::from(self.tick_hz.max(1))
    }
}
