//! Client implementation.
//!
//! The client maintains:
//! - One UDP transport to the server
//! - A `join` claim, resent until a snapshot names our person
//! - The replica world, fed by snapshots and ticked locally in between
//! - Per-net-tick intent messages and ping probes

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Instant,
};

use anyhow::Context;
use arena_shared::{
    config::ArenaConfig,
    intent::Intent,
    net::{NetMsg, Transport, PROTOCOL_VERSION},
    physics::PhysicsConfig,
    ping::{pong_for, PingTracker},
    render::{EntityView, RenderBackend},
};
use tracing::{debug, info, warn};

use crate::{
    input::{build_intent, InputState},
    registry::EntityRegistry,
    replica::{ApplyOutcome, Replica},
};

/// Seconds between `join` resends while unanswered.
pub const JOIN_RETRY: f64 = 1.0;
/// Datagrams handled per poll.
pub const MAX_DRAIN: usize = 256;

/// High-level game client.
pub struct GameClient {
    pub cfg: ArenaConfig,
    server: SocketAddr,
    transport: Transport,
    pub replica: Replica,
    ping: PingTracker,
    started: Instant,
    since_intent: f64,
    since_join: f64,
    last_intent: Intent,
    tick: u64,
}

impl GameClient {
    /// Binds a local socket and sends the first `join`.
    pub async fn connect(cfg: &ArenaConfig) -> anyhow::Result<Self> {
        let server: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let bind_ip = match server.ip() {
            IpAddr::V4(ip) if ip.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(ip) if ip.is_loopback() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let transport = Transport::bind(SocketAddr::new(bind_ip, 0)).await?;

        info!(server = %server, name = %cfg.player_name, "Connecting to server");

        let physics = PhysicsConfig {
            step: cfg.physics_step() as f32,
            ..PhysicsConfig::default()
        };
        let client = Self {
            cfg: cfg.clone(),
            server,
            transport,
            replica: Replica::new(physics, EntityRegistry::default(), cfg.sweep.clone()),
            ping: PingTracker::new(f64::from(cfg.ping_interval_secs)),
            started: Instant::now(),
            since_intent: 0.0,
            since_join: 0.0,
            last_intent: Intent::default(),
            tick: 0,
        };
        client.send_join().await;
        Ok(client)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// True once a snapshot has flagged our person.
    pub fn is_joined(&self) -> bool {
        self.replica.local_player().is_some()
    }

    /// Smoothed round trip to the server, seconds.
    pub fn rtt(&self) -> Option<f64> {
        self.ping.rtt()
    }

    /// Local clock minus the server's, seconds.
    pub fn clock_offset(&self) -> Option<f64> {
        self.ping.offset()
    }

    pub fn last_intent(&self) -> &Intent {
        &self.last_intent
    }

    fn clock(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Fire-and-forget: a failed send is logged and the next tick retries.
    async fn send(&self, msg: &NetMsg) {
        if let Err(e) = self.transport.send_to(msg, self.server).await {
            warn!(server = %self.server, error = %e, "send failed");
        }
    }

    async fn send_join(&self) {
        self.send(&NetMsg::Join {
            nickname: self.cfg.player_name.clone(),
            protocol: PROTOCOL_VERSION,
        })
        .await;
    }

    /// Handles every pending datagram; returns how many snapshots applied.
    pub async fn poll(&mut self) -> anyhow::Result<usize> {
        let mut applied = 0;
        for (msg, from) in self.transport.drain(MAX_DRAIN)? {
            if from != self.server {
                debug!(peer = %from, "datagram from a stranger");
                continue;
            }
            match msg {
                NetMsg::Snapshot(snap) => match self.replica.apply(&snap) {
                    ApplyOutcome::Applied(report) => {
                        applied += 1;
                        if !report.created.is_empty() || !report.removed.is_empty() {
                            debug!(
                                created = report.created.len(),
                                removed = report.removed.len(),
                                "snapshot applied"
                            );
                        }
                    }
                    ApplyOutcome::Stale => {}
                    ApplyOutcome::Unsupported { version } => {
                        warn!(version, "cannot read snapshot")
                    }
                },
                NetMsg::Ping { seq } => {
                    let pong = pong_for(seq, self.clock());
                    self.send(&pong).await;
                }
                NetMsg::Pong { seq, clock } => {
                    let now = self.clock();
                    if let Some(sample) = self.ping.on_pong(seq, clock, now) {
                        debug!(rtt_ms = sample.rtt * 1000.0, offset = sample.offset, "pong");
                    }
                }
                other => debug!(?other, "unexpected message from server"),
            }
        }
        Ok(applied)
    }

    /// Advances one client tick of `dt` seconds with the sampled input.
    pub async fn tick(&mut self, dt: f64, input: &InputState) -> anyhow::Result<()> {
        self.poll().await?;
        self.replica.tick(dt);
        self.last_intent = build_intent(input);

        if !self.is_joined() {
            self.since_join += dt;
            if self.since_join >= JOIN_RETRY {
                self.since_join = 0.0;
                self.send_join().await;
            }
        }

        self.since_intent += dt;
        let period = self.cfg.net_period();
        if self.since_intent >= period {
            self.since_intent = (self.since_intent - period).min(period);
            let msg = NetMsg::Intent {
                intent: self.last_intent,
                ack: self.replica.last_timestamp().unwrap_or(0.0),
            };
            self.send(&msg).await;
        }

        if let Some(probe) = self.ping.poll(self.clock()) {
            self.send(&probe).await;
        }
        self.tick += 1;
        Ok(())
    }

    /// Presents the replica world and pending events.
    pub fn render(&mut self, backend: &mut dyn RenderBackend) {
        backend.begin_frame();
        for (name, event) in self.replica.take_events() {
            backend.play_event(&name, &event);
        }
        let local = self.replica.local_player();
        for entity in self.replica.world().entities() {
            let view = EntityView::of(entity, local == Some(entity.name.as_str()));
            backend.draw_entity(&view);
        }
        backend.end_frame();
    }
}
