//! Server implementation.
//!
//! An authoritative server loop. Each call to [`GameServer::step`]:
//! - drains pending datagrams into per-peer inboxes (bounded, non-blocking)
//! - handles joins, pings and the newest intent of every peer
//! - evicts silent peers together with their person
//! - advances the world in fixed sub-steps
//! - on network ticks, broadcasts a snapshot and ping probes
//!
//! Determinism notes:
//! - The world runs a fixed timestep; wall-clock time only feeds the
//!   accumulator.
//! - Peers are visited in address order.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::{Duration, Instant},
};

use anyhow::Context;
use arena_shared::{
    arena::ArenaLayout,
    config::ArenaConfig,
    intent::Intent,
    net::{NetMsg, Transport, PROTOCOL_VERSION},
    physics::PhysicsConfig,
    ping::pong_for,
    snapshot::{collect_records, Snapshot, SnapshotClock},
    world::{Authority, World},
};
use tracing::{debug, info, warn};

use crate::peers::{is_valid_nickname, ClientSession, PeerTable};

/// Datagrams accepted per step; the rest wait for the next one.
pub const MAX_DRAIN: usize = 256;

/// Game server.
pub struct GameServer {
    pub cfg: ArenaConfig,
    world: World,
    layout: ArenaLayout,
    transport: Transport,
    peers: PeerTable,
    started: Instant,
    /// Seconds since the last snapshot broadcast.
    since_snapshot: f64,
    stamps: SnapshotClock,
    joined: usize,
    tick: u64,
}

impl GameServer {
    /// Binds the UDP socket and builds the default arena.
    pub async fn bind(cfg: ArenaConfig) -> anyhow::Result<Self> {
        Self::with_layout(cfg, ArenaLayout::default()).await
    }

    pub async fn with_layout(cfg: ArenaConfig, layout: ArenaLayout) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let transport = Transport::bind(addr).await?;

        let physics = PhysicsConfig {
            step: cfg.physics_step() as f32,
            ..PhysicsConfig::default()
        };
        let mut world = World::new(physics, Authority::Authoritative, rand::random());
        layout.build(&mut world).context("build arena")?;

        let peers = PeerTable::new(
            Duration::from_secs_f32(cfg.peer_timeout_secs.max(0.0)),
            f64::from(cfg.ping_interval_secs),
        );

        info!(addr = %transport.local_addr()?, entities = world.len(), "server bound");
        Ok(Self {
            cfg,
            world,
            layout,
            transport,
            peers,
            started: Instant::now(),
            since_snapshot: 0.0,
            stamps: SnapshotClock::default(),
            joined: 0,
            tick: 0,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Seconds since the server started; the clock reported in pongs.
    fn clock(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Runs the server for a number of ticks at the configured rate.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f64(self.cfg.tick_period());
        let mut next = tokio::time::Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f64()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one server tick covering `dt` seconds of wall time.
    pub async fn step(&mut self, dt: f64) -> anyhow::Result<()> {
        self.recv_messages()?;
        let outgoing = self.process_inboxes();
        self.send_all(outgoing).await;
        self.evict_stale();

        self.world.advance(dt);
        self.sync_pings();

        self.since_snapshot += dt;
        let period = self.cfg.net_period();
        if self.since_snapshot >= period {
            // Never queue up more than one snapshot behind.
            self.since_snapshot = (self.since_snapshot - period).min(period);
            self.send_snapshots().await?;
            self.send_probes().await;
        }
        self.tick += 1;
        Ok(())
    }

    fn recv_messages(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        for (msg, from) in self.transport.drain(MAX_DRAIN)? {
            self.peers.deliver(from, msg, now);
        }
        Ok(())
    }

    fn process_inboxes(&mut self) -> Vec<(NetMsg, SocketAddr)> {
        let mut outgoing = Vec::new();
        let clock = self.clock();
        for addr in self.peers.addrs() {
            let inbox = match self.peers.get_mut(&addr) {
                Some(session) => session.take_inbox(),
                None => continue,
            };
            let mut newest_intent = None;
            for msg in inbox {
                match msg {
                    NetMsg::Join { nickname, protocol } => self.on_join(addr, nickname, protocol),
                    NetMsg::Ping { seq } => outgoing.push((pong_for(seq, clock), addr)),
                    NetMsg::Pong { seq, clock: remote } => {
                        if let Some(session) = self.peers.get_mut(&addr) {
                            session.ping.on_pong(seq, remote, clock);
                        }
                    }
                    NetMsg::Intent { intent, ack } => {
                        // Most recent first: keep the first intent seen.
                        if newest_intent.is_none() {
                            newest_intent = Some((intent, ack));
                        }
                    }
                    NetMsg::Snapshot(_) => debug!(peer = %addr, "ignoring snapshot from client"),
                }
            }
            if let Some((intent, ack)) = newest_intent {
                self.on_intent(addr, intent, ack);
            }
        }
        outgoing
    }

    fn on_join(&mut self, addr: SocketAddr, nickname: String, protocol: u32) {
        if protocol != PROTOCOL_VERSION {
            warn!(peer = %addr, protocol, "join with unsupported protocol");
            return;
        }
        if !is_valid_nickname(&nickname) {
            warn!(peer = %addr, %nickname, "nickname refused");
            return;
        }
        let Some(session) = self.peers.get(&addr) else {
            return;
        };
        if session.nickname.as_deref() == Some(nickname.as_str()) {
            // Repeated join while the first reply was in flight.
            return;
        }
        if session.nickname.is_some() {
            warn!(peer = %addr, %nickname, "peer already joined under another name");
            return;
        }
        if self.peers.claimant(&nickname).is_some() {
            warn!(peer = %addr, %nickname, "nickname already claimed");
            return;
        }

        if !self.world.contains(&nickname) {
            let spawn = self.layout.spawn_point(self.joined);
            if let Err(e) = self.world.spawn_person(&nickname, spawn) {
                warn!(peer = %addr, %nickname, error = %e, "cannot spawn person");
                return;
            }
            self.joined += 1;
        } else if !self.world.get(&nickname).is_some_and(|e| e.is_person()) {
            warn!(peer = %addr, %nickname, "nickname names a non-person entity");
            return;
        }

        if let Some(session) = self.peers.get_mut(&addr) {
            session.nickname = Some(nickname.clone());
        }
        info!(peer = %addr, %nickname, "player joined");
    }

    fn on_intent(&mut self, addr: SocketAddr, intent: Intent, ack: f64) {
        let Some(session) = self.peers.get_mut(&addr) else {
            return;
        };
        session.last_ack = session.last_ack.max(ack);
        let Some(name) = session.nickname.clone() else {
            debug!(peer = %addr, "intent before join");
            return;
        };
        if let Some(person) = self.world.get_mut(&name) {
            person.intent = intent;
        }
    }

    fn evict_stale(&mut self) {
        for session in self.peers.evict_stale(Instant::now()) {
            let ClientSession {
                addr,
                nickname,
                last_ack,
                ..
            } = session;
            if let Some(name) = nickname {
                self.world.remove(&name);
                info!(peer = %addr, nickname = %name, last_ack, "peer timed out, person removed");
            } else {
                info!(peer = %addr, "peer timed out");
            }
        }
    }

    /// Copies each peer's smoothed round trip onto its person.
    fn sync_pings(&mut self) {
        for session in self.peers.iter() {
            let Some(name) = session.nickname.as_deref() else {
                continue;
            };
            if let Some(person) = self.world.get_mut(name).and_then(|e| e.person.as_mut()) {
                person.ping = session.ping_ms();
            }
        }
    }

    async fn send_snapshots(&mut self) -> anyhow::Result<()> {
        let records = collect_records(&mut self.world);
        let timestamp = self.stamps.stamp(self.world.time());
        let snap = Snapshot::new(timestamp, self.cfg.net_period() as f32, records);
        let outgoing: Vec<(NetMsg, SocketAddr)> = self
            .peers
            .iter()
            .map(|s| {
                let own = s.nickname.as_deref();
                (NetMsg::Snapshot(snap.for_recipient(own)), s.addr)
            })
            .collect();
        self.send_all(outgoing).await;
        Ok(())
    }

    async fn send_probes(&mut self) {
        let clock = self.clock();
        let mut outgoing = Vec::new();
        for addr in self.peers.addrs() {
            if let Some(probe) = self.peers.get_mut(&addr).and_then(|s| s.ping.poll(clock)) {
                outgoing.push((probe, addr));
            }
        }
        self.send_all(outgoing).await;
    }

    async fn send_all(&self, outgoing: Vec<(NetMsg, SocketAddr)>) {
        for (msg, to) in outgoing {
            if let Err(e) = self.transport.send_to(&msg, to).await {
                warn!(peer = %to, error = %e, "send failed");
            }
        }
    }
}

/// Helper for tests: bind to an ephemeral localhost port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, ArenaConfig)> {
    bind_ephemeral_with(ArenaConfig {
        tick_hz,
        ..Default::default()
    })
    .await
}

/// Like [`bind_ephemeral`], keeping every other field of `cfg`.
pub async fn bind_ephemeral_with(cfg: ArenaConfig) -> anyhow::Result<(GameServer, ArenaConfig)> {
    let cfg = ArenaConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        ..cfg
    };
    let mut server = GameServer::bind(cfg).await?;
    server.cfg.server_addr = server.local_addr()?.to_string();
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}
