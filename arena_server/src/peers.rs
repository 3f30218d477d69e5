//! Peer table.
//!
//! There is no handshake: a peer exists from its first datagram and is
//! identified by its socket address. Each session keeps an inbox ordered
//! most-recent-first, so the server can act on the newest intent and drop
//! older ones.

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    time::{Duration, Instant},
};

use arena_shared::{net::NetMsg, ping::PingTracker};
use tracing::info;

/// Messages kept per peer between two server ticks.
pub const INBOX_CAP: usize = 64;

/// Characters reserved for generated projectile and shrapnel names.
const RESERVED_NAME_CHARS: [char; 2] = ['#', ':'];

/// Whether a client may claim `nickname`.
pub fn is_valid_nickname(nickname: &str) -> bool {
    !nickname.trim().is_empty() && !nickname.contains(RESERVED_NAME_CHARS)
}

/// Server-side state of one remote client.
#[derive(Debug)]
pub struct ClientSession {
    pub addr: SocketAddr,
    inbox: VecDeque<NetMsg>,
    pub last_seen: Instant,
    /// Person claimed through `join`.
    pub nickname: Option<String>,
    pub ping: PingTracker,
    /// Newest snapshot timestamp the client acknowledged.
    pub last_ack: f64,
}

impl ClientSession {
    fn new(addr: SocketAddr, now: Instant, ping_interval: f64) -> Self {
        Self {
            addr,
            inbox: VecDeque::new(),
            last_seen: now,
            nickname: None,
            ping: PingTracker::new(ping_interval),
            last_ack: 0.0,
        }
    }

    fn push(&mut self, msg: NetMsg) {
        self.inbox.push_front(msg);
        self.inbox.truncate(INBOX_CAP);
    }

    /// Pending messages, most recent first.
    pub fn take_inbox(&mut self) -> Vec<NetMsg> {
        self.inbox.drain(..).collect()
    }

    /// Smoothed round trip in milliseconds, zero until measured.
    pub fn ping_ms(&self) -> f32 {
        self.ping.rtt().map_or(0.0, |rtt| (rtt * 1000.0) as f32)
    }
}

#[derive(Debug)]
pub struct PeerTable {
    sessions: HashMap<SocketAddr, ClientSession>,
    timeout: Duration,
    ping_interval: f64,
}

impl PeerTable {
    pub fn new(timeout: Duration, ping_interval: f64) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout,
            ping_interval,
        }
    }

    /// Marks `addr` alive, creating its session on first contact.
    pub fn touch(&mut self, addr: SocketAddr, now: Instant) -> &mut ClientSession {
        let ping_interval = self.ping_interval;
        let session = self.sessions.entry(addr).or_insert_with(|| {
            info!(peer = %addr, "new peer");
            ClientSession::new(addr, now, ping_interval)
        });
        session.last_seen = now;
        session
    }

    pub fn deliver(&mut self, addr: SocketAddr, msg: NetMsg, now: Instant) {
        self.touch(addr, now).push(msg);
    }

    /// Removes and returns every session silent for longer than the timeout.
    pub fn evict_stale(&mut self, now: Instant) -> Vec<ClientSession> {
        let timeout = self.timeout;
        let stale: Vec<SocketAddr> = self
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_seen) > timeout)
            .map(|s| s.addr)
            .collect();
        stale
            .into_iter()
            .filter_map(|addr| self.sessions.remove(&addr))
            .collect()
    }

    /// Address of the peer that claimed `nickname`, if any.
    pub fn claimant(&self, nickname: &str) -> Option<SocketAddr> {
        self.sessions
            .values()
            .find(|s| s.nickname.as_deref() == Some(nickname))
            .map(|s| s.addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&ClientSession> {
        self.sessions.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut ClientSession> {
        self.sessions.get_mut(addr)
    }

    /// Addresses in a stable order.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = self.sessions.keys().copied().collect();
        addrs.sort();
        addrs
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn inbox_is_most_recent_first_and_capped() {
        let mut peers = PeerTable::new(Duration::from_secs(10), 1.0);
        let now = Instant::now();
        for seq in 0..(INBOX_CAP as u32 + 10) {
            peers.deliver(addr(1), NetMsg::Ping { seq }, now);
        }
        let inbox = peers.get_mut(&addr(1)).unwrap().take_inbox();
        assert_eq!(inbox.len(), INBOX_CAP);
        assert_eq!(
            inbox[0],
            NetMsg::Ping {
                seq: INBOX_CAP as u32 + 9
            }
        );
        assert!(peers.get_mut(&addr(1)).unwrap().take_inbox().is_empty());
    }

    #[test]
    fn silent_peers_are_evicted() {
        let mut peers = PeerTable::new(Duration::from_secs(10), 1.0);
        let start = Instant::now();
        peers.touch(addr(1), start);
        peers.touch(addr(2), start + Duration::from_secs(8));

        let gone = peers.evict_stale(start + Duration::from_secs(12));
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].addr, addr(1));
        assert_eq!(peers.addrs(), vec![addr(2)]);
    }

    #[test]
    fn generated_entity_names_cannot_be_claimed() {
        assert!(is_valid_nickname("ada"));
        assert!(!is_valid_nickname("bullet#1"));
        assert!(!is_valid_nickname("grenade#4:17"));
        assert!(!is_valid_nickname("  "));
    }

    #[test]
    fn nickname_claims_are_looked_up_by_name() {
        let mut peers = PeerTable::new(Duration::from_secs(10), 1.0);
        peers.touch(addr(1), Instant::now()).nickname = Some("ada".into());
        assert_eq!(peers.claimant("ada"), Some(addr(1)));
        assert_eq!(peers.claimant("bob"), None);
    }
}
