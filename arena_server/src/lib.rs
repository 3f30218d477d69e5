//! `arena_server`
//!
//! Server-side systems:
//! - Peer table keyed by socket address, with liveness eviction
//! - Authoritative fixed-timestep world
//! - Applies the newest `intent` of each peer
//! - Broadcasts `snapshot`s on the network tick
//!
//! Networking model:
//! - UDP only; every datagram is one compressed `NetMsg`
//! - No handshake: a `join` claims a person by nickname

pub mod peers;
pub mod server;

pub use server::GameServer;
