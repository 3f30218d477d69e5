//! `arena_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Deterministic fixed-step simulation; every random stream is seeded.
//! - Clear separation of concerns (physics, combat, world, net, replication).
//! - Traits at collaborator seams (rendering, bodies).
//! - No `unsafe`.

pub mod arena;
pub mod combat;
pub mod compression;
pub mod config;
pub mod entity;
pub mod event;
pub mod intent;
pub mod math;
pub mod net;
pub mod physics;
pub mod ping;
pub mod render;
pub mod snapshot;
pub mod weapon;
pub mod world;
