//! `arena_client`
//!
//! Client-side systems:
//! - Input sampling into per-tick intents
//! - Kind tag → constructor registry
//! - Snapshot reconciliation into a replica world
//! - Local simulation of spawn-only and local projectiles
//! - Rendering through the `RenderBackend` collaborator

pub mod client;
pub mod input;
pub mod registry;
pub mod replica;

pub use client::GameClient;
