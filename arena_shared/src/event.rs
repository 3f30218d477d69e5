//! Event and messaging system.
//!
//! Two kinds of events live here:
//! - [`EntityEvent`]: one-shot events attached to an entity and replicated
//!   to clients at most once (renderer triggers such as muzzle flashes).
//! - [`EventBus`]: a small typed queue used inside a sub-step to defer side
//!   effects (scoring, detonations) until no entity is borrowed.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use serde::{Deserialize, Serialize};

/// One-shot event carried by an entity until the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityEvent {
    Shoot,
    Hit,
    Ricochet,
    Explode { seed: u64 },
    Reload,
    Death,
    Respawn,
}

/// A kill credited to `shooter` (suicide when it equals `victim`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frag {
    pub shooter: String,
    pub victim: String,
}

/// An armed grenade that must burst at the end of the sub-step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detonation {
    pub grenade: String,
}

/// Typed event bus.
#[derive(Default)]
pub struct EventBus {
    queues: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventBus {
    /// Pushes an event into the queue.
    pub fn push<E: 'static + Send + Sync>(&mut self, e: E) {
        let q = self
            .queues
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<E>::new()));
        if let Some(q) = q.downcast_mut::<Vec<E>>() {
            q.push(e);
        }
    }

    /// Drains all queued events of a type.
    pub fn drain<E: 'static + Send + Sync>(&mut self) -> Vec<E> {
        self.queues
            .remove(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast::<Vec<E>>().ok())
            .map(|boxed| *boxed)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
