//! Guns.
//!
//! A [`Gun`] is a small state machine (ready, firing, reloading) driven once
//! per sub-step by its owner:
//! - [`Gun::tick`] advances shot and reload timers.
//! - [`Gun::request_reload`] refills instantly and blocks firing for the
//!   reload duration.
//! - [`Gun::try_fire`] yields a [`Volley`] when a shot is allowed.
//! - [`Gun::recover`] blends accuracy back toward its baseline.

use crate::entity::EntityKind;

/// Widest spread cone half-angle, reached at zero accuracy (radians).
pub const MAX_SPREAD: f32 = 0.5;

/// Firing pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FireMode {
    Single,
    Burst {
        shots: u32,
        intra_delay: f32,
        inter_delay: f32,
    },
    Scatter {
        pellets: u32,
    },
}

/// What a gun launches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileSpec {
    pub kind: EntityKind,
    pub damage: f32,
    pub speed: f32,
}

/// Static description of a gun model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GunSpec {
    pub id: u8,
    pub name: &'static str,
    pub mode: FireMode,
    pub max_ammo: u32,
    pub reload_time: f32,
    pub shot_delay: f32,
    pub max_accuracy: f32,
    pub recoil: f32,
    pub auto_fire: bool,
    pub projectile: ProjectileSpec,
}

pub const PISTOL: GunSpec = GunSpec {
    id: 0,
    name: "pistol",
    mode: FireMode::Single,
    max_ammo: 12,
    reload_time: 1.2,
    shot_delay: 0.2,
    max_accuracy: 0.95,
    recoil: 0.1,
    auto_fire: false,
    projectile: ProjectileSpec {
        kind: EntityKind::Bullet,
        damage: 25.0,
        speed: 60.0,
    },
};

pub const RIFLE: GunSpec = GunSpec {
    id: 1,
    name: "rifle",
    mode: FireMode::Burst {
        shots: 3,
        intra_delay: 0.08,
        inter_delay: 0.35,
    },
    max_ammo: 30,
    reload_time: 2.0,
    shot_delay: 0.35,
    max_accuracy: 0.9,
    recoil: 0.06,
    auto_fire: true,
    projectile: ProjectileSpec {
        kind: EntityKind::Bullet,
        damage: 15.0,
        speed: 80.0,
    },
};

pub const SHOTGUN: GunSpec = GunSpec {
    id: 2,
    name: "shotgun",
    mode: FireMode::Scatter { pellets: 6 },
    max_ammo: 24,
    reload_time: 2.5,
    shot_delay: 0.9,
    max_accuracy: 0.7,
    recoil: 0.25,
    auto_fire: false,
    projectile: ProjectileSpec {
        kind: EntityKind::Bullet,
        damage: 12.0,
        speed: 50.0,
    },
};

pub const GRENADE_LAUNCHER: GunSpec = GunSpec {
    id: 3,
    name: "grenade launcher",
    mode: FireMode::Single,
    max_ammo: 4,
    reload_time: 2.5,
    shot_delay: 0.9,
    max_accuracy: 0.9,
    recoil: 0.2,
    auto_fire: false,
    projectile: ProjectileSpec {
        kind: EntityKind::Grenade,
        damage: 0.0,
        speed: 18.0,
    },
};

/// Every gun a person spawns with, indexed by id.
pub const CATALOGUE: [GunSpec; 4] = [PISTOL, RIFLE, SHOTGUN, GRENADE_LAUNCHER];

/// Coarse gun state, derived from timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GunState {
    Ready,
    Firing,
    Reloading,
}

/// How the owner is standing, for accuracy recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stance {
    Crouched,
    Standing,
    Airborne,
}

impl Stance {
    pub fn of(on_ground: bool, crouching: bool) -> Self {
        match (on_ground, crouching) {
            (false, _) => Stance::Airborne,
            (true, true) => Stance::Crouched,
            (true, false) => Stance::Standing,
        }
    }

    /// Fraction of the accuracy gap closed per second.
    fn recovery_rate(self) -> f32 {
        match self {
            Stance::Crouched => 6.0,
            Stance::Standing => 3.0,
            Stance::Airborne => 1.0,
        }
    }
}

/// One trigger result: `pellets` projectiles sharing a spread cone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volley {
    pub pellets: u32,
    pub spread: f32,
    pub projectile: ProjectileSpec,
}

/// Live gun state.
#[derive(Debug, Clone, PartialEq)]
pub struct Gun {
    pub id: u8,
    pub ammo: u32,
    pub max_ammo: u32,
    pub reload_time: f32,
    pub reload_remaining: f32,
    pub accuracy: f32,
    pub max_accuracy: f32,
    pub shot_delay: f32,
    pub next_shot_in: f32,
    pub mode: FireMode,
    pub burst_remaining: u32,
    pub recoil: f32,
    pub auto_fire: bool,
    /// Set once the trigger has been let go since the last shot.
    pub trigger_released: bool,
    pub projectile: ProjectileSpec,
}

impl Gun {
    pub fn from_spec(spec: &GunSpec) -> Self {
        Self {
            id: spec.id,
            ammo: spec.max_ammo,
            max_ammo: spec.max_ammo,
            reload_time: spec.reload_time,
            reload_remaining: 0.0,
            accuracy: spec.max_accuracy,
            max_accuracy: spec.max_accuracy,
            shot_delay: spec.shot_delay,
            next_shot_in: 0.0,
            mode: spec.mode,
            burst_remaining: 0,
            recoil: spec.recoil,
            auto_fire: spec.auto_fire,
            trigger_released: true,
            projectile: spec.projectile,
        }
    }

    pub fn state(&self) -> GunState {
        if self.reload_remaining > 0.0 {
            GunState::Reloading
        } else if self.burst_remaining > 0 || self.next_shot_in > 0.0 {
            GunState::Firing
        } else {
            GunState::Ready
        }
    }

    pub fn is_reloading(&self) -> bool {
        self.reload_remaining > 0.0
    }

    /// Accuracy lost to recoil and not yet recovered.
    pub fn instability(&self) -> f32 {
        self.max_accuracy - self.accuracy
    }

    /// Spread half-angle for the next shot.
    pub fn spread(&self) -> f32 {
        (1.0 - self.accuracy.clamp(0.0, 1.0)) * MAX_SPREAD
    }

    pub fn cancel_burst(&mut self) {
        self.burst_remaining = 0;
    }

    /// Returns `true` when the reload was accepted.
    pub fn request_reload(&mut self) -> bool {
        if self.is_reloading() || self.ammo >= self.max_ammo {
            return false;
        }
        self.ammo = self.max_ammo;
        self.reload_remaining = self.reload_time;
        self.cancel_burst();
        true
    }

    /// Restores a factory-fresh magazine and timers (respawn).
    pub fn refill(&mut self) {
        self.ammo = self.max_ammo;
        self.reload_remaining = 0.0;
        self.next_shot_in = 0.0;
        self.burst_remaining = 0;
        self.accuracy = self.max_accuracy;
        self.trigger_released = true;
    }

    pub fn tick(&mut self, dt: f32) {
        self.next_shot_in = (self.next_shot_in - dt).max(0.0);
        self.reload_remaining = (self.reload_remaining - dt).max(0.0);
    }

    /// Fires if allowed. `trigger` is whether the shoot intent is held.
    pub fn try_fire(&mut self, trigger: bool) -> Option<Volley> {
        if !trigger {
            self.trigger_released = true;
        }
        let continuing_burst = self.burst_remaining > 0;
        if !trigger && !continuing_burst {
            return None;
        }
        if self.is_reloading() || self.ammo == 0 || self.next_shot_in > 0.0 {
            return None;
        }
        if !continuing_burst && !self.auto_fire && !self.trigger_released {
            return None;
        }

        let spread = self.spread();
        let pellets = match self.mode {
            FireMode::Scatter { pellets } => pellets.min(self.ammo),
            FireMode::Single | FireMode::Burst { .. } => 1,
        };
        self.ammo -= pellets;
        self.accuracy -= self.recoil;
        if trigger {
            self.trigger_released = false;
        }

        match self.mode {
            FireMode::Burst {
                shots,
                intra_delay,
                inter_delay,
            } => {
                if self.burst_remaining == 0 {
                    self.burst_remaining = shots;
                }
                self.burst_remaining -= 1;
                if self.burst_remaining > 0 && self.ammo > 0 {
                    self.next_shot_in = intra_delay;
                } else {
                    self.burst_remaining = 0;
                    self.next_shot_in = inter_delay;
                }
            }
            FireMode::Single | FireMode::Scatter { .. } => {
                self.next_shot_in = self.shot_delay;
            }
        }

        Some(Volley {
            pellets,
            spread,
            projectile: self.projectile,
        })
    }

    pub fn recover(&mut self, dt: f32, stance: Stance) {
        let blend = (stance.recovery_rate() * dt).min(1.0);
        self.accuracy += (self.max_accuracy - self.accuracy) * blend;
    }
}
