//! Bot behavior engine
//!
//! Every bot runs one of two state machines picked from its profile:
//! - `Plain`: regen, random wander with bounce-back on walls, opportunistic fire.
//! - `Advanced`: adds a retreating state with hysteresis. While retreating the
//!   bot runs directly away from the nearest fighter, regenerates slower and
//!   holds fire. Otherwise it wanders like a plain bot, slowed briefly after
//!   each shot.

use std::f32::consts::PI;

use rand::Rng;

use super::combat::MAX_BULLETS;
use super::entity::{Behavior, Bot, BurstPolicy, MAX_HEALTH};
use super::geometry::{Arena, ENTITY_RADIUS};
use super::physics::{PhysicsSystem, REGEN_AMOUNT, REGEN_INTERVAL_MS};

/// No shots right after (re)spawning
pub const FIRE_GRACE_MS: u64 = 1200;
/// Targets further than this are ignored entirely
pub const MAX_ENGAGE_RANGE: f32 = 800.0;
/// Targets are tracked inside `MAX_ENGAGE_RANGE` but only shot inside this
pub const FIRE_RANGE: f32 = 700.0;

/// Line-of-fire probe in front of the bot
const PROBE_DISTANCE: f32 = 30.0;
const PROBE_RADIUS: f32 = 6.0;

const AIM_JITTER: f32 = 0.08;
const PLAIN_WANDER_JITTER: f32 = 0.2;
const ADVANCED_WANDER_JITTER: f32 = 0.08;
const OVER_ROTATE_CHANCE: f32 = 0.02;

/// Read-only view of the world a bot decides against
pub struct BotContext<'a> {
    pub arena: &'a Arena,
    /// Positions of fighting players
    pub targets: &'a [(f32, f32)],
    pub now: u64,
    pub live_bullets: usize,
}

/// A bullet the bot wants to spawn; the world assigns the id
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotRequest {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub speed: f32,
}

impl Bot {
    /// Run one AI tick, returning any shots fired
    pub fn think<R: Rng + ?Sized>(&mut self, ctx: &BotContext<'_>, rng: &mut R) -> Vec<ShotRequest> {
        match self.profile.behavior {
            Behavior::Plain => self.update(ctx, rng),
            Behavior::Advanced { .. } => self.update_advanced(ctx, rng),
        }
    }

    pub fn update<R: Rng + ?Sized>(&mut self, ctx: &BotContext<'_>, rng: &mut R) -> Vec<ShotRequest> {
        self.regen(ctx.now, REGEN_AMOUNT);
        self.wander_angle += (rng.gen::<f32>() - 0.5) * PLAIN_WANDER_JITTER;
        self.wander(ctx.arena, self.profile.speed);
        self.fire_at_players(ctx, rng)
    }

    pub fn update_advanced<R: Rng + ?Sized>(
        &mut self,
        ctx: &BotContext<'_>,
        rng: &mut R,
    ) -> Vec<ShotRequest> {
        let Behavior::Advanced {
            retreat_at,
            recover_at,
            retreat_speed_multiplier,
            retreat_regen,
            recoil_ms,
            recoil_speed_multiplier,
        } = self.profile.behavior
        else {
            return self.update(ctx, rng);
        };

        let regen = if self.retreating { retreat_regen } else { REGEN_AMOUNT };
        self.regen(ctx.now, regen);

        if self.retreating && rng.gen::<f32>() < OVER_ROTATE_CHANCE {
            self.angle += PI * (0.8 + rng.gen::<f32>() * 0.4);
        }

        let mut speed = self.profile.speed;
        if ctx.now.saturating_sub(self.last_fire_ms) < recoil_ms {
            speed *= recoil_speed_multiplier;
        }

        if self.hp <= retreat_at {
            self.retreating = true;
        }

        if self.retreating {
            speed *= retreat_speed_multiplier;
            if let Some((tx, ty, _)) = self.nearest_target(ctx.targets) {
                self.angle = (self.y - ty).atan2(self.x - tx);
            }
            let (x, y) = PhysicsSystem::slide(
                ctx.arena,
                self.x,
                self.y,
                self.angle.cos() * speed,
                self.angle.sin() * speed,
                ENTITY_RADIUS,
            );
            self.x = x;
            self.y = y;

            if self.hp >= recover_at {
                self.retreating = false;
            }
            return Vec::new();
        }

        self.wander_angle += (rng.gen::<f32>() - 0.5) * ADVANCED_WANDER_JITTER;
        self.wander(ctx.arena, speed);
        self.fire_at_players(ctx, rng)
    }

    /// Aim at the nearest fighter and shoot if every gate allows it
    pub fn fire_at_players<R: Rng + ?Sized>(
        &mut self,
        ctx: &BotContext<'_>,
        rng: &mut R,
    ) -> Vec<ShotRequest> {
        let probe_x = self.x + self.angle.cos() * PROBE_DISTANCE;
        let probe_y = self.y + self.angle.sin() * PROBE_DISTANCE;
        if ctx.arena.collides_with_wall(probe_x, probe_y, PROBE_RADIUS) {
            return Vec::new();
        }

        if ctx.now.saturating_sub(self.spawn_ms) < FIRE_GRACE_MS {
            return Vec::new();
        }
        if ctx.live_bullets >= MAX_BULLETS {
            return Vec::new();
        }

        let Some((tx, ty, dist)) = self.nearest_target(ctx.targets) else {
            return Vec::new();
        };
        if dist > MAX_ENGAGE_RANGE {
            return Vec::new();
        }
        self.angle = (ty - self.y).atan2(tx - self.x);

        let burst_chance = match self.profile.burst {
            BurstPolicy::Single => 0.0,
            BurstPolicy::Elite {
                hit_threshold,
                chance,
                ..
            } => {
                if self.recent_hits >= hit_threshold {
                    self.recent_hits = 0;
                    1.0
                } else {
                    chance
                }
            }
        };

        let ready = ctx.now.saturating_sub(self.last_fire_ms) > self.profile.fire_cooldown_ms;
        if dist >= FIRE_RANGE || !ready {
            return Vec::new();
        }

        let shots = match self.profile.burst {
            BurstPolicy::Elite { shots, .. } if rng.gen::<f32>() < burst_chance => shots,
            _ => 1,
        };

        let speed = self.profile.bullet_speed / 60.0;
        let requests = (0..shots)
            .map(|_| ShotRequest {
                x: self.x,
                y: self.y,
                angle: self.angle + (rng.gen::<f32>() - 0.5) * AIM_JITTER,
                speed,
            })
            .collect();

        self.last_fire_ms = ctx.now;
        requests
    }

    fn regen(&mut self, now: u64, amount: f32) {
        if now.saturating_sub(self.last_regen_ms) > REGEN_INTERVAL_MS {
            self.hp = (self.hp + amount).min(MAX_HEALTH);
            self.last_regen_ms = now;
        }
    }

    /// Step along the wander heading, turning around on collision
    fn wander(&mut self, arena: &Arena, speed: f32) {
        let (mut x, mut y) = (self.x, self.y);
        if PhysicsSystem::try_advance(arena, &mut x, &mut y, self.wander_angle, speed, ENTITY_RADIUS) {
            self.x = x;
            self.y = y;
        } else {
            self.wander_angle += PI;
        }
    }

    fn nearest_target(&self, targets: &[(f32, f32)]) -> Option<(f32, f32, f32)> {
        targets
            .iter()
            .map(|&(tx, ty)| (tx, ty, (tx - self.x).hypot(ty - self.y)))
            .min_by(|a, b| a.2.total_cmp(&b.2))
    }
}
