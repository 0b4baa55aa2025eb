//! Combat system - bullets, hit detection, damage and kill resolution

use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::ws::protocol::ServerMsg;

use super::entity::{Bot, BotKind, BotState, Bullet, HitReaction, Owner, ParticipantState, PlayerId, Target};
use super::geometry::{BULLET_RADIUS, ENTITY_RADIUS};
use super::physics::PhysicsSystem;
use super::world::World;
use super::Outbound;

/// Live bullets across the whole arena
pub const MAX_BULLETS: usize = 60;
/// Live bullets a single player may own
pub const MAX_BULLETS_PER_PLAYER: usize = 8;
pub const BULLET_LIFETIME_MS: u64 = 1200;
/// Player bullet speed, distance per 1/60 s
pub const PLAYER_BULLET_SPEED: f32 = 900.0 / 60.0;

/// Length of one bullet sub-step in seconds
pub const BULLET_SUB_STEP: f32 = 1.0 / crate::util::time::BULLET_TPS as f32;
/// Multiplier from bullet speed to distance covered in one sub-step
pub const BULLET_STEP_SCALE: f32 = 1.0;

pub const BASE_DAMAGE: f32 = 10.0;
/// Combined entity + bullet radius plus a little forgiveness
pub const HIT_RADIUS: f32 = ENTITY_RADIUS + BULLET_RADIUS + 6.0;
/// Half extent of the square pre-filter around a target
const HIT_BOX: f32 = 40.0;

/// Points for killing a human, and for a human killing another human
const PLAYER_KILL_POINTS: u32 = 3;

/// Stateless combat rules
pub struct CombatSystem;

impl CombatSystem {
    /// Damage a bot takes from one hit, updating its hit counters
    pub fn bot_damage(bot: &mut Bot, base_damage: f32, now: u64) -> f32 {
        let mut damage = base_damage;
        let mut multiplier = bot.profile.damage_taken_multiplier;

        match bot.profile.hit_reaction {
            HitReaction::None => {}
            HitReaction::ChainDecay {
                window_ms,
                step,
                max_reduction,
            } => {
                if now.saturating_sub(bot.last_hit_ms) < window_ms {
                    bot.hit_chain += 1;
                } else {
                    bot.hit_chain = 0;
                }
                bot.last_hit_ms = now;
                let reduction = (bot.hit_chain as f32 * step).min(max_reduction);
                damage *= 1.0 - reduction;
            }
            HitReaction::Stance {
                window_ms,
                retreating_multiplier,
                armored_multiplier,
            } => {
                if now.saturating_sub(bot.last_hit_ms) < window_ms {
                    bot.recent_hits += 1;
                } else {
                    bot.recent_hits = 1;
                }
                bot.last_hit_ms = now;
                multiplier *= if bot.retreating {
                    retreating_multiplier
                } else {
                    armored_multiplier
                };
            }
        }

        damage * multiplier
    }

    /// Score awarded to `shooter` for killing `victim`
    pub fn kill_points(shooter: Owner, victim: Target) -> u32 {
        match (shooter, victim) {
            (Owner::Bot(kind), Target::Player(_)) => kind.profile().kill_player_points,
            (Owner::Bot(_), Target::Bot(_)) => 0,
            (Owner::Player(_), Target::Bot(kind)) => kind.profile().bounty,
            (Owner::Player(_), Target::Player(_)) => PLAYER_KILL_POINTS,
        }
    }
}

/// What happened to a bullet during one sub-step
enum BulletFate {
    Alive(Bullet),
    Expired,
    Culled,
}

impl World {
    /// Fire intent from a player; silently dropped when any gate refuses
    pub fn fire_player(&mut self, id: PlayerId, angle: Option<f32>) {
        let now = self.now_ms;
        let owned = self
            .bullets
            .values()
            .filter(|b| b.owner == Owner::Player(id))
            .count();

        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if !player.is_active() || player.lives == 0 {
            return;
        }
        if owned >= MAX_BULLETS_PER_PLAYER {
            return;
        }
        if now.saturating_sub(player.last_fire_ms) < player.fire_cooldown_ms {
            return;
        }
        player.last_fire_ms = now;

        let angle = angle.filter(|a| a.is_finite()).unwrap_or(player.angle);
        let (x, y) = (player.x, player.y);
        self.spawn_bullet(Owner::Player(id), x, y, angle, PLAYER_BULLET_SPEED);
    }

    /// Create a bullet unless the global cap is reached
    pub fn spawn_bullet(&mut self, owner: Owner, x: f32, y: f32, angle: f32, speed: f32) -> Option<u64> {
        if self.bullets.len() >= MAX_BULLETS {
            return None;
        }
        self.next_bullet_id += 1;
        let id = self.next_bullet_id;
        self.bullets.insert(
            id,
            Bullet {
                id,
                owner,
                x,
                y,
                angle,
                speed,
                born_ms: self.now_ms,
            },
        );
        Some(id)
    }

    /// Consume every whole sub-step the accumulated delta allows
    pub fn step_bullets(&mut self, dt: f32) {
        self.bullet_accumulator += dt;
        while self.bullet_accumulator >= BULLET_SUB_STEP {
            self.bullet_accumulator -= BULLET_SUB_STEP;
            self.bullet_sub_step();
        }
    }

    /// Advance, cull and hit-test every bullet once
    pub fn bullet_sub_step(&mut self) {
        let now = self.now_ms;
        let ids: Vec<u64> = self.bullets.keys().copied().collect();
        let mut died: HashSet<Target> = HashSet::new();

        for id in ids {
            let fate = match self.bullets.get_mut(&id) {
                None => continue,
                Some(bullet) if now.saturating_sub(bullet.born_ms) > BULLET_LIFETIME_MS => {
                    BulletFate::Expired
                }
                Some(bullet) => {
                    bullet.x += bullet.angle.cos() * bullet.speed * BULLET_STEP_SCALE;
                    bullet.y += bullet.angle.sin() * bullet.speed * BULLET_STEP_SCALE;

                    if !bullet.x.is_finite()
                        || !bullet.y.is_finite()
                        || self.arena.collides_with_wall(bullet.x, bullet.y, BULLET_RADIUS)
                        || self.arena.out_of_bounds(bullet.x, bullet.y)
                    {
                        BulletFate::Culled
                    } else {
                        BulletFate::Alive(bullet.clone())
                    }
                }
            };

            let bullet = match fate {
                BulletFate::Alive(bullet) => bullet,
                BulletFate::Expired | BulletFate::Culled => {
                    self.bullets.remove(&id);
                    continue;
                }
            };

            // First eligible target in iteration order wins
            let Some(target) = self.first_target_hit(&bullet) else {
                continue;
            };
            self.bullets.remove(&id);

            let hp = self.apply_hit(target, now);
            if hp <= 0.0 {
                if !died.insert(target) {
                    continue;
                }
                self.resolve_death(target, bullet.owner);
            }
        }
    }

    /// Active players first, then live bots. Only players carry spawn
    /// protection.
    fn first_target_hit(&self, bullet: &Bullet) -> Option<Target> {
        let now = self.now_ms;
        let players = self
            .players
            .values()
            .filter(|p| p.is_active())
            .map(|p| (Target::Player(p.id), p.x, p.y, p.is_protected(now)));
        let bots = self
            .bots
            .values()
            .filter(|b| b.is_alive())
            .map(|b| (Target::Bot(b.kind), b.x, b.y, false));

        players
            .chain(bots)
            .filter(|&(target, ..)| target != bullet.owner)
            .filter(|&(_, x, y, _)| PhysicsSystem::within_box(x, y, bullet.x, bullet.y, HIT_BOX))
            .filter(|&(.., protected)| !protected)
            .find(|&(_, x, y, _)| PhysicsSystem::within_radius(bullet.x, bullet.y, x, y, HIT_RADIUS))
            .map(|(target, ..)| target)
    }

    /// Subtract damage and interrupt regen. Returns the remaining health.
    fn apply_hit(&mut self, target: Target, now: u64) -> f32 {
        match target {
            Target::Player(id) => match self.players.get_mut(&id) {
                Some(player) => {
                    player.hp -= BASE_DAMAGE * player.damage_taken_multiplier;
                    player.last_regen_ms = now;
                    player.hp
                }
                None => f32::MAX,
            },
            Target::Bot(kind) => match self.bots.get_mut(&kind) {
                Some(bot) => {
                    bot.hp -= CombatSystem::bot_damage(bot, BASE_DAMAGE, now);
                    bot.last_regen_ms = now;
                    bot.hp
                }
                None => f32::MAX,
            },
        }
    }

    fn display_name(&self, who: Owner) -> Option<String> {
        match who {
            Owner::Player(id) => self.players.get(&id).map(|p| p.name.clone()),
            Owner::Bot(kind) => self.bots.get(&kind).map(|_| kind.name().to_string()),
        }
    }

    /// Credit the kill, announce it, then respawn, eliminate or retire
    fn resolve_death(&mut self, victim: Target, shooter: Owner) {
        let victim_name = self.display_name(victim).unwrap_or_default();
        let shooter_name = self.display_name(shooter);

        if shooter_name.is_some() {
            let points = CombatSystem::kill_points(shooter, victim);
            match shooter {
                Owner::Player(id) => {
                    if let Some(p) = self.players.get_mut(&id) {
                        p.score += points;
                    }
                }
                Owner::Bot(kind) => {
                    if let Some(b) = self.bots.get_mut(&kind) {
                        b.score += points;
                    }
                }
            }
        }

        let shooter_name = shooter_name.unwrap_or_else(|| "The Void".to_string());
        debug!(shooter = %shooter_name, victim = %victim_name, "Kill");
        self.events.push(Outbound::Broadcast(ServerMsg::KillEvent {
            shooter: shooter_name,
            victim: victim_name,
        }));

        match victim {
            Target::Player(id) => self.resolve_player_death(id),
            Target::Bot(kind) => self.resolve_bot_death(kind),
        }
    }

    fn resolve_player_death(&mut self, id: PlayerId) {
        let spawn = self.arena.safe_spawn(&mut self.rng);
        let now = self.now_ms;
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };

        player.lives = player.lives.saturating_sub(1);
        if player.lives == 0 {
            player.hp = 0.0;
            player.state = ParticipantState::Spectating;
            info!(conn_id = %id, name = %player.name, "Player eliminated");
            return;
        }

        player.respawn_at(spawn, now);
        self.events.push(Outbound::Direct(
            id,
            ServerMsg::Respawned {
                x: player.x,
                y: player.y,
            },
        ));
    }

    fn resolve_bot_death(&mut self, kind: BotKind) {
        if self.should_respawn_bot(kind) {
            let spawn = self.bot_spawn_point();
            let now = self.now_ms;
            if let Some(bot) = self.bots.get_mut(&kind) {
                bot.respawn_at(spawn, now);
            }
            return;
        }
        self.retire_bot(kind);
    }

    fn should_respawn_bot(&mut self, kind: BotKind) -> bool {
        if self.match_timer <= 0.0 {
            return false;
        }
        self.rng.gen_bool(kind.profile().respawn_chance)
    }

    /// Bobby stays listed as retired; special bots leave until the next gate
    pub fn retire_bot(&mut self, kind: BotKind) {
        match kind {
            BotKind::Bobby => {
                if let Some(bot) = self.bots.get_mut(&kind) {
                    bot.state = BotState::Retired;
                }
            }
            BotKind::Rob | BotKind::Eliminator => {
                self.bots.remove(&kind);
            }
        }
        info!(bot = kind.id(), "Bot retired");
        self.events.push(Outbound::Broadcast(ServerMsg::BotRetired {
            id: kind.id().to_string(),
            message: kind.retired_message().to_string(),
        }));
    }

    /// Drop any bullet whose coordinates stopped being finite
    pub fn sanitize_bullets(&mut self) {
        let before = self.bullets.len();
        self.bullets.retain(|_, b| b.x.is_finite() && b.y.is_finite() && b.angle.is_finite());
        if self.bullets.len() != before {
            warn!(dropped = before - self.bullets.len(), "Dropped corrupt bullets");
        }
    }
}
