//! Entity model - players, bots, bullets and their runtime fields

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::InputIntent;

pub const MAX_HEALTH: f32 = 100.0;
pub const MAX_STAMINA: f32 = 100.0;
pub const STARTING_LIVES: u32 = 3;
/// Window after a (re)spawn during which damage is ignored
pub const SPAWN_PROTECTION_MS: u64 = 3000;
/// Minimum time between player shots
pub const PLAYER_FIRE_COOLDOWN_MS: u64 = 100;

/// Connection-scoped player identifier
pub type PlayerId = Uuid;

/// Participation mode of a connected player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    /// Fighting: has health and lives, collides with walls
    Active,
    /// Eliminated: ghost movement only
    Spectating,
    /// Joined too late in the match to fight
    ForcedSpectator,
    /// Joined after the match ended; frozen until the next reset
    WaitingForRematch,
}

impl ParticipantState {
    /// Ghost movement, no collision and no combat
    pub fn is_ghost(self) -> bool {
        matches!(self, Self::Spectating | Self::ForcedSpectator)
    }
}

/// Authoritative player record
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,

    pub x: f32,
    pub y: f32,
    pub angle: f32,

    pub hp: f32,
    pub lives: u32,
    pub score: u32,
    pub stamina: f32,
    pub state: ParticipantState,
    pub damage_taken_multiplier: f32,

    pub spawn_protected_until: u64,
    pub last_fire_ms: u64,
    pub fire_cooldown_ms: u64,
    pub last_regen_ms: u64,
    pub input: InputIntent,
}

impl Player {
    pub fn new(
        id: PlayerId,
        name: String,
        color: String,
        spawn: (f32, f32),
        state: ParticipantState,
        now: u64,
    ) -> Self {
        Self {
            id,
            name,
            color,
            x: spawn.0,
            y: spawn.1,
            angle: 0.0,
            hp: MAX_HEALTH,
            lives: STARTING_LIVES,
            score: 0,
            stamina: MAX_STAMINA,
            state,
            damage_taken_multiplier: 1.0,
            spawn_protected_until: now + SPAWN_PROTECTION_MS,
            last_fire_ms: 0,
            fire_cooldown_ms: PLAYER_FIRE_COOLDOWN_MS,
            last_regen_ms: now,
            input: InputIntent::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ParticipantState::Active
    }

    pub fn is_protected(&self, now: u64) -> bool {
        now < self.spawn_protected_until
    }

    /// Put the player back into the fight at `spawn` with full resources.
    /// Score and lives are left to the caller.
    pub fn respawn_at(&mut self, spawn: (f32, f32), now: u64) {
        self.x = spawn.0;
        self.y = spawn.1;
        self.hp = MAX_HEALTH;
        self.stamina = MAX_STAMINA;
        self.spawn_protected_until = now + SPAWN_PROTECTION_MS;
        self.last_regen_ms = now;
    }

    /// Full reset used by match resets and accepted rematches
    pub fn reenter(&mut self, spawn: (f32, f32), now: u64) {
        self.respawn_at(spawn, now);
        self.lives = STARTING_LIVES;
        self.score = 0;
        self.state = ParticipantState::Active;
    }
}

/// Incoming-damage policy that differs per bot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitReaction {
    None,
    /// Hits landing within `window_ms` of each other grow a chain that
    /// removes `step` of the damage per link, capped at `max_reduction`
    ChainDecay {
        window_ms: u64,
        step: f32,
        max_reduction: f32,
    },
    /// Counts hits within `window_ms` (feeds the burst trigger) and scales
    /// damage by stance
    Stance {
        window_ms: u64,
        retreating_multiplier: f32,
        armored_multiplier: f32,
    },
}

/// How a bot spends a fire decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BurstPolicy {
    Single,
    /// Guaranteed burst once `hit_threshold` recent hits are reached,
    /// otherwise a burst with probability `chance`
    Elite {
        hit_threshold: u32,
        chance: f32,
        shots: u32,
    },
}

/// Movement state machine variant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    Plain,
    Advanced {
        retreat_at: f32,
        recover_at: f32,
        retreat_speed_multiplier: f32,
        retreat_regen: f32,
        recoil_ms: u64,
        recoil_speed_multiplier: f32,
    },
}

/// Data-driven tunables for one bot kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BotProfile {
    pub speed: f32,
    pub bullet_speed: f32,
    pub damage_taken_multiplier: f32,
    pub fire_cooldown_ms: u64,
    /// Chance to appear when the special-bot gate fires
    pub spawn_chance: f64,
    /// Chance to come back after a death
    pub respawn_chance: f64,
    /// Points for killing a player
    pub kill_player_points: u32,
    /// Points a player earns for killing this bot
    pub bounty: u32,
    pub burst: BurstPolicy,
    pub hit_reaction: HitReaction,
    pub behavior: Behavior,
}

/// The three fixed bots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BotKind {
    Bobby,
    Rob,
    Eliminator,
}

impl BotKind {
    pub const SPECIALS: [BotKind; 2] = [BotKind::Rob, BotKind::Eliminator];

    pub fn id(self) -> &'static str {
        match self {
            Self::Bobby => "bot_bobby",
            Self::Rob => "bot_rob",
            Self::Eliminator => "bot_eliminator",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bobby => "Bobby",
            Self::Rob => "Rob",
            Self::Eliminator => "Eliminator",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Bobby => "#8A9A5B",
            Self::Rob => "#4A90E2",
            Self::Eliminator => "#E24A4A",
        }
    }

    /// Line broadcast when the bot leaves the arena for good
    pub fn retired_message(self) -> &'static str {
        match self {
            Self::Bobby => "Bobby has stopped for the day.",
            Self::Rob => "Rob has left the arena.",
            Self::Eliminator => "The Eliminator has fallen…",
        }
    }

    pub fn profile(self) -> BotProfile {
        match self {
            Self::Bobby => BotProfile {
                speed: 3.1,
                bullet_speed: 800.0,
                damage_taken_multiplier: 1.35,
                fire_cooldown_ms: 1500,
                spawn_chance: 1.0,
                respawn_chance: 1.0,
                kill_player_points: 6,
                bounty: 1,
                burst: BurstPolicy::Single,
                hit_reaction: HitReaction::None,
                behavior: Behavior::Plain,
            },
            Self::Rob => BotProfile {
                speed: 4.6,
                bullet_speed: 950.0,
                damage_taken_multiplier: 0.75,
                fire_cooldown_ms: 700,
                spawn_chance: 0.75,
                respawn_chance: 0.75,
                kill_player_points: 3,
                bounty: 3,
                burst: BurstPolicy::Single,
                hit_reaction: HitReaction::ChainDecay {
                    window_ms: 250,
                    step: 0.1,
                    max_reduction: 0.6,
                },
                behavior: Behavior::Plain,
            },
            Self::Eliminator => BotProfile {
                speed: 3.9,
                bullet_speed: 1100.0,
                damage_taken_multiplier: 0.4,
                fire_cooldown_ms: 400,
                spawn_chance: 0.25,
                respawn_chance: 0.5,
                kill_player_points: 3,
                bounty: 6,
                burst: BurstPolicy::Elite {
                    hit_threshold: 4,
                    chance: 0.25,
                    shots: 4,
                },
                hit_reaction: HitReaction::Stance {
                    window_ms: 400,
                    retreating_multiplier: 1.35,
                    armored_multiplier: 0.75,
                },
                behavior: Behavior::Advanced {
                    retreat_at: 45.0,
                    recover_at: 70.0,
                    retreat_speed_multiplier: 1.25,
                    retreat_regen: 2.0,
                    recoil_ms: 600,
                    recoil_speed_multiplier: 0.5,
                },
            },
        }
    }
}

/// Whether a bot is still in play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    Alive,
    Retired,
}

/// Authoritative bot record
#[derive(Debug, Clone)]
pub struct Bot {
    pub kind: BotKind,
    pub profile: BotProfile,

    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub wander_angle: f32,

    pub hp: f32,
    pub score: u32,
    pub state: BotState,
    pub retreating: bool,

    pub spawn_ms: u64,
    pub last_fire_ms: u64,
    pub last_regen_ms: u64,

    pub last_hit_ms: u64,
    pub hit_chain: u32,
    pub recent_hits: u32,
}

impl Bot {
    pub fn new(kind: BotKind, spawn: (f32, f32), wander_angle: f32, now: u64) -> Self {
        Self {
            kind,
            profile: kind.profile(),
            x: spawn.0,
            y: spawn.1,
            angle: 0.0,
            wander_angle,
            hp: MAX_HEALTH,
            score: 0,
            state: BotState::Alive,
            retreating: false,
            spawn_ms: now,
            last_fire_ms: 0,
            last_regen_ms: now,
            last_hit_ms: 0,
            hit_chain: 0,
            recent_hits: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == BotState::Alive
    }

    pub fn respawn_at(&mut self, spawn: (f32, f32), now: u64) {
        self.x = spawn.0;
        self.y = spawn.1;
        self.hp = MAX_HEALTH;
        self.spawn_ms = now;
    }

    /// Match reset: back in play with a clean slate
    pub fn reset_at(&mut self, spawn: (f32, f32), now: u64) {
        self.respawn_at(spawn, now);
        self.score = 0;
        self.state = BotState::Alive;
        self.retreating = false;
        self.hit_chain = 0;
        self.recent_hits = 0;
    }
}

/// Who fired a bullet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Player(PlayerId),
    Bot(BotKind),
}

/// Anything a bullet can hit
pub type Target = Owner;

/// Live projectile
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: u64,
    pub owner: Owner,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    /// Distance per 1/60 s
    pub speed: f32,
    pub born_ms: u64,
}

/// Unique per-connection colors
#[derive(Debug, Default)]
pub struct ColorPool {
    used: HashSet<String>,
}

impl ColorPool {
    const ATTEMPTS: u32 = 50;

    pub fn acquire<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        for _ in 0..Self::ATTEMPTS {
            let color = format!("hsl({},70%,50%)", rng.gen_range(0..360));
            if self.used.insert(color.clone()) {
                return color;
            }
        }
        // Pool exhausted: hand out a fractional hue without tracking it
        format!("hsl({:.1},70%,50%)", rng.gen_range(0.0..360.0))
    }

    pub fn release(&mut self, color: &str) {
        self.used.remove(color);
    }

    pub fn in_use(&self) -> usize {
        self.used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_color_pool_unique_and_released() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut pool = ColorPool::default();

        let a = pool.acquire(&mut rng);
        let b = pool.acquire(&mut rng);
        assert_ne!(a, b);
        assert_eq!(pool.in_use(), 2);

        pool.release(&a);
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn test_bot_profiles() {
        assert_eq!(BotKind::Bobby.profile().respawn_chance, 1.0);
        assert!(matches!(BotKind::Rob.profile().hit_reaction, HitReaction::ChainDecay { .. }));
        assert!(matches!(BotKind::Eliminator.profile().behavior, Behavior::Advanced { .. }));
        assert_eq!(BotKind::Eliminator.id(), "bot_eliminator");
    }

    #[test]
    fn test_player_reenter_restores_resources() {
        let mut player = Player::new(
            Uuid::new_v4(),
            "Sniper".to_string(),
            "hsl(1,70%,50%)".to_string(),
            (100.0, 100.0),
            ParticipantState::Spectating,
            0,
        );
        player.hp = 0.0;
        player.lives = 0;
        player.score = 9;

        player.reenter((500.0, 600.0), 10_000);
        assert!(player.is_active());
        assert_eq!(player.lives, STARTING_LIVES);
        assert_eq!(player.score, 0);
        assert_eq!(player.hp, MAX_HEALTH);
        assert!(player.is_protected(12_999));
        assert!(!player.is_protected(13_000));
    }
}
