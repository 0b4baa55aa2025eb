//! World aggregate and match lifecycle
//!
//! `World` is owned by the tick task. Intents and ticks mutate it directly
//! and every client-visible side effect is queued in `events` as an
//! [`Outbound`], flushed by the owner after each tick.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GameSettings;
use crate::util::time::BOT_TPS;
use crate::ws::protocol::{RosterEntry, ServerMsg};

use super::bot::BotContext;
use super::entity::{Bot, BotKind, Bullet, ColorPool, Owner, ParticipantState, Player, PlayerId};
use super::geometry::Arena;
use super::physics::PhysicsSystem;
use super::{InputIntent, Intent, Outbound, PlayerInput};

/// Delay between a match (re)populating and the special bots rolling in
pub const SPECIAL_BOT_DELAY_MS: u64 = 5000;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    Running,
    Ended,
}

/// Timed spawn of the special bots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialGate {
    Idle,
    Pending { at: u64 },
    Fired,
}

/// Policy rejections of a join request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejection {
    #[error("Match is full.")]
    Full,
    #[error("Already in the arena.")]
    AlreadyJoined,
}

/// Everything the simulation owns
pub struct World {
    pub arena: Arena,
    pub players: BTreeMap<PlayerId, Player>,
    pub bots: BTreeMap<BotKind, Bot>,
    pub bullets: BTreeMap<u64, Bullet>,
    pub next_bullet_id: u64,

    /// Seconds left in the match
    pub match_timer: f32,
    pub phase: MatchPhase,
    pub reset_pending: bool,
    pub special_gate: SpecialGate,

    pub rng: ChaCha8Rng,
    pub colors: ColorPool,

    pub bot_accumulator: f32,
    pub bullet_accumulator: f32,

    /// Simulation clock in unix milliseconds
    pub now_ms: u64,
    /// Side effects produced since the last drain
    pub events: Vec<Outbound>,

    settings: GameSettings,
}

impl World {
    pub fn new(settings: &GameSettings, seed: u64, now: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let arena = Arena::generate(&mut rng, settings.wall_count);
        let bobby_spawn = arena.bot_safe_spawn(&mut rng, &[]);
        let wander = rng.gen_range(0.0..TAU);

        let mut bots = BTreeMap::new();
        bots.insert(BotKind::Bobby, Bot::new(BotKind::Bobby, bobby_spawn, wander, now));

        Self {
            arena,
            players: BTreeMap::new(),
            bots,
            bullets: BTreeMap::new(),
            next_bullet_id: 0,
            match_timer: settings.match_duration_secs,
            phase: MatchPhase::Running,
            reset_pending: false,
            special_gate: SpecialGate::Idle,
            rng,
            colors: ColorPool::default(),
            bot_accumulator: 0.0,
            bullet_accumulator: 0.0,
            now_ms: now,
            events: Vec::new(),
            settings: settings.clone(),
        }
    }

    /// Move the simulation clock forward; it never runs backwards
    pub fn set_clock(&mut self, now: u64) {
        self.now_ms = self.now_ms.max(now);
    }

    pub fn drain_events(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.events)
    }

    pub fn has_active(&self) -> bool {
        self.players.values().any(Player::is_active)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn live_bot_count(&self) -> usize {
        self.bots.values().filter(|b| b.is_alive()).count()
    }

    fn active_positions(&self) -> Vec<(f32, f32)> {
        self.players
            .values()
            .filter(|p| p.is_active())
            .map(|p| (p.x, p.y))
            .collect()
    }

    /// Bot spawn away from walls and fighting players
    pub fn bot_spawn_point(&mut self) -> (f32, f32) {
        let players = self.active_positions();
        self.arena.bot_safe_spawn(&mut self.rng, &players)
    }

    fn roster(&self) -> Vec<RosterEntry> {
        let players = self.players.values().map(player_entry);
        let bots = self.bots.keys().map(|&kind| bot_entry(kind));
        players.chain(bots).collect()
    }

    /// Apply one intent from the gateway
    pub fn apply(&mut self, input: PlayerInput) {
        let id = input.conn_id;
        match input.intent {
            Intent::Join { name } => match self.join(id, name) {
                Ok(()) => {}
                Err(JoinRejection::Full) => {
                    self.events.push(Outbound::Direct(
                        id,
                        ServerMsg::ErrorMsg {
                            message: JoinRejection::Full.to_string(),
                        },
                    ));
                }
                Err(JoinRejection::AlreadyJoined) => {
                    warn!(conn_id = %id, "Ignoring repeated join");
                }
            },
            Intent::Input {
                move_x,
                move_y,
                sprint,
                angle,
            } => {
                if let Some(player) = self.players.get_mut(&id) {
                    player.input = InputIntent::sanitize(move_x, move_y, sprint, angle, player.input.angle);
                }
            }
            Intent::Fire { angle } => self.fire_player(id, angle),
            Intent::Rematch => self.rematch(id),
            Intent::Resync => self.resync(id),
            Intent::Disconnect => self.leave(id),
        }
    }

    /// Admit a new player, resetting a finished match first if one is due
    pub fn join(&mut self, id: PlayerId, name: String) -> Result<(), JoinRejection> {
        if self.players.contains_key(&id) {
            return Err(JoinRejection::AlreadyJoined);
        }
        if self.players.len() >= self.settings.max_players {
            return Err(JoinRejection::Full);
        }

        let did_reset = self.maybe_reset();
        let state = if !did_reset && self.phase != MatchPhase::Running {
            ParticipantState::WaitingForRematch
        } else if self.match_timer <= self.settings.join_cutoff_secs {
            ParticipantState::ForcedSpectator
        } else {
            ParticipantState::Active
        };

        let spawn = self.arena.safe_spawn(&mut self.rng);
        let color = self.colors.acquire(&mut self.rng);
        let player = Player::new(id, name, color, spawn, state, self.now_ms);
        let entry = player_entry(&player);

        info!(
            conn_id = %id,
            name = %player.name,
            state = ?state,
            player_count = self.players.len() + 1,
            "Player joined arena"
        );
        self.players.insert(id, player);

        if let Some(init) = self.init_msg(id) {
            self.events.push(Outbound::Direct(id, init));
        }
        self.events
            .push(Outbound::Broadcast(ServerMsg::PlayerJoined { player: entry }));

        if state == ParticipantState::Active {
            self.arm_special_gate();
        }
        Ok(())
    }

    /// Everything a client needs to draw the arena from scratch
    fn init_msg(&self, id: PlayerId) -> Option<ServerMsg> {
        let player = self.players.get(&id)?;
        Some(ServerMsg::Init {
            id,
            name: player.name.clone(),
            color: player.color.clone(),
            map_size: self.arena.size,
            walls: self.arena.walls.clone(),
            x: player.x,
            y: player.y,
            forced_spectator: player.state == ParticipantState::ForcedSpectator,
            waiting_for_rematch: player.state == ParticipantState::WaitingForRematch,
            match_timer: self.match_timer,
            match_phase: self.phase,
            roster: self.roster(),
        })
    }

    /// Resend the map, and for a joined player its `init`, to a connection
    /// that lagged behind the broadcast channel
    pub fn resync(&mut self, id: PlayerId) {
        debug!(conn_id = %id, "Resyncing lagged connection");
        self.events.push(Outbound::Direct(
            id,
            ServerMsg::MapUpdate {
                walls: self.arena.walls.clone(),
            },
        ));
        if let Some(init) = self.init_msg(id) {
            self.events.push(Outbound::Direct(id, init));
        }
    }

    /// Remove a player and give back its color
    pub fn leave(&mut self, id: PlayerId) {
        let Some(player) = self.players.remove(&id) else {
            return;
        };
        self.colors.release(&player.color);
        self.events.push(Outbound::Broadcast(ServerMsg::PlayerLeft { id }));
        info!(
            conn_id = %id,
            name = %player.name,
            player_count = self.players.len(),
            "Player left arena"
        );
    }

    /// Bring a spectating or finished player back into the fight
    pub fn rematch(&mut self, id: PlayerId) {
        let Some(player) = self.players.get(&id) else {
            return;
        };
        if self.phase == MatchPhase::Running && player.is_active() {
            self.events.push(Outbound::Direct(
                id,
                ServerMsg::RematchDenied {
                    reason: "Match already in progress.".to_string(),
                },
            ));
            return;
        }

        self.maybe_reset();

        let spawn = self.arena.safe_spawn(&mut self.rng);
        let now = self.now_ms;
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        player.reenter(spawn, now);
        debug!(conn_id = %id, "Rematch accepted");

        self.events.push(Outbound::Direct(
            id,
            ServerMsg::RematchAccepted {
                x: spawn.0,
                y: spawn.1,
                match_timer: self.match_timer,
                match_phase: self.phase,
            },
        ));
        self.arm_special_gate();
    }

    /// Reset if the match ended and nobody has consumed the latch yet
    pub fn maybe_reset(&mut self) -> bool {
        if self.phase == MatchPhase::Ended && self.reset_pending {
            self.reset();
            return true;
        }
        false
    }

    /// Fresh walls, full resources for everyone in play and a new timer
    pub fn reset(&mut self) {
        let now = self.now_ms;
        self.reset_pending = false;
        self.match_timer = self.settings.match_duration_secs;
        self.bullets.clear();
        self.bullet_accumulator = 0.0;
        self.bot_accumulator = 0.0;
        self.arena = Arena::generate(&mut self.rng, self.settings.wall_count);

        let returning: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| {
                matches!(
                    p.state,
                    ParticipantState::Active | ParticipantState::WaitingForRematch
                )
            })
            .map(|p| p.id)
            .collect();
        for id in returning {
            let spawn = self.arena.safe_spawn(&mut self.rng);
            if let Some(player) = self.players.get_mut(&id) {
                player.reenter(spawn, now);
            }
        }

        for kind in BotKind::SPECIALS {
            self.bots.remove(&kind);
        }
        let spawn = self.bot_spawn_point();
        self.bots
            .entry(BotKind::Bobby)
            .or_insert_with(|| Bot::new(BotKind::Bobby, spawn, 0.0, now))
            .reset_at(spawn, now);

        self.phase = MatchPhase::Running;
        self.special_gate = SpecialGate::Idle;
        if self.has_active() {
            self.arm_special_gate();
        }

        info!(walls = self.arena.walls.len(), players = self.players.len(), "Match reset");
        self.events.push(Outbound::Broadcast(ServerMsg::MapUpdate {
            walls: self.arena.walls.clone(),
        }));
        self.events.push(Outbound::Broadcast(ServerMsg::MatchReset {
            match_timer: self.match_timer,
            match_phase: self.phase,
        }));
    }

    /// Clear the special bots and schedule a fresh roll
    fn arm_special_gate(&mut self) {
        if self.special_gate != SpecialGate::Idle {
            return;
        }
        for kind in BotKind::SPECIALS {
            self.bots.remove(&kind);
        }
        self.special_gate = SpecialGate::Pending {
            at: self.now_ms + SPECIAL_BOT_DELAY_MS,
        };
    }

    fn step_special_gate(&mut self) {
        let SpecialGate::Pending { at } = self.special_gate else {
            return;
        };
        if self.now_ms < at {
            return;
        }
        if self.phase != MatchPhase::Running || !self.has_active() {
            self.special_gate = SpecialGate::Idle;
            return;
        }

        self.special_gate = SpecialGate::Fired;
        for kind in BotKind::SPECIALS {
            if self.bots.contains_key(&kind) || !self.rng.gen_bool(kind.profile().spawn_chance) {
                continue;
            }
            let spawn = self.bot_spawn_point();
            let wander = self.rng.gen_range(0.0..TAU);
            self.bots
                .insert(kind, Bot::new(kind, spawn, wander, self.now_ms));
            info!(bot = kind.id(), "Bot spawned");
            self.events.push(Outbound::Broadcast(ServerMsg::BotSpawned {
                bot: bot_entry(kind),
                message: format!("{} has entered the arena!", kind.name()),
            }));
        }
    }

    /// One simulation tick of `dt` seconds at the current clock
    pub fn tick(&mut self, dt: f32) {
        self.step_timer(dt);
        self.step_players(dt);
        self.step_bots(dt);
        self.step_bullets(dt);
        self.step_special_gate();
        self.sanitize_entities();
    }

    fn step_timer(&mut self, dt: f32) {
        if self.phase != MatchPhase::Running {
            return;
        }
        if self.has_active() {
            self.match_timer = (self.match_timer - dt).max(0.0);
        } else if self.match_timer > 0.0 {
            debug!("No fighters left, ending match early");
            self.match_timer = 0.0;
        }

        if self.match_timer <= 0.0 {
            self.phase = MatchPhase::Ended;
            self.reset_pending = true;
            info!(players = self.players.len(), "Match ended");
        }
    }

    fn step_players(&mut self, dt: f32) {
        let now = self.now_ms;
        for player in self.players.values_mut() {
            PhysicsSystem::step_player(player, &self.arena, dt, now);
        }
    }

    fn step_bots(&mut self, dt: f32) {
        let step = 1.0 / BOT_TPS as f32;
        self.bot_accumulator += dt;
        while self.bot_accumulator >= step {
            self.bot_accumulator -= step;
            self.bot_sub_step();
        }
    }

    fn bot_sub_step(&mut self) {
        let targets = self.active_positions();
        let now = self.now_ms;
        let kinds: Vec<BotKind> = self.bots.keys().copied().collect();

        for kind in kinds {
            let shots = match self.bots.get_mut(&kind) {
                Some(bot) if bot.is_alive() => {
                    let ctx = BotContext {
                        arena: &self.arena,
                        targets: &targets,
                        now,
                        live_bullets: self.bullets.len(),
                    };
                    bot.think(&ctx, &mut self.rng)
                }
                _ => continue,
            };
            for shot in shots {
                self.spawn_bullet(Owner::Bot(kind), shot.x, shot.y, shot.angle, shot.speed);
            }
        }
    }

    /// Respawn anything whose position stopped being a number
    fn sanitize_entities(&mut self) {
        self.sanitize_bullets();

        let broken: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| !p.x.is_finite() || !p.y.is_finite() || !p.angle.is_finite())
            .map(|p| p.id)
            .collect();
        for id in broken {
            let spawn = self.arena.safe_spawn(&mut self.rng);
            let now = self.now_ms;
            if let Some(player) = self.players.get_mut(&id) {
                warn!(conn_id = %id, "Player position became non-finite, respawning");
                player.x = spawn.0;
                player.y = spawn.1;
                player.angle = 0.0;
                if player.is_active() {
                    player.respawn_at(spawn, now);
                }
            }
        }

        let broken: Vec<BotKind> = self
            .bots
            .values()
            .filter(|b| !b.x.is_finite() || !b.y.is_finite() || !b.wander_angle.is_finite())
            .map(|b| b.kind)
            .collect();
        for kind in broken {
            let spawn = self.bot_spawn_point();
            let now = self.now_ms;
            if let Some(bot) = self.bots.get_mut(&kind) {
                warn!(bot = kind.id(), "Bot position became non-finite, respawning");
                bot.respawn_at(spawn, now);
                bot.wander_angle = 0.0;
                bot.angle = 0.0;
            }
        }
    }
}

fn player_entry(player: &Player) -> RosterEntry {
    RosterEntry {
        id: player.id.to_string(),
        name: player.name.clone(),
        color: player.color.clone(),
        bot: false,
    }
}

fn bot_entry(kind: BotKind) -> RosterEntry {
    RosterEntry {
        id: kind.id().to_string(),
        name: kind.name().to_string(),
        color: kind.color().to_string(),
        bot: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{BotState, STARTING_LIVES};
    use crate::game::geometry::{SPAWN_BUFFER, WALL_COUNT};
    use uuid::Uuid;

    const NOW: u64 = 5_000_000;
    const DT: f32 = 1.0 / 30.0;

    fn world() -> World {
        World::new(&GameSettings::default(), 7, NOW)
    }

    fn direct_to(world: &World, id: PlayerId) -> Vec<&ServerMsg> {
        world
            .events
            .iter()
            .filter_map(|e| match e {
                Outbound::Direct(to, msg) if *to == id => Some(msg),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_world_has_bobby_and_walls() {
        let world = world();
        assert_eq!(world.phase, MatchPhase::Running);
        assert_eq!(world.match_timer, 900.0);
        assert!(world.bots.contains_key(&BotKind::Bobby));
        assert_eq!(world.bots.len(), 1);
        assert!(!world.arena.walls.is_empty() && world.arena.walls.len() <= WALL_COUNT);
    }

    #[test]
    fn test_join_spawns_clear_of_walls() {
        let mut world = world();
        let id = Uuid::new_v4();
        world.join(id, "Sniper".to_string()).unwrap();

        let p = &world.players[&id];
        assert!(p.is_active());
        assert!(!world.arena.collides_with_wall(p.x, p.y, SPAWN_BUFFER));
        assert!(matches!(
            direct_to(&world, id).first(),
            Some(ServerMsg::Init { forced_spectator: false, waiting_for_rematch: false, roster, .. })
                if roster.len() == 2
        ));
        assert!(world.events.iter().any(|e| matches!(
            e,
            Outbound::Broadcast(ServerMsg::PlayerJoined { player }) if player.name == "Sniper"
        )));
    }

    #[test]
    fn test_join_rejections() {
        let settings = GameSettings {
            max_players: 2,
            ..GameSettings::default()
        };
        let mut world = World::new(&settings, 1, NOW);
        let a = Uuid::new_v4();
        world.join(a, "A".to_string()).unwrap();
        assert_eq!(world.join(a, "A".to_string()), Err(JoinRejection::AlreadyJoined));
        world.join(Uuid::new_v4(), "B".to_string()).unwrap();

        let late = Uuid::new_v4();
        world.apply(PlayerInput {
            conn_id: late,
            intent: Intent::Join { name: "C".to_string() },
            received_at: NOW,
        });
        assert_eq!(world.players.len(), 2);
        assert!(matches!(
            direct_to(&world, late).as_slice(),
            [ServerMsg::ErrorMsg { message }] if message == "Match is full."
        ));
    }

    #[test]
    fn test_timer_decays_only_with_fighters() {
        let mut world = world();
        let id = Uuid::new_v4();
        world.join(id, "A".to_string()).unwrap();

        world.tick(DT);
        assert!((world.match_timer - (900.0 - DT)).abs() < 1e-3);

        world.players.get_mut(&id).unwrap().state = ParticipantState::Spectating;
        world.tick(DT);
        assert_eq!(world.match_timer, 0.0);
        assert_eq!(world.phase, MatchPhase::Ended);
        assert!(world.reset_pending);

        world.tick(DT);
        assert_eq!(world.match_timer, 0.0);
    }

    #[test]
    fn test_empty_world_ends_and_first_join_resets() {
        let mut world = world();
        world.tick(DT);
        assert_eq!(world.phase, MatchPhase::Ended);

        let old_walls = world.arena.walls.clone();
        let id = Uuid::new_v4();
        world.join(id, "A".to_string()).unwrap();

        assert_eq!(world.phase, MatchPhase::Running);
        assert_eq!(world.match_timer, 900.0);
        assert!(!world.reset_pending);
        assert_ne!(world.arena.walls, old_walls);
        assert!(world.players[&id].is_active());
        assert!(world
            .events
            .iter()
            .any(|e| matches!(e, Outbound::Broadcast(ServerMsg::MatchReset { .. }))));
    }

    #[test]
    fn test_spectator_rematch_resets_finished_match() {
        let mut world = world();
        let fighter = Uuid::new_v4();
        let ghost = Uuid::new_v4();
        world.join(fighter, "A".to_string()).unwrap();
        world.join(ghost, "B".to_string()).unwrap();
        {
            let g = world.players.get_mut(&ghost).unwrap();
            g.state = ParticipantState::Spectating;
            g.lives = 0;
            g.hp = 0.0;
        }
        world.players.get_mut(&fighter).unwrap().score = 12;
        world.bullets.insert(
            99,
            Bullet {
                id: 99,
                owner: Owner::Player(fighter),
                x: 10.0,
                y: 10.0,
                angle: 0.0,
                speed: 1.0,
                born_ms: NOW,
            },
        );
        world.match_timer = 0.01;
        world.tick(DT);
        assert_eq!(world.phase, MatchPhase::Ended);

        let old_walls = world.arena.walls.clone();
        world.drain_events();
        world.rematch(ghost);

        assert_eq!(world.phase, MatchPhase::Running);
        assert_eq!(world.match_timer, 900.0);
        assert_ne!(world.arena.walls, old_walls);
        assert!(world.bullets.is_empty());

        let g = &world.players[&ghost];
        assert!(g.is_active());
        assert_eq!(g.lives, STARTING_LIVES);
        assert_eq!(world.players[&fighter].score, 0);
        assert!(matches!(
            direct_to(&world, ghost).as_slice(),
            [ServerMsg::RematchAccepted { match_phase: MatchPhase::Running, .. }]
        ));
    }

    #[test]
    fn test_rematch_denied_while_fighting() {
        let mut world = world();
        let id = Uuid::new_v4();
        world.join(id, "A".to_string()).unwrap();
        world.drain_events();

        world.rematch(id);
        assert!(matches!(
            direct_to(&world, id).as_slice(),
            [ServerMsg::RematchDenied { reason }] if reason == "Match already in progress."
        ));
    }

    #[test]
    fn test_late_join_is_forced_spectator() {
        let mut world = world();
        let first = Uuid::new_v4();
        world.join(first, "A".to_string()).unwrap();
        world.match_timer = 300.0;

        let late = Uuid::new_v4();
        world.join(late, "B".to_string()).unwrap();
        let p = &world.players[&late];
        assert_eq!(p.state, ParticipantState::ForcedSpectator);
        assert!(matches!(
            direct_to(&world, late).first(),
            Some(ServerMsg::Init { forced_spectator: true, .. })
        ));

        // Ghosts cannot shoot
        world.now_ms += 1000;
        world.fire_player(late, Some(0.0));
        assert!(world.bullets.is_empty());
    }

    #[test]
    fn test_join_after_end_without_latch_waits() {
        let mut world = world();
        world.phase = MatchPhase::Ended;
        world.reset_pending = false;

        let id = Uuid::new_v4();
        world.join(id, "A".to_string()).unwrap();
        assert_eq!(world.players[&id].state, ParticipantState::WaitingForRematch);

        world.phase = MatchPhase::Ended;
        world.reset_pending = true;
        world.reset();
        assert!(world.players[&id].is_active());
    }

    #[test]
    fn test_resync_resends_map_and_init_after_reset() {
        let mut world = world();
        let id = Uuid::new_v4();
        world.join(id, "A".to_string()).unwrap();
        world.phase = MatchPhase::Ended;
        world.reset_pending = true;
        world.reset();
        world.drain_events();

        world.apply(PlayerInput {
            conn_id: id,
            intent: Intent::Resync,
            received_at: NOW,
        });

        let walls = world.arena.walls.clone();
        let (x, y) = (world.players[&id].x, world.players[&id].y);
        match direct_to(&world, id).as_slice() {
            [ServerMsg::MapUpdate { walls: map }, ServerMsg::Init { walls: init_walls, x: ix, y: iy, roster, match_phase, .. }] =>
            {
                assert_eq!(map, &walls);
                assert_eq!(init_walls, &walls);
                assert_eq!((*ix, *iy), (x, y));
                assert_eq!(*match_phase, MatchPhase::Running);
                assert!(roster.iter().any(|r| r.name == "A"));
            }
            other => panic!("unexpected resync {other:?}"),
        }

        // Not joined yet: only the map
        let stranger = Uuid::new_v4();
        world.resync(stranger);
        assert!(matches!(
            direct_to(&world, stranger).as_slice(),
            [ServerMsg::MapUpdate { .. }]
        ));
    }

    #[test]
    fn test_leave_releases_color() {
        let mut world = world();
        let id = Uuid::new_v4();
        world.join(id, "A".to_string()).unwrap();
        assert_eq!(world.colors.in_use(), 1);

        world.apply(PlayerInput {
            conn_id: id,
            intent: Intent::Disconnect,
            received_at: NOW,
        });
        assert!(world.players.is_empty());
        assert_eq!(world.colors.in_use(), 0);
        assert!(world
            .events
            .iter()
            .any(|e| matches!(e, Outbound::Broadcast(ServerMsg::PlayerLeft { id: left }) if *left == id)));
    }

    #[test]
    fn test_input_is_sanitized_against_current_aim() {
        let mut world = world();
        let id = Uuid::new_v4();
        world.join(id, "A".to_string()).unwrap();
        world.apply(PlayerInput {
            conn_id: id,
            intent: Intent::Input {
                move_x: Some(3.0),
                move_y: None,
                sprint: true,
                angle: Some(1.0),
            },
            received_at: NOW,
        });
        world.apply(PlayerInput {
            conn_id: id,
            intent: Intent::Input {
                move_x: Some(f32::NAN),
                move_y: Some(-0.5),
                sprint: false,
                angle: Some(f32::INFINITY),
            },
            received_at: NOW,
        });
        let input = world.players[&id].input;
        assert_eq!(input.move_x, 0.0);
        assert_eq!(input.move_y, -0.5);
        assert_eq!(input.angle, 1.0);
    }

    #[test]
    fn test_special_gate_fires_after_delay() {
        let mut world = world();
        world.join(Uuid::new_v4(), "A".to_string()).unwrap();
        assert_eq!(
            world.special_gate,
            SpecialGate::Pending { at: NOW + SPECIAL_BOT_DELAY_MS }
        );

        world.set_clock(NOW + SPECIAL_BOT_DELAY_MS - 1);
        world.tick(DT);
        assert!(matches!(world.special_gate, SpecialGate::Pending { .. }));

        world.set_clock(NOW + SPECIAL_BOT_DELAY_MS);
        world.tick(DT);
        assert_eq!(world.special_gate, SpecialGate::Fired);

        let spawned = world
            .events
            .iter()
            .filter(|e| matches!(e, Outbound::Broadcast(ServerMsg::BotSpawned { .. })))
            .count();
        assert_eq!(spawned, world.bots.len() - 1);
    }

    #[test]
    fn test_reset_restores_retired_bobby() {
        let mut world = world();
        world.retire_bot(BotKind::Bobby);
        assert_eq!(world.bots[&BotKind::Bobby].state, BotState::Retired);
        assert_eq!(world.live_bot_count(), 0);

        world.phase = MatchPhase::Ended;
        world.reset_pending = true;
        assert!(world.maybe_reset());
        assert!(world.bots[&BotKind::Bobby].is_alive());
        assert!(!world.maybe_reset());
    }

    #[test]
    fn test_non_finite_positions_are_repaired() {
        let mut world = world();
        let id = Uuid::new_v4();
        world.join(id, "A".to_string()).unwrap();
        world.players.get_mut(&id).unwrap().x = f32::NAN;
        world.bots.get_mut(&BotKind::Bobby).unwrap().y = f32::INFINITY;

        world.tick(DT);

        let p = &world.players[&id];
        assert!(p.x.is_finite() && p.y.is_finite());
        let b = &world.bots[&BotKind::Bobby];
        assert!(b.x.is_finite() && b.y.is_finite());
    }
}
