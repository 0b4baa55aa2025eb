//! Player movement and wall collision

use super::entity::{ParticipantState, Player, MAX_HEALTH, MAX_STAMINA};
use super::geometry::{Arena, ENTITY_RADIUS};

/// Movement speeds, in distance per 1/60 s
pub const BASE_SPEED: f32 = 4.6;
pub const SPRINT_SPEED: f32 = 6.8;
pub const SPECTATOR_SPEED: f32 = 15.0;

/// Ghost input below this magnitude per axis is ignored
const SPECTATOR_DEADZONE: f32 = 0.01;

/// Stamina change per tick
const STAMINA_DRAIN: f32 = 1.0;
const STAMINA_REGEN: f32 = 0.6;

/// Passive health regeneration
pub const REGEN_INTERVAL_MS: u64 = 3000;
pub const REGEN_AMOUNT: f32 = 5.0;

/// Speeds are tuned per 1/60 s frame
const FRAME_RATE: f32 = 60.0;

/// Physics system for updating player positions
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Advance one player by `dt` seconds against the arena
    pub fn step_player(player: &mut Player, arena: &Arena, dt: f32, now: u64) {
        if player.state == ParticipantState::WaitingForRematch {
            return;
        }

        let ghost = player.state.is_ghost();
        let input = player.input;

        if !ghost && now.saturating_sub(player.last_regen_ms) > REGEN_INTERVAL_MS {
            player.hp = (player.hp + REGEN_AMOUNT).min(MAX_HEALTH);
            player.last_regen_ms = now;
        }

        let speed = if ghost {
            SPECTATOR_SPEED
        } else if input.sprint && player.stamina > 0.0 {
            SPRINT_SPEED
        } else {
            BASE_SPEED
        };

        let mut dx = input.move_x;
        let mut dy = input.move_y;
        let moving = dx != 0.0 || dy != 0.0;

        if !ghost {
            player.stamina = if input.sprint && moving {
                (player.stamina - STAMINA_DRAIN).max(0.0)
            } else {
                (player.stamina + STAMINA_REGEN).min(MAX_STAMINA)
            };
        }

        let move_factor = dt * FRAME_RATE;

        if ghost {
            let sx = if dx.abs() > SPECTATOR_DEADZONE { dx } else { 0.0 };
            let sy = if dy.abs() > SPECTATOR_DEADZONE { dy } else { 0.0 };
            player.x = (player.x + sx * speed * move_factor).clamp(0.0, arena.size);
            player.y = (player.y + sy * speed * move_factor).clamp(0.0, arena.size);
            player.angle = input.angle;
            return;
        }

        if moving {
            let len = dx.hypot(dy);
            if len > 1.0 {
                dx /= len;
                dy /= len;
            }
            let (x, y) = Self::slide(
                arena,
                player.x,
                player.y,
                dx * speed * move_factor,
                dy * speed * move_factor,
                ENTITY_RADIUS,
            );
            player.x = x;
            player.y = y;
        }

        player.angle = input.angle;
    }

    /// Try the X and Y displacements independently so a diagonal approach
    /// slides along a wall instead of stopping
    pub fn slide(arena: &Arena, x: f32, y: f32, dx: f32, dy: f32, radius: f32) -> (f32, f32) {
        let mut new_x = x;
        let mut new_y = y;

        let nx = x + dx;
        if !arena.collides_with_wall(nx, new_y, radius) {
            new_x = nx;
        }

        let ny = y + dy;
        if !arena.collides_with_wall(new_x, ny, radius) {
            new_y = ny;
        }

        (new_x, new_y)
    }

    /// Move along `angle` by `distance` only if the destination is free.
    /// Returns false (and leaves the point alone) on collision.
    pub fn try_advance(
        arena: &Arena,
        x: &mut f32,
        y: &mut f32,
        angle: f32,
        distance: f32,
        radius: f32,
    ) -> bool {
        let nx = *x + angle.cos() * distance;
        let ny = *y + angle.sin() * distance;
        if arena.collides_with_wall(nx, ny, radius) {
            return false;
        }
        *x = nx;
        *y = ny;
        true
    }

    /// Cheap square pre-filter before the exact circle test
    pub fn within_box(x1: f32, y1: f32, x2: f32, y2: f32, half_extent: f32) -> bool {
        (x1 - x2).abs() <= half_extent && (y1 - y2).abs() <= half_extent
    }

    /// Circle overlap test (strict)
    pub fn within_radius(x1: f32, y1: f32, x2: f32, y2: f32, radius: f32) -> bool {
        let dx = x1 - x2;
        let dy = y1 - y2;
        dx * dx + dy * dy < radius * radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{ParticipantState, Player};
    use crate::game::geometry::{generate_walls, Wall, WALL_COUNT};
    use crate::game::InputIntent;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    const DT: f32 = 1.0 / 30.0;

    fn player_at(x: f32, y: f32) -> Player {
        Player::new(
            Uuid::new_v4(),
            "Tester".to_string(),
            "hsl(10,70%,50%)".to_string(),
            (x, y),
            ParticipantState::Active,
            0,
        )
    }

    fn with_input(player: &mut Player, move_x: f32, move_y: f32, sprint: bool) {
        player.input = InputIntent {
            move_x,
            move_y,
            sprint,
            angle: 0.25,
        };
    }

    #[test]
    fn test_diagonal_is_normalized() {
        let arena = Arena::new(Vec::new());
        let mut player = player_at(1000.0, 1000.0);
        with_input(&mut player, 1.0, 1.0, false);

        PhysicsSystem::step_player(&mut player, &arena, DT, 0);

        let moved = (player.x - 1000.0).hypot(player.y - 1000.0);
        assert!((moved - BASE_SPEED * DT * 60.0).abs() < 1e-3);
        assert_eq!(player.angle, 0.25);
    }

    #[test]
    fn test_slides_along_wall() {
        let arena = Arena::new(vec![Wall { x: 1000.0, y: 0.0, w: 100.0, h: 2000.0 }]);
        // Touching the wall's left face: X is blocked, Y is free
        let mut player = player_at(1000.0 - ENTITY_RADIUS - 1.0, 500.0);
        with_input(&mut player, 1.0, 1.0, false);

        PhysicsSystem::step_player(&mut player, &arena, DT, 0);

        assert_eq!(player.x, 1000.0 - ENTITY_RADIUS - 1.0);
        assert!(player.y > 500.0);
    }

    #[test]
    fn test_random_inputs_never_enter_walls() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let arena = Arena::new(generate_walls(&mut rng, WALL_COUNT));
        let spawn = arena.safe_spawn(&mut rng);
        let mut player = player_at(spawn.0, spawn.1);
        assert!(!arena.collides_with_wall(player.x, player.y, ENTITY_RADIUS));

        for tick in 0..3000u64 {
            let mx = rng.gen_range(-1.0..=1.0);
            let my = rng.gen_range(-1.0..=1.0);
            with_input(&mut player, mx, my, rng.gen_bool(0.5));
            PhysicsSystem::step_player(&mut player, &arena, DT, tick * 33);
            assert!(
                !arena.collides_with_wall(player.x, player.y, ENTITY_RADIUS),
                "entered a wall at tick {tick}: ({}, {})",
                player.x,
                player.y
            );
        }
    }

    #[test]
    fn test_stamina_drains_and_recovers() {
        let arena = Arena::new(Vec::new());
        let mut player = player_at(1000.0, 1000.0);

        with_input(&mut player, 1.0, 0.0, true);
        PhysicsSystem::step_player(&mut player, &arena, DT, 0);
        assert_eq!(player.stamina, MAX_STAMINA - STAMINA_DRAIN);

        // Sprint held without moving recovers
        with_input(&mut player, 0.0, 0.0, true);
        PhysicsSystem::step_player(&mut player, &arena, DT, 0);
        assert!((player.stamina - (MAX_STAMINA - STAMINA_DRAIN + STAMINA_REGEN)).abs() < 1e-4);

        player.stamina = 0.0;
        with_input(&mut player, 1.0, 0.0, true);
        let before = player.x;
        PhysicsSystem::step_player(&mut player, &arena, DT, 0);
        assert!((player.x - before - BASE_SPEED * DT * 60.0).abs() < 1e-3);
        assert_eq!(player.stamina, 0.0);
    }

    #[test]
    fn test_ghost_ignores_walls_and_deadzone() {
        let arena = Arena::new(vec![Wall { x: 1000.0, y: 900.0, w: 200.0, h: 200.0 }]);
        let mut player = player_at(990.0, 1000.0);
        player.state = ParticipantState::Spectating;
        with_input(&mut player, 1.0, 0.005, false);

        PhysicsSystem::step_player(&mut player, &arena, DT, 0);

        assert!((player.x - (990.0 + SPECTATOR_SPEED * DT * 60.0)).abs() < 1e-3);
        assert_eq!(player.y, 1000.0);
        assert_eq!(player.stamina, MAX_STAMINA);
    }

    #[test]
    fn test_regen_only_after_window() {
        let arena = Arena::new(Vec::new());
        let mut player = player_at(1000.0, 1000.0);
        player.hp = 50.0;

        PhysicsSystem::step_player(&mut player, &arena, DT, REGEN_INTERVAL_MS);
        assert_eq!(player.hp, 50.0);

        PhysicsSystem::step_player(&mut player, &arena, DT, REGEN_INTERVAL_MS + 1);
        assert_eq!(player.hp, 55.0);
        assert_eq!(player.last_regen_ms, REGEN_INTERVAL_MS + 1);
    }

    #[test]
    fn test_waiting_player_is_frozen() {
        let arena = Arena::new(Vec::new());
        let mut player = player_at(1000.0, 1000.0);
        player.state = ParticipantState::WaitingForRematch;
        with_input(&mut player, 1.0, 0.0, true);

        PhysicsSystem::step_player(&mut player, &arena, DT, 10_000);
        assert_eq!((player.x, player.y), (1000.0, 1000.0));
        assert_eq!(player.stamina, MAX_STAMINA);
    }
}
