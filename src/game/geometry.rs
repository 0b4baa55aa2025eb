//! Arena geometry - walls, collision queries, spawn sampling

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Side length of the square arena
pub const MAP_SIZE: f32 = 2000.0;
/// Collision radius shared by players and bots
pub const ENTITY_RADIUS: f32 = 18.0;
/// Bullet collision radius against walls
pub const BULLET_RADIUS: f32 = 4.0;

/// Default number of walls per match
pub const WALL_COUNT: usize = 12;
const WALL_MIN_SIZE: f32 = 150.0;
const WALL_SIZE_RANGE: f32 = 200.0;
const WALL_MARGIN: f32 = 100.0;
/// Padding kept free between any two walls
pub const MIN_CORRIDOR_WIDTH: f32 = 120.0;
const MAX_WALL_ATTEMPTS: u32 = 500;

/// Clearance used when sampling player spawns
pub const SPAWN_BUFFER: f32 = 50.0;
const SPAWN_ATTEMPTS: u32 = 100;

const BOT_SPAWN_MARGIN: f32 = 100.0;
pub const BOT_SPAWN_CLEARANCE: f32 = 40.0;
/// Bots never spawn closer than this to a fighting player (best effort)
pub const BOT_MIN_PLAYER_DISTANCE: f32 = 300.0;

/// Axis-aligned wall rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Wall {
    /// True if the rectangles overlap once `other` is grown by `padding`
    pub fn intersects(&self, other: &Wall, padding: f32) -> bool {
        self.x < other.x + other.w + padding
            && self.x + self.w + padding > other.x
            && self.y < other.y + other.h + padding
            && self.y + self.h + padding > other.y
    }

    /// True if a circle-ish point of `radius` overlaps the rectangle
    pub fn overlaps_point(&self, x: f32, y: f32, radius: f32) -> bool {
        x + radius > self.x
            && x - radius < self.x + self.w
            && y + radius > self.y
            && y - radius < self.y + self.h
    }
}

/// Sample up to `count` walls that keep a corridor between each other.
/// Returns fewer walls when the attempt budget runs out.
pub fn generate_walls<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Wall> {
    let mut walls: Vec<Wall> = Vec::with_capacity(count);
    let mut attempts = 0;

    while walls.len() < count && attempts < MAX_WALL_ATTEMPTS {
        attempts += 1;
        let w = WALL_MIN_SIZE + rng.gen::<f32>() * WALL_SIZE_RANGE;
        let h = WALL_MIN_SIZE + rng.gen::<f32>() * WALL_SIZE_RANGE;
        let x = WALL_MARGIN + rng.gen::<f32>() * (MAP_SIZE - w - WALL_MARGIN * 2.0);
        let y = WALL_MARGIN + rng.gen::<f32>() * (MAP_SIZE - h - WALL_MARGIN * 2.0);
        let candidate = Wall { x, y, w, h };

        if !walls
            .iter()
            .any(|existing| candidate.intersects(existing, MIN_CORRIDOR_WIDTH))
        {
            walls.push(candidate);
        }
    }

    walls
}

/// Static arena layout for one match
#[derive(Debug, Clone)]
pub struct Arena {
    pub size: f32,
    pub walls: Vec<Wall>,
}

impl Arena {
    pub fn new(walls: Vec<Wall>) -> Self {
        Self {
            size: MAP_SIZE,
            walls,
        }
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R, wall_count: usize) -> Self {
        Self::new(generate_walls(rng, wall_count))
    }

    /// True if the padded point leaves the arena or touches any wall
    pub fn collides_with_wall(&self, x: f32, y: f32, radius: f32) -> bool {
        if x < radius || y < radius || x > self.size - radius || y > self.size - radius {
            return true;
        }
        self.walls.iter().any(|w| w.overlaps_point(x, y, radius))
    }

    /// True if the point is outside the arena square
    pub fn out_of_bounds(&self, x: f32, y: f32) -> bool {
        x < 0.0 || x > self.size || y < 0.0 || y > self.size
    }

    /// Rejection-sample a wall-free player spawn. Falls back to the last
    /// sample when the budget runs out.
    pub fn safe_spawn<R: Rng + ?Sized>(&self, rng: &mut R) -> (f32, f32) {
        let span = self.size - SPAWN_BUFFER * 2.0;
        let mut point = (0.0, 0.0);

        for _ in 0..SPAWN_ATTEMPTS {
            point = (
                SPAWN_BUFFER + rng.gen::<f32>() * span,
                SPAWN_BUFFER + rng.gen::<f32>() * span,
            );
            if !self.collides_with_wall(point.0, point.1, SPAWN_BUFFER) {
                break;
            }
        }

        point
    }

    /// Rejection-sample a bot spawn away from walls and from every position in
    /// `players`. Falls back to the last sample when the budget runs out.
    pub fn bot_safe_spawn<R: Rng + ?Sized>(&self, rng: &mut R, players: &[(f32, f32)]) -> (f32, f32) {
        let span = self.size - BOT_SPAWN_MARGIN * 2.0;
        let mut point = (0.0, 0.0);

        for _ in 0..SPAWN_ATTEMPTS {
            point = (
                BOT_SPAWN_MARGIN + rng.gen::<f32>() * span,
                BOT_SPAWN_MARGIN + rng.gen::<f32>() * span,
            );
            let too_close = players.iter().any(|&(px, py)| {
                (px - point.0).hypot(py - point.1) < BOT_MIN_PLAYER_DISTANCE
            });
            if !too_close && !self.collides_with_wall(point.0, point.1, BOT_SPAWN_CLEARANCE) {
                break;
            }
        }

        point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_generated_walls_keep_corridor() {
        for seed in 0..40 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let walls = generate_walls(&mut rng, WALL_COUNT);
            assert!(!walls.is_empty());
            assert!(walls.len() <= WALL_COUNT);

            for (i, a) in walls.iter().enumerate() {
                for b in walls.iter().skip(i + 1) {
                    assert!(!a.intersects(b, MIN_CORRIDOR_WIDTH), "seed {seed}: {a:?} vs {b:?}");
                }
                assert!(a.x >= WALL_MARGIN && a.x + a.w <= MAP_SIZE - WALL_MARGIN + 0.01);
                assert!(a.y >= WALL_MARGIN && a.y + a.h <= MAP_SIZE - WALL_MARGIN + 0.01);
            }
        }
    }

    #[test]
    fn test_generation_gives_up_when_space_runs_out() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let walls = generate_walls(&mut rng, 500);
        assert!(walls.len() < 500);
    }

    #[test]
    fn test_collides_with_bounds_and_walls() {
        let arena = Arena::new(vec![Wall { x: 500.0, y: 500.0, w: 200.0, h: 200.0 }]);

        assert!(arena.collides_with_wall(10.0, 1000.0, ENTITY_RADIUS));
        assert!(arena.collides_with_wall(1000.0, MAP_SIZE - 5.0, ENTITY_RADIUS));
        assert!(arena.collides_with_wall(490.0, 600.0, ENTITY_RADIUS));
        assert!(!arena.collides_with_wall(470.0, 600.0, ENTITY_RADIUS));
        assert!(!arena.collides_with_wall(1000.0, 1000.0, ENTITY_RADIUS));
    }

    #[test]
    fn test_safe_spawn_is_clear() {
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let arena = Arena::generate(&mut rng, WALL_COUNT);
            let (x, y) = arena.safe_spawn(&mut rng);
            assert!(!arena.collides_with_wall(x, y, SPAWN_BUFFER));
        }
    }

    #[test]
    fn test_safe_spawn_falls_back_when_blocked() {
        // One wall covering the whole interior leaves no valid point
        let arena = Arena::new(vec![Wall { x: 0.0, y: 0.0, w: MAP_SIZE, h: MAP_SIZE }]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (x, y) = arena.safe_spawn(&mut rng);
        assert!(x >= SPAWN_BUFFER && x <= MAP_SIZE - SPAWN_BUFFER);
        assert!(y >= SPAWN_BUFFER && y <= MAP_SIZE - SPAWN_BUFFER);
    }

    #[test]
    fn test_bot_spawn_keeps_distance_from_players() {
        let arena = Arena::new(Vec::new());
        let players = [(1000.0, 1000.0), (400.0, 400.0)];
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (x, y) = arena.bot_safe_spawn(&mut rng, &players);
            for (px, py) in players {
                assert!((px - x).hypot(py - y) >= BOT_MIN_PLAYER_DISTANCE);
            }
        }
    }
}
