//! Snapshot building and adaptive send rate

use crate::util::time::{SNAPSHOT_ACTIVE_INTERVAL_MS, SNAPSHOT_IDLE_INTERVAL_MS};
use crate::ws::protocol::{BotSnapshot, BulletSnapshot, PlayerSnapshot, ServerMsg, WorldSnapshot};

use super::world::World;

/// Builds snapshots for network transmission
pub struct SnapshotBuilder {
    /// Clock value of the last snapshot sent
    last_sent_ms: Option<u64>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self { last_sent_ms: None }
    }

    /// Interval between snapshots for the current activity level
    pub fn interval_ms(active: bool) -> u64 {
        if active {
            SNAPSHOT_ACTIVE_INTERVAL_MS
        } else {
            SNAPSHOT_IDLE_INTERVAL_MS
        }
    }

    /// Check if it's time to send a snapshot, and mark it sent if so
    pub fn should_send(&mut self, now: u64, active: bool) -> bool {
        let due = match self.last_sent_ms {
            None => true,
            Some(last) => now.saturating_sub(last) >= Self::interval_ms(active),
        };
        if due {
            self.last_sent_ms = Some(now);
        }
        due
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.last_sent_ms = None;
    }

    /// Reduced view of the world: positions and gauges only
    pub fn build(&self, world: &World) -> ServerMsg {
        let now = world.now_ms;

        let players = world
            .players
            .values()
            .map(|p| PlayerSnapshot {
                id: p.id,
                x: p.x,
                y: p.y,
                angle: p.angle,
                hp: p.hp,
                lives: p.lives,
                score: p.score,
                stamina: p.stamina,
                state: p.state,
                protected: p.is_protected(now),
            })
            .collect();

        let bots = world
            .bots
            .values()
            .map(|b| BotSnapshot {
                id: b.kind.id().to_string(),
                x: b.x,
                y: b.y,
                angle: b.angle,
                hp: b.hp,
                score: b.score,
                state: b.state,
                retreating: b.retreating,
            })
            .collect();

        let bullets = world
            .bullets
            .values()
            .map(|b| BulletSnapshot {
                id: b.id,
                x: b.x,
                y: b.y,
                angle: b.angle,
            })
            .collect();

        ServerMsg::State(WorldSnapshot {
            players,
            bots,
            bullets,
            match_timer: world.match_timer,
            match_phase: world.phase,
        })
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
