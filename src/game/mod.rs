//! Game simulation modules

pub mod bot;
pub mod combat;
pub mod entity;
pub mod geometry;
pub mod r#match;
pub mod physics;
pub mod snapshot;
pub mod world;

pub use r#match::{GameMatch, MatchHandle};
pub use world::{MatchPhase, World};

use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Intent received from the session gateway, already validated
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub conn_id: Uuid,
    pub intent: Intent,
    pub received_at: u64,
}

#[derive(Debug, Clone)]
pub enum Intent {
    /// Join with a cleaned, moderated display name
    Join { name: String },
    /// Raw movement values, sanitized against the player's current aim
    Input {
        move_x: Option<f32>,
        move_y: Option<f32>,
        sprint: bool,
        angle: Option<f32>,
    },
    Fire { angle: Option<f32> },
    Rematch,
    /// The connection missed broadcasts and needs the map and roster again
    Resync,
    Disconnect,
}

/// Latest movement/aim intent of a player
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputIntent {
    pub move_x: f32,
    pub move_y: f32,
    pub sprint: bool,
    pub angle: f32,
}

impl InputIntent {
    /// Clamp raw client values. Missing or non-finite movement becomes 0 and
    /// a bad angle keeps `fallback_angle`.
    pub fn sanitize(
        move_x: Option<f32>,
        move_y: Option<f32>,
        sprint: bool,
        angle: Option<f32>,
        fallback_angle: f32,
    ) -> Self {
        let axis = |v: Option<f32>| match v {
            Some(v) if v.is_finite() => v.clamp(-1.0, 1.0),
            _ => 0.0,
        };
        Self {
            move_x: axis(move_x),
            move_y: axis(move_y),
            sprint,
            angle: angle.filter(|a| a.is_finite()).unwrap_or(fallback_angle),
        }
    }
}

/// Event produced by the simulation, flushed to the gateway after each tick
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Fan out to every connection
    Broadcast(ServerMsg),
    /// Deliver to a single connection
    Direct(Uuid, ServerMsg),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_clamps_axes() {
        let input = InputIntent::sanitize(Some(4.0), Some(-9.0), true, Some(1.5), 0.0);
        assert_eq!(input.move_x, 1.0);
        assert_eq!(input.move_y, -1.0);
        assert!(input.sprint);
        assert_eq!(input.angle, 1.5);
    }

    #[test]
    fn test_sanitize_coerces_garbage() {
        let input = InputIntent::sanitize(Some(f32::NAN), None, false, Some(f32::INFINITY), 0.7);
        assert_eq!(input.move_x, 0.0);
        assert_eq!(input.move_y, 0.0);
        assert_eq!(input.angle, 0.7);
    }
}
