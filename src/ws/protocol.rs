//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entity::{BotState, ParticipantState};
use crate::game::geometry::Wall;
use crate::game::MatchPhase;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Request to enter the arena
    JoinGame {
        /// Desired display name; a generated one is used when absent
        #[serde(default)]
        name: Option<String>,
    },

    /// Latest movement and aim intent
    Input {
        #[serde(default)]
        move_x: Option<f32>,
        #[serde(default)]
        move_y: Option<f32>,
        #[serde(default)]
        sprint: bool,
        #[serde(default)]
        angle: Option<f32>,
    },

    /// Shoot once; the current facing is used without an angle
    Fire {
        #[serde(default)]
        angle: Option<f32>,
    },

    /// Ask to play again
    Rematch,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent to a connection after a successful join, and again when it
    /// fell behind the broadcast stream
    Init {
        id: Uuid,
        name: String,
        color: String,
        map_size: f32,
        walls: Vec<Wall>,
        x: f32,
        y: f32,
        forced_spectator: bool,
        waiting_for_rematch: bool,
        match_timer: f32,
        match_phase: MatchPhase,
        /// Everyone currently in the arena, bots included
        roster: Vec<RosterEntry>,
    },

    /// Periodic world snapshot
    State(WorldSnapshot),

    KillEvent {
        shooter: String,
        victim: String,
    },

    /// The receiving player came back after losing a life
    Respawned {
        x: f32,
        y: f32,
    },

    BotSpawned {
        bot: RosterEntry,
        message: String,
    },

    BotRetired {
        id: String,
        message: String,
    },

    PlayerJoined {
        player: RosterEntry,
    },

    PlayerLeft {
        id: Uuid,
    },

    /// Fresh walls after a match reset
    MapUpdate {
        walls: Vec<Wall>,
    },

    MatchReset {
        match_timer: f32,
        match_phase: MatchPhase,
    },

    RematchAccepted {
        x: f32,
        y: f32,
        match_timer: f32,
        match_phase: MatchPhase,
    },

    RematchDenied {
        reason: String,
    },

    ErrorMsg {
        message: String,
    },
}

/// Identity that is sent once instead of in every snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub color: String,
    pub bot: bool,
}

/// Reduced world view broadcast to every connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub bots: Vec<BotSnapshot>,
    pub bullets: Vec<BulletSnapshot>,
    pub match_timer: f32,
    pub match_phase: MatchPhase,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub hp: f32,
    pub lives: u32,
    pub score: u32,
    pub stamina: f32,
    pub state: ParticipantState,
    /// Spawn protection still running
    pub protected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSnapshot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub hp: f32,
    pub score: u32,
    pub state: BotState,
    pub retreating: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletSnapshot {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}
