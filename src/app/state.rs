//! Application state shared across routes

use std::sync::Arc;

use rand::random;
use tracing::info;

use crate::config::Config;
use crate::game::{GameMatch, MatchHandle};
use crate::ws::session::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The single arena every connection plays in
    pub arena: MatchHandle,
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Build the state and the arena task that still has to be spawned
    pub fn new(config: Config) -> (Self, GameMatch) {
        let config = Arc::new(config);
        let sessions = SessionRegistry::new();

        let seed = config.game.world_seed.unwrap_or_else(random);
        info!(seed = seed, "Creating arena");
        let (game_match, arena) = GameMatch::new(&config.game, seed, sessions.clone());

        let state = Self {
            config,
            arena,
            sessions,
        };
        (state, game_match)
    }
}
