//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines (LOG_FORMAT=json)
    pub log_json: bool,
    /// Directory holding the browser client
    pub static_dir: PathBuf,
    /// Allowed client origin for CORS; same-origin only when unset
    pub client_origin: Option<String>,
    /// Simulation tunables
    pub game: GameSettings,
}

/// Match tunables that operators may override
#[derive(Clone, Debug, PartialEq)]
pub struct GameSettings {
    pub max_players: usize,
    /// Length of a match in seconds
    pub match_duration_secs: f32,
    /// Joins with less time than this left become spectators
    pub join_cutoff_secs: f32,
    pub wall_count: usize,
    /// Fixed world seed; random when absent
    pub world_seed: Option<u64>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_players: 15,
            match_duration_secs: 900.0,
            join_cutoff_secs: 300.0,
            wall_count: crate::game::geometry::WALL_COUNT,
            world_seed: None,
        }
    }
}

impl GameSettings {
    /// Read overrides from the environment, keeping defaults for anything
    /// missing or invalid
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let settings = Self {
            max_players: parse_or("MAX_PLAYERS", defaults.max_players, |v| *v > 0),
            match_duration_secs: parse_or("MATCH_DURATION_SECS", defaults.match_duration_secs, |v| {
                v.is_finite() && *v > 0.0
            }),
            join_cutoff_secs: parse_or("JOIN_CUTOFF_SECS", defaults.join_cutoff_secs, |v| {
                v.is_finite() && *v >= 0.0
            }),
            wall_count: parse_or("WALL_COUNT", defaults.wall_count, |_| true),
            world_seed: env::var("WORLD_SEED").ok().and_then(|raw| match raw.parse() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    warn!(value = %raw, "Ignoring invalid WORLD_SEED");
                    None
                }
            }),
        };

        if settings.join_cutoff_secs >= settings.match_duration_secs {
            warn!(
                cutoff = settings.join_cutoff_secs,
                duration = settings.match_duration_secs,
                "Join cutoff is longer than the match; every join will spectate"
            );
        }
        settings
    }
}

/// Parse `key` from the environment, falling back to `default` with a
/// warning when the value does not parse or fails `valid`
fn parse_or<T>(key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + std::fmt::Debug,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(key = %key, value = %raw, fallback = ?default, "Invalid setting, using default");
            default
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr.clone()))?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),

            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public")),

            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|o| !o.is_empty()),

            game: GameSettings::from_env(),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
}
