//! Error types for the world view synchronization client

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the game server.
///
/// Every variant is transient from the engine's point of view: the scheduler
/// retries on its next tick and the move coordinator reports a failed move.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to fetch player {player_id} during bootstrap: {source}")]
    Bootstrap {
        player_id: u32,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
