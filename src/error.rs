//! Domain error taxonomy.
//!
//! Expected, common outcomes ("already liked", population at cap) are plain
//! return values, not errors. Only genuine failures live here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColonyError {
    /// A platform call exhausted its transport retries.
    #[error("platform call '{what}' failed after {attempts} attempts: {message}")]
    Transport {
        what: &'static str,
        attempts: u32,
        message: String,
    },

    /// The content provider returned empty or failed output.
    #[error("content generation failed: {0}")]
    Generation(String),

    /// A referenced bot does not exist; terminal for the operation.
    #[error("bot {0} not found")]
    BotNotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A bot creation attempt failed end to end (caller logs and continues).
    #[error("failed to create bot: {0}")]
    BotCreation(String),
}

pub type Result<T> = std::result::Result<T, ColonyError>;
