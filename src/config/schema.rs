//! Configuration schema for colony.toml.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyConfig {
    /// Social platform backend base URL.
    pub platform_api_url: String,

    /// Access token appended to every platform request.
    pub platform_token: String,

    /// OpenAI-compatible inference API base URL.
    pub llm_api_url: String,

    /// Inference API key.
    pub llm_api_key: String,

    /// Model used for all content generation.
    pub llm_model: String,

    /// Sampling temperature for comments, posts, and memories.
    pub temperature: f64,

    /// Number of bots to seed on first start.
    pub initial_bots_count: u64,

    /// Daily growth draw bounds.
    pub daily_growth_min: u64,
    pub daily_growth_max: u64,

    /// Hard cap on the total population.
    pub max_bots_count: u64,

    /// Poll interval for the reaction queue and post watcher, in seconds.
    pub monitor_interval_secs: u64,

    /// Reaction delay bounds, in seconds.
    pub reaction_delay_min_secs: u64,
    pub reaction_delay_max_secs: u64,

    /// Path to SQLite database.
    pub db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,
}

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            platform_api_url: "http://localhost:8080".into(),
            platform_token: String::new(),
            llm_api_url: "https://api.openai.com".into(),
            llm_api_key: String::new(),
            llm_model: "gpt-4o-mini".into(),
            temperature: 0.7,
            initial_bots_count: 20,
            daily_growth_min: 20,
            daily_growth_max: 50,
            max_bots_count: 5000,
            monitor_interval_secs: 60,
            reaction_delay_min_secs: 30,
            reaction_delay_max_secs: 300,
            db_path: "~/.colony/state.db".into(),
            log_level: "info".into(),
        }
    }
}

impl ColonyConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }
}
