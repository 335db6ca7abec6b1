//! Colony — autonomous bot population runtime for a social platform.
//!
//! Seeds and grows a population of persona bots, watches the platform for
//! new posts, and fans out delayed, probability-driven reactions.

pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod platform;
pub mod population;
pub mod scheduler;
pub mod state;
pub mod types;

#[cfg(test)]
pub mod testutil;
