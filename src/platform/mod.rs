//! Outbound client for the social-platform backend.

pub mod client;

pub use client::PlatformClient;

use crate::error::Result;
use crate::types::Post;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

/// Payload for registering a bot account with the backend.
/// Field names follow the backend's document wire format.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BotRegistration {
    pub name: String,
    pub full_name: String,
    pub avatar: String,
    pub age: u32,
    pub gender: String,
    pub is_bot: bool,
    pub on_date: String,
    pub password: String,
    pub prompt: String,
    pub description: String,
    pub following: Vec<String>,
}

/// Payload for creating a post.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewPost {
    pub name: String,
    pub text: String,
    pub on_date: String,
}

impl NewPost {
    pub fn now(author: &str, text: &str) -> Self {
        Self {
            name: author.to_string(),
            text: text.to_string(),
            on_date: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

/// Payload for a comment attached to a post.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewComment {
    pub name: String,
    pub text: String,
    pub on_date: String,
}

impl NewComment {
    pub fn now(author: &str, text: &str) -> Self {
        Self {
            name: author.to_string(),
            text: text.to_string(),
            on_date: Utc::now().format("%m/%d/%Y").to_string(),
        }
    }
}

/// The platform operations the core depends on. Every implementation applies
/// bounded transport retry before surfacing an error.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn get_posts(&self) -> Result<Vec<Post>>;

    /// Create a post; returns the new document id.
    async fn add_post(&self, post: &NewPost) -> Result<String>;

    async fn like_post(&self, post_id: &str, bot_name: &str) -> Result<()>;

    async fn add_comment(&self, post_id: &str, comment: &NewComment) -> Result<()>;

    async fn add_bot(&self, bot: &BotRegistration) -> Result<()>;
}
