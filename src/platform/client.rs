//! HTTP client for the platform's document-oriented REST API.
//!
//! Every call retries transient failures with exponential backoff before
//! surfacing a transport error; callers never retry on top of this.

use crate::error::{ColonyError, Result};
use crate::platform::{BotRegistration, NewComment, NewPost, PlatformApi};
use crate::types::Post;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts per call, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff before retry `attempt` (1-based): 2s, 4s, capped at 10s.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs((1u64 << attempt).clamp(2, 10))
}

/// Platform backend client.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl PlatformClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Send a request built by `build`, retrying failures with backoff.
    async fn send_with_retry(
        &self,
        what: &'static str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match build().query(&[("token", &self.token)]).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    last_error = format!("{status}: {body}");
                }
                Err(e) => last_error = e.to_string(),
            }

            if attempt < MAX_ATTEMPTS {
                warn!("Platform {what} attempt {attempt} failed ({last_error}), retrying");
                tokio::time::sleep(backoff(attempt)).await;
            }
        }

        Err(ColonyError::Transport {
            what,
            attempts: MAX_ATTEMPTS,
            message: last_error,
        })
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn get_posts(&self) -> Result<Vec<Post>> {
        let resp = self
            .send_with_retry("get_posts", || self.http.get(self.url("GetDocuments/Posts")))
            .await?;

        let docs: Vec<serde_json::Value> =
            resp.json().await.map_err(|e| ColonyError::Transport {
                what: "get_posts",
                attempts: MAX_ATTEMPTS,
                message: format!("invalid response body: {e}"),
            })?;

        let posts: Vec<Post> = docs.iter().filter_map(post_from_document).collect();
        debug!("Fetched {} posts from platform", posts.len());
        Ok(posts)
    }

    async fn add_post(&self, post: &NewPost) -> Result<String> {
        let resp = self
            .send_with_retry("add_post", || {
                self.http.post(self.url("AddDocument/Posts")).json(post)
            })
            .await?;

        let body: serde_json::Value = resp.json().await.map_err(|e| ColonyError::Transport {
            what: "add_post",
            attempts: MAX_ATTEMPTS,
            message: format!("invalid response body: {e}"),
        })?;

        Ok(doc_id(&body["docID"]))
    }

    async fn like_post(&self, post_id: &str, bot_name: &str) -> Result<()> {
        let body = json!({ "Likes": ["Add", bot_name] });
        self.send_with_retry("like_post", || {
            self.http
                .post(self.url(&format!("UpdateDocument/Posts/{post_id}")))
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn add_comment(&self, post_id: &str, comment: &NewComment) -> Result<()> {
        // The backend stores comments as opaque strings inside the post document
        let serialized = serde_json::to_string(comment).unwrap_or_default();
        let body = json!({ "Comments": ["Add", serialized] });
        self.send_with_retry("add_comment", || {
            self.http
                .post(self.url(&format!("UpdateDocument/Posts/{post_id}")))
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn add_bot(&self, bot: &BotRegistration) -> Result<()> {
        self.send_with_retry("add_bot", || {
            self.http.post(self.url("AddDocument/Users")).json(bot)
        })
        .await?;
        Ok(())
    }
}

/// Document ids arrive as either a JSON number or a string.
fn doc_id(value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Map a raw post document into a `Post`. The backend nests the authored
/// fields under `json` but some documents carry them at the top level too.
fn post_from_document(doc: &serde_json::Value) -> Option<Post> {
    let id = match &doc["docID"] {
        serde_json::Value::Null => return None,
        other => doc_id(other),
    };

    let field = |name: &str| -> Option<String> {
        doc["json"][name]
            .as_str()
            .or_else(|| doc[name].as_str())
            .map(str::to_string)
    };

    Some(Post {
        id,
        author: field("Name").unwrap_or_default(),
        text: field("Text").unwrap_or_default(),
        date: field("OnDate"),
    })
}
