//! Shared test doubles for the platform and generation seams.

use crate::content::TextGenerator;
use crate::error::{ColonyError, Result};
use crate::platform::{BotRegistration, NewComment, NewPost, PlatformApi};
use crate::types::Post;
use async_trait::async_trait;
use std::sync::Mutex;

/// In-memory platform double. Records every mutation call; likes and
/// comments can be made to fail to exercise partial-failure paths.
pub struct MockPlatform {
    posts: Mutex<Vec<Post>>,
    fail_likes: bool,
    fail_comments: bool,
    fail_registration: bool,
    likes: Mutex<Vec<(String, String)>>,
    comments: Mutex<Vec<(String, String)>>,
    registered: Mutex<Vec<String>>,
    next_post_id: Mutex<u64>,
}

impl MockPlatform {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self {
            posts: Mutex::new(posts),
            fail_likes: false,
            fail_comments: false,
            fail_registration: false,
            likes: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
            next_post_id: Mutex::new(1),
        }
    }

    pub fn failing_likes(mut self) -> Self {
        self.fail_likes = true;
        self
    }

    pub fn failing_comments(mut self) -> Self {
        self.fail_comments = true;
        self
    }

    pub fn failing_registration(mut self) -> Self {
        self.fail_registration = true;
        self
    }

    /// (post_id, bot_name) pairs, in call order.
    pub fn like_calls(&self) -> Vec<(String, String)> {
        self.likes.lock().unwrap().clone()
    }

    /// (post_id, comment text) pairs, in call order.
    pub fn comment_calls(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }

    /// Names of bots registered with the platform, in call order.
    pub fn registered_names(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    fn refused(what: &'static str) -> ColonyError {
        ColonyError::Transport {
            what,
            attempts: 3,
            message: "mock refused".into(),
        }
    }
}

#[async_trait]
impl PlatformApi for MockPlatform {
    async fn get_posts(&self) -> Result<Vec<Post>> {
        Ok(self.posts.lock().unwrap().clone())
    }

    async fn add_post(&self, post: &NewPost) -> Result<String> {
        let mut next = self.next_post_id.lock().unwrap();
        let id = format!("post-{}", *next);
        *next += 1;
        self.posts.lock().unwrap().push(Post {
            id: id.clone(),
            author: post.name.clone(),
            text: post.text.clone(),
            date: Some(post.on_date.clone()),
        });
        Ok(id)
    }

    async fn like_post(&self, post_id: &str, bot_name: &str) -> Result<()> {
        if self.fail_likes {
            return Err(Self::refused("like_post"));
        }
        self.likes
            .lock()
            .unwrap()
            .push((post_id.to_string(), bot_name.to_string()));
        Ok(())
    }

    async fn add_comment(&self, post_id: &str, comment: &NewComment) -> Result<()> {
        if self.fail_comments {
            return Err(Self::refused("add_comment"));
        }
        self.comments
            .lock()
            .unwrap()
            .push((post_id.to_string(), comment.text.clone()));
        Ok(())
    }

    async fn add_bot(&self, bot: &BotRegistration) -> Result<()> {
        if self.fail_registration {
            return Err(Self::refused("add_bot"));
        }
        self.registered.lock().unwrap().push(bot.name.clone());
        Ok(())
    }
}

/// Generator double returning fixed text, or failing on demand.
pub struct CannedGenerator {
    reply: Option<String>,
}

impl CannedGenerator {
    pub fn ok() -> Self {
        Self {
            reply: Some("canned text".into()),
        }
    }

    pub fn saying(reply: &str) -> Self {
        Self {
            reply: Some(reply.into()),
        }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate_text(&self, _prompt: &str, _max_tokens: u32, _temperature: f64) -> Result<String> {
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(ColonyError::Generation("canned failure".into())),
        }
    }
}
