//! Activity decision engine: drains due reactions and decides, per bot,
//! whether to like and/or comment on a recent post.
//!
//! Dedup is check-then-act-then-record against the activity ledger. There is
//! a known window between a successful platform call and the ledger write: a
//! crash inside it can lose the record and allow one duplicate later. This
//! is accepted; the backend tolerates repeated likes.

use crate::content::ContentGenerator;
use crate::error::{ColonyError, Result};
use crate::fanout::ReactionQueue;
use crate::platform::{NewComment, NewPost, PlatformApi};
use crate::state::Database;
use crate::types::{ActivityKind, Bot, Post, ReactionOutcome, ScheduledReaction};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Trailing window for reactable posts: today and the two days before.
const RECENT_WINDOW_DAYS: i64 = 2;

/// Decides and executes bot reactions.
pub struct DecisionEngine {
    db: Arc<Mutex<Database>>,
    platform: Arc<dyn PlatformApi>,
    content: Arc<ContentGenerator>,
}

impl DecisionEngine {
    pub fn new(
        db: Arc<Mutex<Database>>,
        platform: Arc<dyn PlatformApi>,
        content: Arc<ContentGenerator>,
    ) -> Self {
        Self {
            db,
            platform,
            content,
        }
    }

    /// Drain everything due in `queue` and process each reaction. Entries
    /// are removed before processing, so a failure is terminal for that
    /// occurrence; nothing is re-enqueued. Returns the number processed.
    pub async fn process_due_reactions(&self, queue: &Arc<Mutex<ReactionQueue>>) -> usize {
        let due = {
            let mut queue = queue.lock().await;
            queue.drain_due(Utc::now())
        };

        if due.is_empty() {
            return 0;
        }
        debug!("Processing {} due reactions", due.len());

        let mut processed = 0;
        for task in due {
            match self.process_due_reaction(&task).await {
                Ok(outcome) => {
                    info!("Reaction {} for bot {}: {outcome}", task.id, task.bot_id);
                }
                Err(e) => {
                    warn!("Reaction {} for bot {} failed: {e}", task.id, task.bot_id);
                }
            }
            processed += 1;
        }
        processed
    }

    /// Process one due reaction to a terminal outcome.
    pub async fn process_due_reaction(&self, task: &ScheduledReaction) -> Result<ReactionOutcome> {
        let bot = {
            let db = self.db.lock().await;
            let bot = db
                .bot_by_id(task.bot_id)?
                .ok_or(ColonyError::BotNotFound(task.bot_id))?;
            // Unconditional, before any decision is made
            db.touch_last_active(bot.id)?;
            bot
        };

        let posts = self.platform.get_posts().await?;
        let today = Utc::now().date_naive();
        let recent: Vec<&Post> = posts.iter().filter(|p| is_recent(p, today)).collect();

        if recent.is_empty() {
            debug!("No recent posts for bot {} to react to", bot.name);
            return Ok(ReactionOutcome::NoRecentPosts);
        }

        let post = {
            let mut rng = rand::thread_rng();
            (*recent[rng.gen_range(0..recent.len())]).clone()
        };

        let mut acted = false;

        // Like first, then comment; a failure in one never blocks the other.
        if self.try_like(&bot, &post).await? {
            acted = true;
        }
        if self.try_comment(&bot, &post).await? {
            acted = true;
        }

        if acted {
            Ok(ReactionOutcome::Success { post_id: post.id })
        } else {
            debug!("Bot {} decided not to interact with post {}", bot.name, post.id);
            Ok(ReactionOutcome::NoAction)
        }
    }

    /// Returns true if a like was executed and recorded.
    async fn try_like(&self, bot: &Bot, post: &Post) -> Result<bool> {
        let already = {
            let db = self.db.lock().await;
            db.activity_exists(bot.id, ActivityKind::Like, &post.id)?
        };
        if already || !draw(bot.like_probability) {
            return Ok(false);
        }

        if let Err(e) = self.platform.like_post(&post.id, &bot.name).await {
            warn!("Bot {} failed to like post {}: {e}", bot.name, post.id);
            return Ok(false);
        }

        {
            let db = self.db.lock().await;
            db.record_activity(bot.id, ActivityKind::Like, &post.id, None)?;
        }
        info!("Bot {} liked post {}", bot.name, post.id);

        // Remember the post for later comments; failure here is non-fatal
        match self.content.memory(bot.category, &post.text, "post").await {
            Ok(memory) => {
                let db = self.db.lock().await;
                if let Err(e) = db.create_memory(bot.id, &memory, "post", &post.id) {
                    warn!("Failed to store memory for bot {}: {e}", bot.name);
                }
            }
            Err(e) => warn!("Memory generation failed for bot {}: {e}", bot.name),
        }

        Ok(true)
    }

    /// Returns true if a comment was executed and recorded.
    async fn try_comment(&self, bot: &Bot, post: &Post) -> Result<bool> {
        let already = {
            let db = self.db.lock().await;
            db.activity_exists(bot.id, ActivityKind::Comment, &post.id)?
        };
        if already || !draw(bot.comment_probability) {
            return Ok(false);
        }

        let memories = {
            let db = self.db.lock().await;
            db.memories_for_context(bot.id, "post", &post.id)?
        };

        let text = match self.content.comment(bot.category, &post.text, &memories).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Comment generation failed for bot {}: {e}", bot.name);
                return Ok(false);
            }
        };

        let payload = NewComment::now(&bot.name, &text);
        if let Err(e) = self.platform.add_comment(&post.id, &payload).await {
            warn!("Bot {} failed to comment on post {}: {e}", bot.name, post.id);
            return Ok(false);
        }

        {
            let db = self.db.lock().await;
            db.record_activity(bot.id, ActivityKind::Comment, &post.id, Some(&text))?;
        }
        info!("Bot {} commented on post {}", bot.name, post.id);
        Ok(true)
    }

    /// Generate and publish a post authored by the given bot.
    pub async fn create_post(&self, bot_id: i64) -> Result<String> {
        let bot = {
            let db = self.db.lock().await;
            db.bot_by_id(bot_id)?.ok_or(ColonyError::BotNotFound(bot_id))?
        };

        let text = self.content.post(bot.category).await?;
        let post_id = self.platform.add_post(&NewPost::now(&bot.name, &text)).await?;

        {
            let db = self.db.lock().await;
            db.record_activity(bot.id, ActivityKind::Post, &post_id, Some(&text))?;
        }

        info!("Bot {} created post {}", bot.name, post_id);
        Ok(post_id)
    }
}

/// One Bernoulli trial.
fn draw(probability: f64) -> bool {
    rand::thread_rng().gen_bool(probability.clamp(0.0, 1.0))
}

/// Whether a post's date falls inside [today - 2 days, today], by calendar
/// date. Posts with missing or unparseable dates are never recent.
fn is_recent(post: &Post, today: NaiveDate) -> bool {
    let Some(raw) = post.date.as_deref() else {
        return false;
    };
    let Some(parsed) = parse_post_date(raw) else {
        return false;
    };
    let date = parsed.date();
    let window_start = today - ChronoDuration::days(RECENT_WINDOW_DAYS);
    window_start <= date && date <= today
}

/// The backend mixes several date encodings; accept all of them.
fn parse_post_date(raw: &str) -> Option<NaiveDateTime> {
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = chrono::DateTime::parse_from_str(raw, fmt) {
            return Some(dt.naive_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CannedGenerator, MockPlatform};
    use crate::types::{BotCategory, Gender, NewBot};
    use ulid::Ulid;

    fn new_bot(name: &str, like: f64, comment: f64) -> NewBot {
        NewBot {
            name: name.into(),
            full_name: String::new(),
            avatar: String::new(),
            age: 30,
            gender: Gender::Male,
            category: BotCategory::Neutral,
            prompt: String::new(),
            description: String::new(),
            like_probability: like,
            comment_probability: comment,
            follow_probability: 0.4,
            unfollow_probability: 0.2,
            repost_probability: 0.1,
        }
    }

    fn recent_post(id: &str) -> Post {
        Post {
            id: id.into(),
            author: "author".into(),
            text: "a recent post".into(),
            date: Some(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }

    fn stale_post(id: &str) -> Post {
        let old = Utc::now() - ChronoDuration::days(10);
        Post {
            id: id.into(),
            author: "author".into(),
            text: "an old post".into(),
            date: Some(old.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }

    fn engine(
        db: Arc<Mutex<Database>>,
        platform: Arc<MockPlatform>,
        generator: CannedGenerator,
    ) -> DecisionEngine {
        let content = Arc::new(ContentGenerator::new(Arc::new(generator), 0.7));
        DecisionEngine::new(db, platform, content)
    }

    fn task_for(bot_id: i64) -> ScheduledReaction {
        ScheduledReaction {
            id: Ulid::new(),
            bot_id,
            post_id: "p1".into(),
            due_at: Utc::now(),
        }
    }

    #[test]
    fn parses_all_known_date_encodings() {
        for raw in [
            "2026-08-24T10:30:00",
            "2026-08-24T10:30:00.123456",
            "2026-08-24T10:30:00+0200",
            "2026-08-24T10:30:00.500+0000",
            "08/24/2026",
        ] {
            let parsed = parse_post_date(raw);
            assert!(parsed.is_some(), "failed to parse {raw}");
            assert_eq!(parsed.unwrap().date().to_string(), "2026-08-24");
        }
        assert!(parse_post_date("yesterday").is_none());
        assert!(parse_post_date("").is_none());
    }

    #[test]
    fn recent_window_is_three_calendar_days() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let post_on = |date: &str| Post {
            id: "p".into(),
            author: String::new(),
            text: String::new(),
            date: Some(date.into()),
        };

        assert!(is_recent(&post_on("2026-08-26T00:00:00"), today));
        assert!(is_recent(&post_on("2026-08-24T23:59:59"), today));
        assert!(!is_recent(&post_on("2026-08-23T23:59:59"), today));
        // Future posts are not in the trailing window
        assert!(!is_recent(&post_on("2026-08-27T00:00:00"), today));
        // Missing or garbage dates are never recent
        assert!(!is_recent(&post_on("not a date"), today));
        assert!(!is_recent(
            &Post {
                id: "p".into(),
                author: String::new(),
                text: String::new(),
                date: None
            },
            today
        ));
    }

    #[tokio::test]
    async fn certain_like_with_no_comment_records_one_like() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("liker", 1.0, 0.0)).unwrap();
        let db = Arc::new(Mutex::new(db));

        let platform = Arc::new(MockPlatform::with_posts(vec![recent_post("p1")]));
        let engine = engine(db.clone(), platform.clone(), CannedGenerator::ok());

        let outcome = engine.process_due_reaction(&task_for(bot.id)).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Success { post_id: "p1".into() });

        let store = db.lock().await;
        assert!(store.activity_exists(bot.id, ActivityKind::Like, "p1").unwrap());
        assert!(!store.activity_exists(bot.id, ActivityKind::Comment, "p1").unwrap());
        assert_eq!(platform.like_calls(), vec![("p1".to_string(), "liker".to_string())]);
        assert!(platform.comment_calls().is_empty());
        // The like left a memory behind
        assert!(!store.memories_for_context(bot.id, "post", "p1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_posts_in_window_is_terminal_without_side_effects() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("idle", 1.0, 1.0)).unwrap();
        let db = Arc::new(Mutex::new(db));

        let platform = Arc::new(MockPlatform::with_posts(vec![stale_post("old1")]));
        let engine = engine(db.clone(), platform.clone(), CannedGenerator::ok());

        let outcome = engine.process_due_reaction(&task_for(bot.id)).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::NoRecentPosts);
        assert_eq!(db.lock().await.count_activities().unwrap(), 0);
        assert!(platform.like_calls().is_empty());
    }

    #[tokio::test]
    async fn zero_probabilities_touch_last_active_but_nothing_else() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("lurker", 0.0, 0.0)).unwrap();
        let db = Arc::new(Mutex::new(db));

        std::thread::sleep(std::time::Duration::from_millis(10));

        let platform = Arc::new(MockPlatform::with_posts(vec![recent_post("p1")]));
        let engine = engine(db.clone(), platform.clone(), CannedGenerator::ok());

        let outcome = engine.process_due_reaction(&task_for(bot.id)).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::NoAction);

        let store = db.lock().await;
        assert_eq!(store.count_activities().unwrap(), 0);
        let reloaded = store.bot_by_id(bot.id).unwrap().unwrap();
        assert!(reloaded.last_active > bot.last_active);
    }

    #[tokio::test]
    async fn replaying_a_reaction_never_duplicates_the_ledger() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("once", 1.0, 0.0)).unwrap();
        let db = Arc::new(Mutex::new(db));

        let platform = Arc::new(MockPlatform::with_posts(vec![recent_post("p1")]));
        let engine = engine(db.clone(), platform.clone(), CannedGenerator::ok());
        let task = task_for(bot.id);

        let first = engine.process_due_reaction(&task).await.unwrap();
        assert_eq!(first, ReactionOutcome::Success { post_id: "p1".into() });

        let second = engine.process_due_reaction(&task).await.unwrap();
        assert_eq!(second, ReactionOutcome::NoAction);

        assert_eq!(db.lock().await.count_activities().unwrap(), 1);
        assert_eq!(platform.like_calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_like_call_still_evaluates_comment() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("resilient", 1.0, 1.0)).unwrap();
        let db = Arc::new(Mutex::new(db));

        let platform = Arc::new(MockPlatform::with_posts(vec![recent_post("p1")]).failing_likes());
        let engine = engine(db.clone(), platform.clone(), CannedGenerator::ok());

        let outcome = engine.process_due_reaction(&task_for(bot.id)).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Success { post_id: "p1".into() });

        let store = db.lock().await;
        assert!(!store.activity_exists(bot.id, ActivityKind::Like, "p1").unwrap());
        assert!(store.activity_exists(bot.id, ActivityKind::Comment, "p1").unwrap());
    }

    #[tokio::test]
    async fn failed_comment_call_keeps_the_like() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("half", 1.0, 1.0)).unwrap();
        let db = Arc::new(Mutex::new(db));

        let platform =
            Arc::new(MockPlatform::with_posts(vec![recent_post("p1")]).failing_comments());
        let engine = engine(db.clone(), platform.clone(), CannedGenerator::ok());

        let outcome = engine.process_due_reaction(&task_for(bot.id)).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Success { post_id: "p1".into() });

        let store = db.lock().await;
        assert!(store.activity_exists(bot.id, ActivityKind::Like, "p1").unwrap());
        assert!(!store.activity_exists(bot.id, ActivityKind::Comment, "p1").unwrap());
    }

    #[tokio::test]
    async fn generation_failure_is_contained_to_text_actions() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("mute", 1.0, 1.0)).unwrap();
        let db = Arc::new(Mutex::new(db));

        let platform = Arc::new(MockPlatform::with_posts(vec![recent_post("p1")]));
        let engine = engine(db.clone(), platform.clone(), CannedGenerator::failing());

        // The like needs no generated text, so it still lands; the comment
        // and the post-like memory are dropped
        let outcome = engine.process_due_reaction(&task_for(bot.id)).await.unwrap();
        assert_eq!(outcome, ReactionOutcome::Success { post_id: "p1".into() });

        let store = db.lock().await;
        assert!(store.activity_exists(bot.id, ActivityKind::Like, "p1").unwrap());
        assert!(!store.activity_exists(bot.id, ActivityKind::Comment, "p1").unwrap());
        assert!(store.memories_for_context(bot.id, "post", "p1").unwrap().is_empty());
        assert!(platform.comment_calls().is_empty());
    }

    #[tokio::test]
    async fn missing_bot_is_a_terminal_error() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let platform = Arc::new(MockPlatform::with_posts(vec![recent_post("p1")]));
        let engine = engine(db, platform, CannedGenerator::ok());

        let err = engine.process_due_reaction(&task_for(999)).await.unwrap_err();
        assert!(matches!(err, ColonyError::BotNotFound(999)));
    }

    #[tokio::test]
    async fn drained_tasks_are_not_requeued_on_failure() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("drained", 1.0, 1.0)).unwrap();
        let db = Arc::new(Mutex::new(db));

        let platform = Arc::new(MockPlatform::with_posts(vec![recent_post("p1")]));
        let engine = engine(db, platform, CannedGenerator::ok());

        let queue = Arc::new(Mutex::new(ReactionQueue::new()));
        {
            let mut q = queue.lock().await;
            q.push(ScheduledReaction {
                id: Ulid::new(),
                bot_id: bot.id,
                post_id: "p1".into(),
                due_at: Utc::now() - ChronoDuration::seconds(1),
            });
            // A reaction for a bot that no longer exists: processing fails,
            // but the entry is still consumed exactly once
            q.push(ScheduledReaction {
                id: Ulid::new(),
                bot_id: 424242,
                post_id: "p1".into(),
                due_at: Utc::now() - ChronoDuration::seconds(1),
            });
        }

        assert_eq!(engine.process_due_reactions(&queue).await, 2);
        assert!(queue.lock().await.is_empty());
        assert_eq!(engine.process_due_reactions(&queue).await, 0);
    }

    #[tokio::test]
    async fn bot_post_is_published_and_recorded() {
        let db = Database::open_memory().unwrap();
        let bot = db.create_bot(&new_bot("poster", 0.5, 0.5)).unwrap();
        let db = Arc::new(Mutex::new(db));

        let platform = Arc::new(MockPlatform::with_posts(Vec::new()));
        let engine = engine(db.clone(), platform.clone(), CannedGenerator::ok());

        let post_id = engine.create_post(bot.id).await.unwrap();
        assert_eq!(post_id, "post-1");
        assert!(db
            .lock()
            .await
            .activity_exists(bot.id, ActivityKind::Post, "post-1")
            .unwrap());
    }
}
