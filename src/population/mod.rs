//! Population lifecycle: initial seeding, daily growth, and synthesis of
//! individual bots with jittered category baselines.

use crate::content::{avatar_url, ContentGenerator, AVATAR_STYLES};
use crate::error::{ColonyError, Result};
use crate::platform::{BotRegistration, PlatformApi};
use crate::state::Database;
use crate::types::{Bot, BotCategory, Gender, NewBot};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Per-bot jitter applied to like/comment/follow/unfollow baselines.
const PROBABILITY_JITTER: f64 = 0.1;
/// Jitter applied to the repost baseline.
const REPOST_JITTER: f64 = 0.05;

const AGE_MIN: u32 = 18;
const AGE_MAX: u32 = 65;

/// Fresh-generation attempts before falling back to suffixing.
const USERNAME_FRESH_ATTEMPTS: u32 = 10;
/// Suffix attempts before giving up on a bot entirely.
const USERNAME_SUFFIX_ATTEMPTS: u32 = 10;

pub const KV_LAST_GROWTH_AT: &str = "last_growth_at";
pub const KV_LAST_GROWTH_CREATED: &str = "last_growth_created";

/// Creates bots and keeps the population growing toward its cap.
pub struct PopulationController {
    db: Arc<Mutex<Database>>,
    platform: Arc<dyn PlatformApi>,
    content: Arc<ContentGenerator>,
}

impl PopulationController {
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

    /// Seed the population up to `target` bots. Does nothing when the
    /// population already meets the target. Individual failures are logged
    /// and skipped. Returns the number of bots created.
    pub async fn initialize_population(&self, target: u64) -> Result<u64> {
        let existing = {
            let db = self.db.lock().await;
            db.count_bots()?
        };
        if existing >= target {
            debug!("Population already at {existing} bots (target {target}), skipping init");
            return Ok(0);
        }

        let missing = target - existing;
        info!("Initializing population: creating {missing} bots");
        Ok(self.create_bots(missing).await)
    }

    /// One growth round: create a uniform draw of [min, max] new bots,
    /// clamped to the remaining headroom under `cap`. A population at or
    /// above the cap is a no-op returning 0.
    pub async fn daily_growth(&self, min: u64, max: u64, cap: u64) -> Result<u64> {
        let existing = {
            let db = self.db.lock().await;
            db.count_bots()?
        };
        if existing >= cap {
            info!("Population at cap ({existing}/{cap}), no growth");
            return Ok(0);
        }

        let headroom = cap - existing;
        // Tolerate reversed bounds from hand-edited configs
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let wanted = {
            let mut rng = rand::thread_rng();
            rng.gen_range(min..=max)
        };
        let count = wanted.min(headroom);

        info!("Daily growth: creating {count} bots ({existing}/{cap})");
        let created = self.create_bots(count).await;

        {
            let db = self.db.lock().await;
            db.kv_set(KV_LAST_GROWTH_AT, &Utc::now().to_rfc3339())?;
            db.kv_set(KV_LAST_GROWTH_CREATED, &created.to_string())?;
        }
        Ok(created)
    }

    /// Create up to `count` bots, tolerating per-bot failures.
    async fn create_bots(&self, count: u64) -> u64 {
        let mut created = 0;
        for _ in 0..count {
            match self.create_random_bot().await {
                Ok(bot) => {
                    debug!("Created bot {} ({})", bot.name, bot.category);
                    created += 1;
                }
                Err(e) => warn!("Failed to create bot: {e}"),
            }
        }
        created
    }

    /// Synthesize one bot: uniform category, gender, and age, jittered
    /// probabilities, generated username/name/bio, and a random avatar.
    /// The bot is stored locally and then registered with the platform.
    pub async fn create_random_bot(&self) -> Result<Bot> {
        let (category, gender, age, style_idx) = {
            let mut rng = rand::thread_rng();
            let category = BotCategory::ALL[rng.gen_range(0..BotCategory::ALL.len())];
            let gender = if rng.gen_bool(0.5) {
                Gender::Male
            } else {
                Gender::Female
            };
            let age = rng.gen_range(AGE_MIN..=AGE_MAX);
            let style_idx = rng.gen_range(0..AVATAR_STYLES.len());
            (category, gender, age, style_idx)
        };

        let name = self.unique_username(category).await?;
        let full_name = self.content.full_name(gender, age).await?;
        let description = self.content.description(category, age, gender).await?;
        let avatar = avatar_url(AVATAR_STYLES[style_idx]);

        let profile = category.profile();
        let new = {
            let mut rng = rand::thread_rng();
            NewBot {
                name,
                full_name,
                avatar,
                age,
                gender,
                category,
                prompt: category.prompt().to_string(),
                description,
                like_probability: jitter(profile.like, PROBABILITY_JITTER, 0.1, 0.9, &mut rng),
                comment_probability: jitter(profile.comment, PROBABILITY_JITTER, 0.1, 0.9, &mut rng),
                follow_probability: jitter(profile.follow, PROBABILITY_JITTER, 0.1, 0.9, &mut rng),
                unfollow_probability: jitter(profile.unfollow, PROBABILITY_JITTER, 0.1, 0.9, &mut rng),
                repost_probability: jitter(profile.repost, REPOST_JITTER, 0.0, 0.3, &mut rng),
            }
        };

        let bot = {
            let db = self.db.lock().await;
            db.create_bot(&new)
                .map_err(|e| ColonyError::BotCreation(format!("store insert failed: {e}")))?
        };

        // A bot the platform never accepted must not exist locally either;
        // roll back so the username is freed for later attempts
        let registration = registration_for(&bot);
        if let Err(e) = self.platform.add_bot(&registration).await {
            {
                let db = self.db.lock().await;
                db.delete_bot(bot.id)?;
            }
            return Err(ColonyError::BotCreation(format!(
                "platform registration failed for '{}': {e}",
                bot.name
            )));
        }

        info!(
            "Created bot {} ({}, {}, age {})",
            bot.name, bot.category, bot.gender, bot.age
        );
        Ok(bot)
    }

    /// Find a username not yet taken locally. Tries fresh generations first,
    /// then derives candidates by truncating the last one and appending a
    /// random suffix.
    async fn unique_username(&self, category: BotCategory) -> Result<String> {
        let mut last = String::new();

        for _ in 0..USERNAME_FRESH_ATTEMPTS {
            let candidate = self.content.username(category).await?;
            if candidate.is_empty() {
                continue;
            }
            let taken = {
                let db = self.db.lock().await;
                db.bot_by_name(&candidate)?.is_some()
            };
            if !taken {
                return Ok(candidate);
            }
            last = candidate;
        }

        if last.is_empty() {
            return Err(ColonyError::Generation(
                "username generation produced no usable candidates".into(),
            ));
        }

        let mut base = last;
        base.truncate(12);
        for _ in 0..USERNAME_SUFFIX_ATTEMPTS {
            let suffix: String = {
                let mut rng = rand::thread_rng();
                (&mut rng)
                    .sample_iter(Alphanumeric)
                    .take(2)
                    .map(char::from)
                    .collect()
            };
            let candidate = format!("{base}{suffix}");
            let taken = {
                let db = self.db.lock().await;
                db.bot_by_name(&candidate)?.is_some()
            };
            if !taken {
                return Ok(candidate);
            }
        }

        Err(ColonyError::Generation(format!(
            "could not find a free username derived from '{base}'"
        )))
    }
}

/// Baseline plus a uniform offset in [-spread, spread], clamped to [lo, hi].
fn jitter<R: Rng>(base: f64, spread: f64, lo: f64, hi: f64, rng: &mut R) -> f64 {
    (base + rng.gen_range(-spread..=spread)).clamp(lo, hi)
}

fn registration_for(bot: &Bot) -> BotRegistration {
    let password: String = {
        let mut rng = rand::thread_rng();
        (&mut rng)
            .sample_iter(Alphanumeric)
            .take(16)
            .map(char::from)
            .collect()
    };
    BotRegistration {
        name: bot.name.clone(),
        full_name: bot.full_name.clone(),
        avatar: bot.avatar.clone(),
        age: bot.age,
        gender: bot.gender.to_string(),
        is_bot: true,
        on_date: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        password,
        prompt: bot.prompt.clone(),
        description: bot.description.clone(),
        following: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CannedGenerator, MockPlatform};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn controller(
        db: Arc<Mutex<Database>>,
        platform: Arc<MockPlatform>,
    ) -> PopulationController {
        let content = Arc::new(ContentGenerator::new(
            Arc::new(CannedGenerator::saying("river_otter")),
            0.7,
        ));
        PopulationController::new(db, platform, content)
    }

    #[test]
    fn jitter_stays_inside_clamp_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let p = jitter(0.9, PROBABILITY_JITTER, 0.1, 0.9, &mut rng);
            assert!((0.1..=0.9).contains(&p));
            let r = jitter(0.0, REPOST_JITTER, 0.0, 0.3, &mut rng);
            assert!((0.0..=0.3).contains(&r));
        }
    }

    #[tokio::test]
    async fn synthesized_bot_respects_parameter_bounds() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let platform = Arc::new(MockPlatform::with_posts(Vec::new()));
        let controller = controller(db, platform.clone());

        let bot = controller.create_random_bot().await.unwrap();
        assert!((AGE_MIN..=AGE_MAX).contains(&bot.age));
        for p in [
            bot.like_probability,
            bot.comment_probability,
            bot.follow_probability,
            bot.unfollow_probability,
        ] {
            assert!((0.1..=0.9).contains(&p), "probability {p} out of bounds");
        }
        assert!((0.0..=0.3).contains(&bot.repost_probability));
        assert!(!bot.full_name.is_empty());
        assert!(bot.avatar.starts_with("https://api.dicebear.com/"));
        assert_eq!(platform.registered_names(), vec![bot.name.clone()]);
    }

    #[tokio::test]
    async fn username_collisions_fall_back_to_suffixing() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let platform = Arc::new(MockPlatform::with_posts(Vec::new()));
        let controller = controller(db.clone(), platform);

        // Every generation returns "river_otter"; only the first bot can
        // take it, later ones get truncated+suffixed variants
        let first = controller.create_random_bot().await.unwrap();
        assert_eq!(first.name, "river_otter");

        let second = controller.create_random_bot().await.unwrap();
        assert_ne!(second.name, first.name);
        assert!(second.name.starts_with("river_otter"));
        assert_eq!(second.name.len(), "river_otter".len() + 2);

        assert_eq!(db.lock().await.count_bots().unwrap(), 2);
    }

    #[tokio::test]
    async fn init_fills_up_to_target_and_is_idempotent() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let platform = Arc::new(MockPlatform::with_posts(Vec::new()));
        let controller = controller(db.clone(), platform.clone());

        assert_eq!(controller.initialize_population(5).await.unwrap(), 5);
        assert_eq!(db.lock().await.count_bots().unwrap(), 5);
        assert_eq!(platform.registered_names().len(), 5);

        // A second run sees the target met and creates nothing
        assert_eq!(controller.initialize_population(5).await.unwrap(), 0);
        assert_eq!(db.lock().await.count_bots().unwrap(), 5);
    }

    #[tokio::test]
    async fn growth_is_clamped_to_headroom() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let platform = Arc::new(MockPlatform::with_posts(Vec::new()));
        let controller = controller(db.clone(), platform);

        controller.initialize_population(3).await.unwrap();

        // Headroom is 2 even though the draw wants 5
        let created = controller.daily_growth(5, 5, 5).await.unwrap();
        assert_eq!(created, 2);
        assert_eq!(db.lock().await.count_bots().unwrap(), 5);

        let store = db.lock().await;
        assert!(store.kv_get(KV_LAST_GROWTH_AT).unwrap().is_some());
        assert_eq!(store.kv_get(KV_LAST_GROWTH_CREATED).unwrap().unwrap(), "2");
    }

    #[tokio::test]
    async fn failed_registration_fails_and_rolls_back_the_bot() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let platform = Arc::new(MockPlatform::with_posts(Vec::new()).failing_registration());
        let controller = controller(db.clone(), platform.clone());

        let err = controller.create_random_bot().await.unwrap_err();
        assert!(matches!(err, ColonyError::BotCreation(_)));
        assert_eq!(db.lock().await.count_bots().unwrap(), 0);
        assert!(platform.registered_names().is_empty());

        // Bulk creation tolerates the per-bot failures and creates nothing
        assert_eq!(controller.initialize_population(3).await.unwrap(), 0);
        assert_eq!(db.lock().await.count_bots().unwrap(), 0);
    }

    #[tokio::test]
    async fn reversed_growth_bounds_are_normalized() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let platform = Arc::new(MockPlatform::with_posts(Vec::new()));
        let controller = controller(db.clone(), platform);

        let created = controller.daily_growth(5, 2, 10).await.unwrap();
        assert!((2..=5).contains(&created), "created {created}");
        assert_eq!(db.lock().await.count_bots().unwrap(), created);
    }

    #[tokio::test]
    async fn growth_at_cap_is_a_no_op() {
        let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let platform = Arc::new(MockPlatform::with_posts(Vec::new()));
        let controller = controller(db.clone(), platform);

        controller.initialize_population(4).await.unwrap();
        assert_eq!(controller.daily_growth(1, 3, 4).await.unwrap(), 0);
        assert_eq!(db.lock().await.count_bots().unwrap(), 4);
        assert!(db.lock().await.kv_get(KV_LAST_GROWTH_AT).unwrap().is_none());
    }
}
