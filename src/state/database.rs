//! SQLite database wrapper with WAL mode and migration support.
//!
//! Holds the bot population, the append-only activity ledger, and bot
//! memories. The reaction queue is deliberately NOT here: it is process-local
//! state owned by the fan-out scheduler.

use crate::error::Result;
use crate::state::schema;
use crate::types::*;
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// The colony state database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn.execute_batch(schema::CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version < schema::SCHEMA_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Key-value store
    // -----------------------------------------------------------------------

    /// Get a value from the KV store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get(0)).ok();
        Ok(result)
    }

    /// Set a value in the KV store (upsert).
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bots
    // -----------------------------------------------------------------------

    /// Insert a new bot and return it with its assigned id.
    pub fn create_bot(&self, new: &NewBot) -> Result<Bot> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO bots (name, full_name, avatar, age, gender, category, prompt,
                               description, like_probability, comment_probability,
                               follow_probability, unfollow_probability, repost_probability,
                               created_at, last_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                new.name,
                new.full_name,
                new.avatar,
                new.age,
                new.gender.to_string(),
                new.category.to_string(),
                new.prompt,
                new.description,
                new.like_probability,
                new.comment_probability,
                new.follow_probability,
                new.unfollow_probability,
                new.repost_probability,
                now.to_rfc3339(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        Ok(Bot {
            id,
            name: new.name.clone(),
            full_name: new.full_name.clone(),
            avatar: new.avatar.clone(),
            age: new.age,
            gender: new.gender,
            category: new.category,
            prompt: new.prompt.clone(),
            description: new.description.clone(),
            like_probability: new.like_probability,
            comment_probability: new.comment_probability,
            follow_probability: new.follow_probability,
            unfollow_probability: new.unfollow_probability,
            repost_probability: new.repost_probability,
            created_at: now,
            last_active: now,
        })
    }

    /// Remove a bot row. Used to roll back a creation whose platform
    /// registration failed; frees the username for later attempts.
    pub fn delete_bot(&self, bot_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM bots WHERE id = ?1", params![bot_id])?;
        Ok(())
    }

    /// Fetch a bot by id.
    pub fn bot_by_id(&self, id: i64) -> Result<Option<Bot>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BOT_SELECT} WHERE id = ?1"))?;
        let bot = stmt.query_row(params![id], bot_from_row).ok();
        Ok(bot)
    }

    /// Fetch a bot by its unique name.
    pub fn bot_by_name(&self, name: &str) -> Result<Option<Bot>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BOT_SELECT} WHERE name = ?1"))?;
        let bot = stmt.query_row(params![name], bot_from_row).ok();
        Ok(bot)
    }

    /// All bots, optionally restricted to one category.
    pub fn bots(&self, category: Option<BotCategory>) -> Result<Vec<Bot>> {
        let (sql, param): (String, Vec<String>) = match category {
            Some(cat) => (
                format!("{BOT_SELECT} WHERE category = ?1 ORDER BY id"),
                vec![cat.to_string()],
            ),
            None => (format!("{BOT_SELECT} ORDER BY id"), Vec::new()),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(param.iter()), bot_from_row)?;

        let mut bots = Vec::new();
        for row in rows {
            bots.push(row?);
        }
        Ok(bots)
    }

    /// Total bot count.
    pub fn count_bots(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM bots", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Per-category bot counts.
    pub fn count_bots_by_category(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category, COUNT(*) FROM bots GROUP BY category ORDER BY category")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Stamp a bot's last-active time with now.
    pub fn touch_last_active(&self, bot_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE bots SET last_active = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), bot_id],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Activity ledger
    // -----------------------------------------------------------------------

    /// Whether an activity already exists for (bot, kind, target).
    pub fn activity_exists(&self, bot_id: i64, kind: ActivityKind, target_id: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM activities
             WHERE bot_id = ?1 AND activity_type = ?2 AND target_id = ?3)",
            params![bot_id, kind.to_string(), target_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Append an activity record.
    pub fn record_activity(
        &self,
        bot_id: i64,
        kind: ActivityKind,
        target_id: &str,
        content: Option<&str>,
    ) -> Result<Activity> {
        let id = ulid::Ulid::new().to_string();
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO activities (id, bot_id, activity_type, target_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                bot_id,
                kind.to_string(),
                target_id,
                content,
                now.to_rfc3339()
            ],
        )?;

        Ok(Activity {
            id,
            bot_id,
            kind,
            target_id: target_id.to_string(),
            content: content.map(str::to_string),
            created_at: now,
        })
    }

    /// Most recent activities, newest first.
    pub fn recent_activities(&self, limit: u32) -> Result<Vec<Activity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, bot_id, activity_type, target_id, content, created_at
             FROM activities ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(Activity {
                id: row.get(0)?,
                bot_id: row.get(1)?,
                kind: row
                    .get::<_, String>(2)
                    .map(|s| ActivityKind::from_str(&s).unwrap_or(ActivityKind::Like))?,
                target_id: row.get(3)?,
                content: row.get(4)?,
                created_at: parse_timestamp(row.get::<_, String>(5)?),
            })
        })?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?);
        }
        Ok(activities)
    }

    /// Total activity count.
    pub fn count_activities(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Memories
    // -----------------------------------------------------------------------

    /// Store a memory for later comment context.
    pub fn create_memory(
        &self,
        bot_id: i64,
        content: &str,
        context_type: &str,
        context_id: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO memories (id, bot_id, content, context_type, context_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ulid::Ulid::new().to_string(),
                bot_id,
                content,
                context_type,
                context_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Memory texts for one (bot, context) pair, oldest first.
    pub fn memories_for_context(
        &self,
        bot_id: i64,
        context_type: &str,
        context_id: &str,
    ) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT content FROM memories
             WHERE bot_id = ?1 AND context_type = ?2 AND context_id = ?3
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![bot_id, context_type, context_id], |row| row.get(0))?;

        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }

    // -----------------------------------------------------------------------
    // Seen posts (fan-out dedup for the post watcher)
    // -----------------------------------------------------------------------

    /// Mark a post as seen. Returns true if it was new.
    pub fn mark_post_seen(&self, post_id: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO seen_posts (post_id, first_seen) VALUES (?1, ?2)",
            params![post_id, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }
}

const BOT_SELECT: &str = "SELECT id, name, full_name, avatar, age, gender, category, prompt,
        description, like_probability, comment_probability, follow_probability,
        unfollow_probability, repost_probability, created_at, last_active FROM bots";

fn bot_from_row(row: &Row<'_>) -> rusqlite::Result<Bot> {
    Ok(Bot {
        id: row.get(0)?,
        name: row.get(1)?,
        full_name: row.get(2)?,
        avatar: row.get(3)?,
        age: row.get(4)?,
        gender: match row.get::<_, String>(5)?.as_str() {
            "Female" => Gender::Female,
            _ => Gender::Male,
        },
        category: row
            .get::<_, String>(6)
            .map(|s| BotCategory::from_str(&s).unwrap_or(BotCategory::Neutral))?,
        prompt: row.get(7)?,
        description: row.get(8)?,
        like_probability: row.get(9)?,
        comment_probability: row.get(10)?,
        follow_probability: row.get(11)?,
        unfollow_probability: row.get(12)?,
        repost_probability: row.get(13)?,
        created_at: parse_timestamp(row.get::<_, String>(14)?),
        last_active: parse_timestamp(row.get::<_, String>(15)?),
    })
}

fn parse_timestamp(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
