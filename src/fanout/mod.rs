//! Per-post reaction fan-out: visibility sampling, participation draws, and
//! the in-memory queue of delayed reaction attempts.
//!
//! The queue is process-local and lost on restart; scheduled reactions are
//! best-effort by design.

use crate::error::Result;
use crate::state::Database;
use crate::types::{Bot, FanoutSummary, ScheduledReaction};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use ulid::Ulid;

/// Visible-subset ratio bounds for a new post.
const VISIBILITY_RATIO_MIN: f64 = 0.3;
const VISIBILITY_RATIO_MAX: f64 = 0.8;

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Time-ordered index of pending reactions. Entries are keyed by
/// (due time, ulid) so each enqueue instant is unique per (bot, post).
#[derive(Default)]
pub struct ReactionQueue {
    entries: BTreeMap<(DateTime<Utc>, Ulid), ScheduledReaction>,
}

impl ReactionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reaction: ScheduledReaction) {
        self.entries
            .insert((reaction.due_at, reaction.id), reaction);
    }

    /// Remove and return every entry due at or before `now`, oldest first.
    /// Removal happens here, before processing, so a drained entry is never
    /// seen again even if its processing later fails.
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledReaction> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Due time of the earliest pending entry, if any.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.entries.keys().next().map(|(t, _)| *t)
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Schedules delayed reaction attempts for new posts.
pub struct FanoutScheduler {
    db: Arc<Mutex<Database>>,
    queue: Arc<Mutex<ReactionQueue>>,
    delay_min_secs: u64,
    delay_max_secs: u64,
}

impl FanoutScheduler {
    pub fn new(
        db: Arc<Mutex<Database>>,
        queue: Arc<Mutex<ReactionQueue>>,
        delay_min_secs: u64,
        delay_max_secs: u64,
    ) -> Self {
        Self {
            db,
            queue,
            delay_min_secs,
            delay_max_secs,
        }
    }

    /// Select the bots that will see this post and enqueue a delayed
    /// reaction attempt for each one that decides to participate.
    pub async fn schedule_reactions_for_post(
        &self,
        post_id: &str,
        author: &str,
    ) -> Result<FanoutSummary> {
        let bots = {
            let db = self.db.lock().await;
            db.bots(None)?
        };
        let eligible: Vec<Bot> = bots.into_iter().filter(|b| b.name != author).collect();

        let (reactions, visible) = {
            let mut rng = rand::thread_rng();
            let ratio = rng.gen_range(VISIBILITY_RATIO_MIN..=VISIBILITY_RATIO_MAX);
            plan_fanout(
                &eligible,
                post_id,
                ratio,
                self.delay_min_secs..=self.delay_max_secs,
                &mut rng,
            )
        };

        let summary = FanoutSummary {
            post_id: post_id.to_string(),
            total_bots: eligible.len(),
            visible_bots: visible,
            scheduled: reactions.len(),
        };

        {
            let mut queue = self.queue.lock().await;
            for reaction in reactions {
                debug!(
                    "Scheduled reaction of bot {} to post {} at {}",
                    reaction.bot_id, reaction.post_id, reaction.due_at
                );
                queue.push(reaction);
            }
        }

        info!(
            "Fan-out for post {}: {} eligible, {} visible, {} scheduled",
            summary.post_id, summary.total_bots, summary.visible_bots, summary.scheduled
        );
        Ok(summary)
    }

    /// Number of reactions waiting in the queue.
    pub async fn pending_count(&self) -> usize {
        self.queue.lock().await.len()
    }
}

/// Draw the visible subset and the participation/delay decisions.
/// Returns the planned reactions and the visible-subset size.
fn plan_fanout<R: Rng>(
    eligible: &[Bot],
    post_id: &str,
    visibility_ratio: f64,
    delay_secs: std::ops::RangeInclusive<u64>,
    rng: &mut R,
) -> (Vec<ScheduledReaction>, usize) {
    let visible_count = (eligible.len() as f64 * visibility_ratio) as usize;
    let visible = rand::seq::index::sample(rng, eligible.len(), visible_count);

    let now = Utc::now();
    let mut reactions = Vec::new();
    for idx in visible.iter() {
        let bot = &eligible[idx];
        let participation = bot
            .like_probability
            .max(bot.comment_probability)
            .clamp(0.0, 1.0);
        if !rng.gen_bool(participation) {
            continue;
        }

        let delay = rng.gen_range(delay_secs.clone());
        reactions.push(ScheduledReaction {
            id: Ulid::new(),
            bot_id: bot.id,
            post_id: post_id.to_string(),
            due_at: now + ChronoDuration::seconds(delay as i64),
        });
    }

    (reactions, visible_count)
}
