//! Shared types used across the colony runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Baseline behavior for a bot category, before per-bot jitter.
#[derive(Debug, Clone, Copy)]
pub struct CategoryProfile {
    pub like: f64,
    pub comment: f64,
    pub follow: f64,
    pub unfollow: f64,
    pub repost: f64,
    pub description: &'static str,
}

/// Fixed behavioral archetypes. Each maps to a static profile and a
/// persona prompt used for content generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotCategory {
    Fan,
    Hater,
    Silent,
    Random,
    Neutral,
    Humorous,
    Provocative,
    RolePlayer,
}

impl BotCategory {
    pub const ALL: [BotCategory; 8] = [
        Self::Fan,
        Self::Hater,
        Self::Silent,
        Self::Random,
        Self::Neutral,
        Self::Humorous,
        Self::Provocative,
        Self::RolePlayer,
    ];

    pub fn profile(self) -> CategoryProfile {
        match self {
            Self::Fan => CategoryProfile {
                like: 0.8,
                comment: 0.5,
                follow: 0.7,
                unfollow: 0.1,
                repost: 0.2,
                description: "Supportive, enthusiastic, positive",
            },
            Self::Hater => CategoryProfile {
                like: 0.1,
                comment: 0.4,
                follow: 0.2,
                unfollow: 0.6,
                repost: 0.05,
                description: "Critical, negative, provocative",
            },
            Self::Silent => CategoryProfile {
                like: 0.4,
                comment: 0.1,
                follow: 0.3,
                unfollow: 0.2,
                repost: 0.05,
                description: "Observant, rarely comments, occasional likes",
            },
            Self::Random => CategoryProfile {
                like: 0.5,
                comment: 0.3,
                follow: 0.4,
                unfollow: 0.4,
                repost: 0.1,
                description: "Unpredictable, varied behavior",
            },
            Self::Neutral => CategoryProfile {
                like: 0.5,
                comment: 0.3,
                follow: 0.5,
                unfollow: 0.3,
                repost: 0.1,
                description: "Balanced, rational, thoughtful",
            },
            Self::Humorous => CategoryProfile {
                like: 0.7,
                comment: 0.6,
                follow: 0.6,
                unfollow: 0.2,
                repost: 0.15,
                description: "Funny, sarcastic, meme-oriented",
            },
            Self::Provocative => CategoryProfile {
                like: 0.3,
                comment: 0.7,
                follow: 0.4,
                unfollow: 0.5,
                repost: 0.1,
                description: "Challenging, questioning, debate-oriented",
            },
            Self::RolePlayer => CategoryProfile {
                like: 0.6,
                comment: 0.5,
                follow: 0.5,
                unfollow: 0.3,
                repost: 0.15,
                description: "In-character, consistent persona",
            },
        }
    }

    /// Persona prompt prefixed to every content-generation request.
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Fan => "You are an enthusiastic fan who loves the content. Your comments are supportive and positive.",
            Self::Hater => "You are critical of the content. Your comments point out flaws and are sometimes negative.",
            Self::Silent => "You rarely comment, but when you do, it's thoughtful and concise.",
            Self::Random => "Your behavior is unpredictable. Sometimes supportive, sometimes critical, sometimes off-topic.",
            Self::Neutral => "You are balanced and rational. Your comments are thoughtful and objective.",
            Self::Humorous => "You love humor and memes. Your comments are funny, sometimes sarcastic.",
            Self::Provocative => "You like to challenge ideas. Your comments ask difficult questions and provoke thought.",
            Self::RolePlayer => "You have invented a consistent persona for yourself. Your comments stay in character and reflect that persona.",
        }
    }
}

impl fmt::Display for BotCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fan => write!(f, "fan"),
            Self::Hater => write!(f, "hater"),
            Self::Silent => write!(f, "silent"),
            Self::Random => write!(f, "random"),
            Self::Neutral => write!(f, "neutral"),
            Self::Humorous => write!(f, "humorous"),
            Self::Provocative => write!(f, "provocative"),
            Self::RolePlayer => write!(f, "role_player"),
        }
    }
}

impl std::str::FromStr for BotCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fan" => Ok(Self::Fan),
            "hater" => Ok(Self::Hater),
            "silent" => Ok(Self::Silent),
            "random" => Ok(Self::Random),
            "neutral" => Ok(Self::Neutral),
            "humorous" => Ok(Self::Humorous),
            "provocative" => Ok(Self::Provocative),
            "role_player" => Ok(Self::RolePlayer),
            other => Err(format!("unknown bot category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => write!(f, "Male"),
            Self::Female => write!(f, "Female"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bots
// ---------------------------------------------------------------------------

/// A simulated account with behavioral parameters driving automated actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub avatar: String,
    pub age: u32,
    pub gender: Gender,
    pub category: BotCategory,
    pub prompt: String,
    pub description: String,
    pub like_probability: f64,
    pub comment_probability: f64,
    pub follow_probability: f64,
    pub unfollow_probability: f64,
    pub repost_probability: f64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Attributes for a bot about to be created (id assigned by the store).
#[derive(Debug, Clone)]
pub struct NewBot {
    pub name: String,
    pub full_name: String,
    pub avatar: String,
    pub age: u32,
    pub gender: Gender,
    pub category: BotCategory,
    pub prompt: String,
    pub description: String,
    pub like_probability: f64,
    pub comment_probability: f64,
    pub follow_probability: f64,
    pub unfollow_probability: f64,
    pub repost_probability: f64,
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

/// Kinds of recorded bot actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Like,
    Comment,
    Follow,
    Unfollow,
    Post,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Like => write!(f, "like"),
            Self::Comment => write!(f, "comment"),
            Self::Follow => write!(f, "follow"),
            Self::Unfollow => write!(f, "unfollow"),
            Self::Post => write!(f, "post"),
        }
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "comment" => Ok(Self::Comment),
            "follow" => Ok(Self::Follow),
            "unfollow" => Ok(Self::Unfollow),
            "post" => Ok(Self::Post),
            other => Err(format!("unknown activity kind: {other}")),
        }
    }
}

/// An executed, recorded action by a bot against a target entity.
/// At most one activity exists per (bot_id, kind, target_id): the decision
/// engine checks the ledger before acting and records only after success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub bot_id: i64,
    pub kind: ActivityKind,
    pub target_id: String,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored bot memory, used as context for later comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub bot_id: i64,
    pub content: String,
    pub context_type: String,
    pub context_id: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Posts & reactions
// ---------------------------------------------------------------------------

/// A post read from the platform backend. The core never mutates posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub text: String,
    /// Raw date string as the backend encodes it; parsed lazily because the
    /// backend mixes several encodings.
    pub date: Option<String>,
}

/// A pending reaction attempt, held only in process memory.
#[derive(Debug, Clone)]
pub struct ScheduledReaction {
    pub id: Ulid,
    pub bot_id: i64,
    pub post_id: String,
    pub due_at: DateTime<Utc>,
}

/// Result of a fan-out pass for one post.
#[derive(Debug, Clone, Serialize)]
pub struct FanoutSummary {
    pub post_id: String,
    pub total_bots: usize,
    pub visible_bots: usize,
    pub scheduled: usize,
}

/// Terminal outcome of processing one due reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// At least one action (like or comment) was executed and recorded.
    Success { post_id: String },
    /// Dedup skips, lost Bernoulli draws, or contained call failures.
    NoAction,
    /// No candidate post inside the trailing 3-day window.
    NoRecentPosts,
}

impl fmt::Display for ReactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { post_id } => write!(f, "success({post_id})"),
            Self::NoAction => write!(f, "no_action"),
            Self::NoRecentPosts => write!(f, "no_recent_posts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn category_roundtrips_through_display() {
        for cat in BotCategory::ALL {
            let parsed = BotCategory::from_str(&cat.to_string()).unwrap();
            assert_eq!(parsed, cat);
        }
    }

    #[test]
    fn profiles_respect_documented_bounds() {
        for cat in BotCategory::ALL {
            let p = cat.profile();
            for base in [p.like, p.comment, p.follow, p.unfollow] {
                assert!((0.1..=0.9).contains(&base), "{cat}: {base}");
            }
            assert!((0.0..=0.3).contains(&p.repost), "{cat}: {}", p.repost);
        }
    }
}
