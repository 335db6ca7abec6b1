//! Content generation for bot personas, comments, posts, and memories.

pub mod llm;

pub use llm::LlmClient;

use crate::error::Result;
use crate::types::{BotCategory, Gender};
use async_trait::async_trait;
use std::sync::Arc;

/// The text-generation seam. Fails with a generation error on empty or
/// failed output; the core never retries generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str, max_tokens: u32, temperature: f64) -> Result<String>;
}

/// DiceBear styles used for bot avatars.
pub const AVATAR_STYLES: &[&str] = &[
    "adventurer-neutral",
    "avataaars-neutral",
    "big-ears-neutral",
    "bottts-neutral",
    "dylan",
    "fun-emoji",
    "glass",
    "pixel-art-neutral",
    "thumbs",
    "shapes",
];

/// Build a randomly seeded DiceBear avatar URL.
pub fn avatar_url(style: &str) -> String {
    format!(
        "https://api.dicebear.com/7.x/{style}/svg?seed={}",
        ulid::Ulid::new()
    )
}

/// Usernames are a single token: no spaces, no '@', bounded length.
pub fn sanitize_username(raw: &str) -> String {
    let mut name: String = raw
        .trim()
        .replace(['\n', ' '], "_")
        .replace('@', "");
    name.truncate(15);
    name
}

/// Prompt builder over a text generator.
pub struct ContentGenerator {
    llm: Arc<dyn TextGenerator>,
    temperature: f64,
}

impl ContentGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, temperature: f64) -> Self {
        Self { llm, temperature }
    }

    /// A short bio matching the bot's category, age, and gender.
    pub async fn description(&self, category: BotCategory, age: u32, gender: Gender) -> Result<String> {
        let persona = category.profile().description;
        let prompt = format!(
            "You are a bot that writes social media bios. Write ONLY the bio. Do not write \
             anything else. Do not write explanations, greetings, or extra words.\n\n\
             Write a short social media bio for a {age}-year-old {gender} who is {persona}.\n\
             The bio must be 1 to 3 sentences. The style is casual. The bio must reflect the \
             personality. Do NOT use hashtags. Do NOT use emojis. Do NOT add any extra text. \
             Only output the bio itself."
        );
        self.llm.generate_text(&prompt, 100, 0.7).await
    }

    /// A comment on a post, optionally informed by up to three memories.
    pub async fn comment(
        &self,
        category: BotCategory,
        post_text: &str,
        memories: &[String],
    ) -> Result<String> {
        let mut memory_context = String::new();
        if !memories.is_empty() {
            memory_context.push_str("Here are some of your past interactions and thoughts:\n");
            for memory in memories.iter().take(3) {
                memory_context.push_str(&format!("- {memory}\n"));
            }
        }

        let prompt = format!(
            "{}\n\n{memory_context}\n\nSomeone posted this on social media:\n\"{post_text}\"\n\n\
             Write ONLY a short, realistic comment as a response. Do not write anything else. \
             Do not write explanations, greetings, or extra words. The comment must be 1 or 2 \
             sentences. Be authentic and match the tone of your character. Only output the \
             comment itself.",
            category.prompt()
        );
        self.llm.generate_text(&prompt, 150, self.temperature).await
    }

    /// A new post in the bot's voice.
    pub async fn post(&self, category: BotCategory) -> Result<String> {
        let prompt = format!(
            "{}\n\nWrite ONLY a short, realistic social media post. Do not write anything else. \
             Do not write explanations, greetings, or extra words. The post must be 1 to 3 \
             sentences. Be authentic and match the tone of your character. Only output the post \
             itself.",
            category.prompt()
        );
        self.llm.generate_text(&prompt, 200, self.temperature).await
    }

    /// A one-sentence internal memory about some content.
    pub async fn memory(
        &self,
        category: BotCategory,
        content: &str,
        context_type: &str,
    ) -> Result<String> {
        let prompt = format!(
            "{}\n\nYou just saw this {context_type}:\n\"{content}\"\n\n\
             Write ONLY a short memory (1 sentence) about how you feel about this \
             {context_type}. This is your internal thought, not something you would say \
             publicly. Do not write anything else. Do not write explanations, greetings, or \
             extra words. Only output the memory itself.",
            category.prompt()
        );
        self.llm.generate_text(&prompt, 100, self.temperature).await
    }

    /// A candidate username for the category. Uniqueness is the caller's job.
    pub async fn username(&self, category: BotCategory) -> Result<String> {
        let persona = category.profile().description;
        let prompt = format!(
            "You are a bot that creates usernames. Write ONLY the username. Do not write \
             anything else. Do not write explanations, greetings, or extra words.\n\n\
             Create a unique social media username for someone who is {persona}.\n\
             The username must be a single word or words connected with underscores. No spaces, \
             no special characters, no numbers. The username must be short (max 20 characters) \
             and memorable. Only output the username itself.\n\
             Examples:\nfunny_friend\nmusiclover\nhappycat"
        );
        let raw = self.llm.generate_text(&prompt, 50, 0.8).await?;
        Ok(sanitize_username(&raw))
    }

    /// A realistic full name for the given gender and age.
    pub async fn full_name(&self, gender: Gender, age: u32) -> Result<String> {
        let prompt = format!(
            "You are a bot that creates realistic full names for people. Write ONLY the full \
             name (first and last name). Do not write anything else. Do not write explanations, \
             greetings, or extra words.\n\n\
             Create a realistic full name for a {age}-year-old {gender}.\n\
             The name should be common, natural, and appropriate for the gender and age. Only \
             output the full name itself.\n\
             Examples:\nEmily Carter\nJames Lee\nAva Johnson"
        );
        let name = self.llm.generate_text(&prompt, 20, 0.8).await?;
        Ok(name.trim().to_string())
    }
}
