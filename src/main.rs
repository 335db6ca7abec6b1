//! Colony — bot population runtime.
//!
//! Usage:
//!   colony run                  Start the daemon (growth + watcher + reactions)
//!   colony status               Show population and activity summary
//!   colony create-bot           Create one or more bots immediately
//!   colony react <bot-id>       Run one reaction decision for a bot
//!   colony post <bot-id>        Publish a generated post as a bot
//!   colony fanout <post> <by>   Fan out reactions to a post and process them

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use colony::config::{self, ColonyConfig};
use colony::content::{ContentGenerator, LlmClient};
use colony::engine::DecisionEngine;
use colony::fanout::{FanoutScheduler, ReactionQueue};
use colony::platform::{PlatformApi, PlatformClient};
use colony::population::PopulationController;
use colony::scheduler::TaskScheduler;
use colony::state::Database;
use colony::types::ScheduledReaction;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "colony")]
#[command(version = "0.1.0")]
#[command(about = "Autonomous bot population runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to colony home directory.
    #[arg(long, default_value = "~/.colony")]
    home: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the daemon: population growth, post watcher, reaction queue.
    Run,

    /// Show population and activity status.
    Status,

    /// Create bots immediately.
    CreateBot {
        /// How many bots to create.
        #[arg(default_value = "1")]
        count: u64,
    },

    /// Run one reaction decision for a bot, right now.
    React {
        /// Bot id.
        bot_id: i64,
    },

    /// Generate and publish a post authored by a bot.
    Post {
        /// Bot id.
        bot_id: i64,
    },

    /// Fan out reactions to a post and process them to completion.
    Fanout {
        /// Platform post id.
        post_id: String,

        /// Author username (excluded from the fan-out).
        author: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Resolve home directory
    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());

    match cli.command {
        Commands::Run => cmd_run(&home_dir).await,
        Commands::Status => cmd_status(&home_dir).await,
        Commands::CreateBot { count } => cmd_create_bot(&home_dir, count).await,
        Commands::React { bot_id } => cmd_react(&home_dir, bot_id).await,
        Commands::Post { bot_id } => cmd_post(&home_dir, bot_id).await,
        Commands::Fanout { post_id, author } => cmd_fanout(&home_dir, &post_id, &author).await,
    }
}

// ---------------------------------------------------------------------------
// Runtime wiring
// ---------------------------------------------------------------------------

struct Runtime {
    config: ColonyConfig,
    db: Arc<Mutex<Database>>,
    platform: Arc<dyn PlatformApi>,
    queue: Arc<Mutex<ReactionQueue>>,
    population: Arc<PopulationController>,
    fanout: Arc<FanoutScheduler>,
    engine: Arc<DecisionEngine>,
}

/// Load config and database and wire the services together.
fn build_runtime(home_dir: &Path) -> Result<Runtime> {
    if !home_dir.exists() {
        std::fs::create_dir_all(home_dir)
            .with_context(|| format!("Failed to create home directory: {}", home_dir.display()))?;
    }

    let config_path = home_dir.join("colony.toml");
    if !config_path.exists() {
        config::save_config(&ColonyConfig::default(), &config_path)?;
        eprintln!(
            "{} Wrote a default config to {:?}. Fill in the platform and model credentials, then rerun.",
            "Error:".red().bold(),
            config_path
        );
        std::process::exit(1);
    }

    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = cfg.resolved_db_path();
    let db = Database::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {db_path}"))?;
    let db = Arc::new(Mutex::new(db));

    let platform: Arc<dyn PlatformApi> = Arc::new(PlatformClient::new(
        &cfg.platform_api_url,
        &cfg.platform_token,
    ));
    let llm = Arc::new(LlmClient::new(&cfg.llm_api_url, &cfg.llm_api_key, &cfg.llm_model));
    let content = Arc::new(ContentGenerator::new(llm, cfg.temperature));

    let queue = Arc::new(Mutex::new(ReactionQueue::new()));
    let population = Arc::new(PopulationController::new(
        db.clone(),
        platform.clone(),
        content.clone(),
    ));
    let fanout = Arc::new(FanoutScheduler::new(
        db.clone(),
        queue.clone(),
        cfg.reaction_delay_min_secs,
        cfg.reaction_delay_max_secs,
    ));
    let engine = Arc::new(DecisionEngine::new(db.clone(), platform.clone(), content));

    Ok(Runtime {
        config: cfg,
        db,
        platform,
        queue,
        population,
        fanout,
        engine,
    })
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_run(home_dir: &Path) -> Result<()> {
    let rt = build_runtime(home_dir)?;
    let monitor_interval = Duration::from_secs(rt.config.monitor_interval_secs);

    println!(
        "{} Starting colony daemon ({} bots max, monitor every {:?})",
        ">>>".green().bold(),
        rt.config.max_bots_count,
        monitor_interval,
    );

    let mut scheduler = TaskScheduler::new();

    // Seed the population shortly after start, once
    {
        let population = rt.population.clone();
        let target = rt.config.initial_bots_count;
        scheduler.schedule("init_population", Duration::from_secs(5), None, move || {
            let population = population.clone();
            async move {
                population.initialize_population(target).await?;
                Ok(())
            }
        });
    }

    // Grow the population daily
    {
        let population = rt.population.clone();
        let (min, max, cap) = (
            rt.config.daily_growth_min,
            rt.config.daily_growth_max,
            rt.config.max_bots_count,
        );
        scheduler.schedule(
            "daily_growth",
            Duration::from_secs(3600),
            Some(Duration::from_secs(24 * 3600)),
            move || {
                let population = population.clone();
                async move {
                    population.daily_growth(min, max, cap).await?;
                    Ok(())
                }
            },
        );
    }

    // Drain due reactions
    {
        let engine = rt.engine.clone();
        let queue = rt.queue.clone();
        scheduler.schedule(
            "process_reactions",
            Duration::from_secs(30),
            Some(monitor_interval),
            move || {
                let engine = engine.clone();
                let queue = queue.clone();
                async move {
                    engine.process_due_reactions(&queue).await;
                    Ok(())
                }
            },
        );
    }

    // Watch for new posts and fan out reactions
    {
        let db = rt.db.clone();
        let platform = rt.platform.clone();
        let fanout = rt.fanout.clone();
        scheduler.schedule(
            "watch_posts",
            Duration::from_secs(15),
            Some(monitor_interval),
            move || {
                let db = db.clone();
                let platform = platform.clone();
                let fanout = fanout.clone();
                async move { watch_posts(&db, &platform, &fanout).await }
            },
        );
    }

    scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("\n{} Shutting down gracefully...", "<<<".red().bold());
    scheduler.stop().await;

    let pending = rt.queue.lock().await.len();
    if pending > 0 {
        info!("Dropping {pending} pending reactions on shutdown");
    }
    info!("Daemon shutdown complete");
    Ok(())
}

/// One watcher pass: any post not seen before triggers a fan-out. The first
/// pass only records the current posts so a fresh database does not react
/// to the platform's entire history.
async fn watch_posts(
    db: &Arc<Mutex<Database>>,
    platform: &Arc<dyn PlatformApi>,
    fanout: &Arc<FanoutScheduler>,
) -> Result<()> {
    let posts = platform.get_posts().await?;

    let bootstrapped = {
        let store = db.lock().await;
        store.kv_get("watch_bootstrapped")?.is_some()
    };
    if !bootstrapped {
        let store = db.lock().await;
        for post in &posts {
            store.mark_post_seen(&post.id)?;
        }
        store.kv_set("watch_bootstrapped", "1")?;
        info!("Post watcher primed with {} existing posts", posts.len());
        return Ok(());
    }

    for post in posts {
        let fresh = {
            let store = db.lock().await;
            store.mark_post_seen(&post.id)?
        };
        if fresh {
            info!("New post {} by {}", post.id, post.author);
            fanout.schedule_reactions_for_post(&post.id, &post.author).await?;
        }
    }
    Ok(())
}

async fn cmd_status(home_dir: &Path) -> Result<()> {
    let rt = build_runtime(home_dir)?;
    let db = rt.db.lock().await;

    let total = db.count_bots()?;
    let by_category = db.count_bots_by_category()?;
    let activities = db.count_activities()?;
    let recent = db.recent_activities(5)?;
    let last_growth = db
        .kv_get(colony::population::KV_LAST_GROWTH_AT)?
        .unwrap_or_else(|| "never".into());
    let last_created = db
        .kv_get(colony::population::KV_LAST_GROWTH_CREATED)?
        .unwrap_or_else(|| "0".into());

    println!();
    println!("{}", "=== Colony Status ===".bold());
    println!();
    println!("  {}:", "Population".bold());
    println!("    Total:    {} / {}", total, rt.config.max_bots_count);
    for (category, count) in by_category {
        println!("    {category:<12} {count}");
    }
    println!();
    println!("  {}:", "Growth".bold());
    println!("    Last run: {last_growth}");
    println!("    Created:  {last_created}");
    println!();
    println!("  {}:", "Activity".bold());
    println!("    Recorded: {activities}");
    for activity in recent {
        println!(
            "    {} bot {} -> {} ({})",
            activity.created_at.format("%m-%d %H:%M"),
            activity.bot_id,
            activity.target_id,
            activity.kind,
        );
    }
    println!();

    Ok(())
}

async fn cmd_create_bot(home_dir: &Path, count: u64) -> Result<()> {
    let rt = build_runtime(home_dir)?;

    for _ in 0..count {
        let bot = rt.population.create_random_bot().await?;
        println!(
            "{} Created bot {} ({}, {}, age {})",
            ">>>".green().bold(),
            bot.name.bold(),
            bot.category,
            bot.gender,
            bot.age,
        );
    }
    Ok(())
}

async fn cmd_react(home_dir: &Path, bot_id: i64) -> Result<()> {
    let rt = build_runtime(home_dir)?;

    let task = ScheduledReaction {
        id: ulid::Ulid::new(),
        bot_id,
        post_id: String::new(),
        due_at: Utc::now(),
    };
    let outcome = rt.engine.process_due_reaction(&task).await?;
    println!("{} Reaction outcome: {outcome}", ">>>".green().bold());
    Ok(())
}

async fn cmd_post(home_dir: &Path, bot_id: i64) -> Result<()> {
    let rt = build_runtime(home_dir)?;

    let post_id = rt.engine.create_post(bot_id).await?;
    println!("{} Published post {post_id}", ">>>".green().bold());
    Ok(())
}

async fn cmd_fanout(home_dir: &Path, post_id: &str, author: &str) -> Result<()> {
    let rt = build_runtime(home_dir)?;

    let summary = rt.fanout.schedule_reactions_for_post(post_id, author).await?;
    println!(
        "{} Fan-out for {}: {} eligible, {} visible, {} scheduled",
        ">>>".green().bold(),
        summary.post_id,
        summary.total_bots,
        summary.visible_bots,
        summary.scheduled,
    );

    // Process every scheduled reaction before exiting
    loop {
        let pending = rt.fanout.pending_count().await;
        if pending == 0 {
            break;
        }
        println!("{} {pending} reactions pending", ">>>".green().bold());

        let next = { rt.queue.lock().await.next_due() };
        let Some(next) = next else { break };

        let wait = (next - Utc::now()).num_milliseconds().max(0) as u64;
        tokio::time::sleep(Duration::from_millis(wait + 100)).await;
        rt.engine.process_due_reactions(&rt.queue).await;
    }

    println!("{} All reactions processed", ">>>".green().bold());
    Ok(())
}
