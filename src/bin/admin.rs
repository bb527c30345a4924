//! CLI administration tool for linktrail.
//!
//! Provides commands for viewing statistics, checking the database, and
//! managing click messages that ended up in the dead-letter stream, without
//! going through the HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # View statistics
//! cargo run --bin admin -- stats
//! cargo run --bin admin -- stats --code Ab12CdE
//!
//! # Check database connection
//! cargo run --bin admin -- db check
//!
//! # Inspect and recover dead-lettered clicks
//! cargo run --bin admin -- dead-letters list --limit 20
//! cargo run --bin admin -- dead-letters replay 1735732800000-0
//! cargo run --bin admin -- dead-letters replay --all
//! cargo run --bin admin -- dead-letters purge
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` (or `DB_*` components): PostgreSQL connection string
//! - `BROKER_URL` (or `REDIS_URL`): Redis holding the click streams
//! - `CLICK_STREAM`, `CLICK_DEAD_LETTER_STREAM`, `CLICK_CONSUMER_GROUP`

use linktrail::config::{Config, mask_connection_string};
use linktrail::domain::repositories::{ClickRepository, LinkRepository};
use linktrail::infrastructure::broker::{RedisStreamBroker, RedisStreamSettings};
use linktrail::infrastructure::persistence::{PgClickRepository, PgLinkRepository};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// CLI tool for managing linktrail.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Commands {
    /// Show link and click counts
    Stats {
        /// Only count clicks of this short code
        #[arg(short, long)]
        code: Option<String>,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Inspect and recover dead-lettered click messages
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterAction,
    },
}

/// Database operation subcommands.
#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,
}

/// Dead-letter subcommands.
#[derive(Subcommand)]
enum DeadLetterAction {
    /// List dead letters, oldest first
    List {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Re-publish dead letters to the click stream
    Replay {
        /// Dead-letter id to replay
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,

        /// Replay every dead letter
        #[arg(long)]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Delete all dead letters
    Purge {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Stats { code } => handle_stats(&connect_db(&config).await?, code).await?,
        Commands::Db { action } => handle_db_action(action, &config).await?,
        Commands::DeadLetters { action } => {
            handle_dead_letters(action, &connect_broker(&config).await?).await?
        }
    }

    Ok(())
}

async fn connect_db(config: &Config) -> Result<PgPool> {
    PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")
}

async fn connect_broker(config: &Config) -> Result<RedisStreamBroker> {
    let Some(url) = &config.broker_url else {
        bail!("BROKER_URL or REDIS_URL must be set to manage dead letters");
    };

    let settings = RedisStreamSettings {
        stream: config.click_stream.clone(),
        dead_letter_stream: config.click_dead_letter_stream.clone(),
        group: config.click_consumer_group.clone(),
        redelivery_backoff: Duration::from_millis(config.click_redelivery_backoff_ms),
    };

    RedisStreamBroker::connect(url, settings)
        .await
        .with_context(|| format!("Failed to connect to broker {}", mask_connection_string(url)))
}

/// Displays link and click totals.
///
/// With `--code`, the click count is restricted to that code.
async fn handle_stats(pool: &PgPool, code: Option<String>) -> Result<()> {
    println!("{}", "📊 Statistics".bright_blue().bold());
    println!();

    let pool = Arc::new(pool.clone());
    let links = PgLinkRepository::new(pool.clone());
    let clicks = PgClickRepository::new(pool);

    let links_count = links
        .count()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to count links: {}", e))?;
    let clicks_count = clicks
        .count_clicks(code.clone(), None, None)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to count clicks: {}", e))?;

    println!(
        "  Links:   {}",
        links_count.to_string().bright_green().bold()
    );
    match code {
        Some(code) => println!(
            "  Clicks:  {} (code {})",
            clicks_count.to_string().bright_green().bold(),
            code.cyan()
        ),
        None => println!(
            "  Clicks:  {}",
            clicks_count.to_string().bright_green().bold()
        ),
    }
    println!();

    Ok(())
}

/// Handles database diagnostic commands.
async fn handle_db_action(action: DbAction, config: &Config) -> Result<()> {
    match action {
        DbAction::Check => {
            println!(
                "{} {}",
                "🔍 Checking database connection:".bright_blue(),
                mask_connection_string(&config.database_url).bright_black()
            );

            let pool = connect_db(config).await?;
            sqlx::query("SELECT 1").fetch_one(&pool).await?;

            println!("{}", "✅ Database connection OK".green().bold());
        }
    }

    Ok(())
}

/// Dispatches dead-letter commands.
async fn handle_dead_letters(action: DeadLetterAction, broker: &RedisStreamBroker) -> Result<()> {
    match action {
        DeadLetterAction::List { limit } => list_dead_letters(broker, limit).await,
        DeadLetterAction::Replay { id, all, yes } => replay_dead_letters(broker, id, all, yes).await,
        DeadLetterAction::Purge { yes } => purge_dead_letters(broker, yes).await,
    }
}

/// Lists dead letters.
///
/// # Output Format
///
/// ```text
/// 💀 Dead letters (clicks:dead)
///   Unsettled clicks in clicks: 3
///
///   ID                   Original             Tries  Reason
///   ─────────────────────────────────────────────────────────────────
///   1735732800000-0      1735732700000-0      5      Store unavailable: ...
/// ```
async fn list_dead_letters(broker: &RedisStreamBroker, limit: usize) -> Result<()> {
    println!(
        "{} ({})",
        "💀 Dead letters".bright_blue().bold(),
        broker.settings().dead_letter_stream
    );
    let backlog = broker
        .backlog()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read click backlog: {}", e))?;
    println!(
        "  Unsettled clicks in {}: {}",
        broker.settings().stream,
        backlog.to_string().bright_white().bold()
    );
    println!();

    let letters = broker
        .list_dead_letters(limit)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list dead letters: {}", e))?;

    if letters.is_empty() {
        println!("{}", "  No dead letters".green());
        return Ok(());
    }

    println!(
        "  {:<20} {:<20} {:<6} {}",
        "ID".bright_white().bold(),
        "Original".bright_white().bold(),
        "Tries".bright_white().bold(),
        "Reason".bright_white().bold()
    );
    println!("  {}", "─".repeat(75).bright_black());

    for letter in &letters {
        println!(
            "  {:<20} {:<20} {:<6} {}",
            letter.id.cyan(),
            letter.original_id.bright_black(),
            letter.attempts,
            letter.reason.yellow()
        );
        println!("  {}", letter.payload.bright_black());
    }

    println!();
    println!(
        "  Shown: {}",
        letters.len().to_string().bright_white().bold()
    );
    println!();

    Ok(())
}

/// Re-publishes dead letters to the click stream with confirmation.
///
/// Replayed clicks keep their event id, so a click that was in fact recorded
/// before being dead-lettered is not counted twice.
async fn replay_dead_letters(
    broker: &RedisStreamBroker,
    id: Option<String>,
    all: bool,
    skip_confirm: bool,
) -> Result<()> {
    println!("{}", "🔁 Replay dead letters".bright_blue().bold());
    println!();

    let prompt = match (&id, all) {
        (_, true) => "Replay ALL dead letters?".to_string(),
        (Some(id), false) => format!("Replay dead letter {}?", id),
        (None, false) => bail!("Either a dead-letter id or --all is required"),
    };

    if !skip_confirm && !confirm(&prompt, true)? {
        println!("{}", "❌ Cancelled".red());
        return Ok(());
    }

    let replayed = if all {
        broker
            .replay_all_dead_letters()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to replay dead letters: {}", e))?
    } else {
        let id = id.context("dead-letter id is required")?;
        let found = broker
            .replay_dead_letter(&id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to replay dead letter: {}", e))?;
        if !found {
            bail!("Dead letter {} not found", id);
        }
        1
    };

    println!(
        "{} {}",
        "✅ Replayed:".green().bold(),
        replayed.to_string().bright_white().bold()
    );
    println!();

    Ok(())
}

/// Deletes the dead-letter stream with confirmation.
async fn purge_dead_letters(broker: &RedisStreamBroker, skip_confirm: bool) -> Result<()> {
    println!("{}", "🗑  Purge dead letters".bright_blue().bold());
    println!();

    if !skip_confirm && !confirm("Delete ALL dead letters? This cannot be undone", false)? {
        println!("{}", "❌ Cancelled".red());
        return Ok(());
    }

    let purged = broker
        .purge_dead_letters()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to purge dead letters: {}", e))?;

    println!(
        "{} {}",
        "✅ Deleted:".green().bold(),
        purged.to_string().bright_white().bold()
    );
    println!();

    Ok(())
}

fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}
