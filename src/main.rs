//! # Main — Operational CLI
//!
//! Thin operations tool over the reward ledger library: applies schema
//! migrations, fires award triggers by hand, and inspects balances and
//! history. The production trigger sources (attendance, friend, challenge
//! endpoints) call the library directly; this binary exists for operators
//! and for exercising a deployment end to end.
//!
//! Results print as JSON lines for scripting. `DATABASE_URL` (flag or env)
//! selects the target database; `LOG_FORMAT=json` switches logging to JSON
//! for cluster deployments.

use anyhow::Result;
use clap::{Parser, Subcommand};

use clover::clock::DayClock;
use clover::db::{ChallengeCategory, Database};
use clover::rewards::RewardService;

#[derive(Parser)]
#[command(name = "clover", about = "Daily reward & interaction throttle ledger")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply schema migrations (idempotent)
    Migrate,
    /// Seed the mascot experience row for a user
    CreateMascot {
        #[arg(long)]
        user: i64,
    },
    /// Record a daily attendance check-in (attendance + streak bonus)
    CheckIn {
        #[arg(long)]
        user: i64,
    },
    /// Record a like from one user to another
    Like {
        #[arg(long)]
        sender: i64,
        #[arg(long)]
        receiver: i64,
    },
    /// Record a friend interaction (active sender, passive receiver)
    Friend {
        #[arg(long)]
        sender: i64,
        #[arg(long)]
        receiver: i64,
    },
    /// Mark a challenge category completed for today
    Challenge {
        #[arg(long)]
        user: i64,
        /// One of: exercise, study, diet, hobby
        #[arg(long, value_parser = parse_category)]
        category: ChallengeCategory,
    },
    /// Spend points from a user's balance
    Spend {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "manual spend")]
        description: String,
    },
    /// Show the current point balance
    Balance {
        #[arg(long)]
        user: i64,
    },
    /// Show recent point transactions, newest first
    History {
        #[arg(long)]
        user: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Show mascot experience and level
    Experience {
        #[arg(long)]
        user: i64,
    },
    /// Show remaining full-allowance likes toward a receiver today
    RemainingLikes {
        #[arg(long)]
        sender: i64,
        #[arg(long)]
        receiver: i64,
    },
}

fn parse_category(s: &str) -> Result<ChallengeCategory, String> {
    ChallengeCategory::parse(s)
        .ok_or_else(|| format!("unknown category '{s}' (expected: exercise, study, diet, hobby)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for K8s, human-readable otherwise
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let db = Database::connect(&cli.database_url).await?;
    let service = RewardService::new(db.clone(), DayClock::default());

    match cli.command {
        Commands::Migrate => {
            db.run_migrations().await?;
            println!("{}", serde_json::json!({ "migrated": true }));
        }
        Commands::CreateMascot { user } => {
            db.create_mascot(user).await?;
            println!("{}", serde_json::json!({ "user": user, "mascot": true }));
        }
        Commands::CheckIn { user } => {
            let award = service.check_in(user).await?;
            println!("{}", serde_json::to_string(&award)?);
        }
        Commands::Like { sender, receiver } => {
            let award = service.record_like(sender, receiver).await?;
            println!("{}", serde_json::to_string(&award)?);
        }
        Commands::Friend { sender, receiver } => {
            let award = service.friend_interaction(sender, receiver).await?;
            println!("{}", serde_json::to_string(&award)?);
        }
        Commands::Challenge { user, category } => {
            let outcome = service.complete_challenge(user, category).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Spend { user, amount, description } => {
            let outcome = service.spend_points(user, amount, None, &description).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Balance { user } => {
            let balance = db.balance(user).await?;
            println!("{}", serde_json::json!({ "user": user, "balance": balance }));
        }
        Commands::History { user, limit, offset } => {
            let rows = db.point_history(user, limit, offset).await?;
            println!("{}", serde_json::to_string(&rows)?);
        }
        Commands::Experience { user } => match db.get_experience(user).await? {
            Some(exp) => println!("{}", serde_json::to_string(&exp)?),
            None => println!("{}", serde_json::json!({ "user": user, "mascot": false })),
        },
        Commands::RemainingLikes { sender, receiver } => {
            let remaining = service.remaining_likes(sender, receiver).await?;
            println!(
                "{}",
                serde_json::json!({ "sender": sender, "receiver": receiver, "remaining": remaining })
            );
        }
    }
    Ok(())
}
