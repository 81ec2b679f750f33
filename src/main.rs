use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod config;
mod db;
mod models;
mod report;
mod risk;
mod tracking;

use crate::db::TransitionOutcome;
use crate::risk::RiskScorer;

#[derive(Parser)]
#[command(name = "phishsim")]
#[command(about = "Phishing simulation tracker and user vulnerability scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the demo users
    Seed,
    /// Import historical campaign results from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Send a simulated phishing email to a user
    Launch {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = tracking::DEFAULT_CAMPAIGN)]
        campaign: String,
    },
    /// Record that a tracking link was followed
    Track {
        #[arg(long)]
        log_id: i64,
        #[arg(long, default_value = "Unknown")]
        user_agent: String,
    },
    /// Record that a user reported a simulated email
    ReportAttack {
        #[arg(long)]
        log_id: i64,
    },
    /// Clear a user's campaign history
    Reset {
        #[arg(long)]
        email: String,
    },
    /// Score users by vulnerability
    #[command(group(
        ArgGroup::new("scope")
            .args(["department", "email"])
            .multiple(false)
    ))]
    Score {
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown audit report
    #[command(group(
        ArgGroup::new("scope")
            .args(["department", "email"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value = "security_report.md")]
        out: PathBuf,
    },
}

async fn recompute(pool: &PgPool, scorer: &RiskScorer, email: &str, event: &str) -> anyhow::Result<()> {
    let profiles = db::fetch_profiles(pool, None, Some(email)).await?;
    if let Some(profile) = profiles.first() {
        let score = scorer.score(&profile.department, &profile.history);
        tracing::info!(%email, event, score, campaigns = profile.history.len(), "score recomputed");
        println!("{email} now scores {score:.1}.");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = config::AppConfig::from_env()?;
    config::init_tracing(&config);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let scorer = RiskScorer::new(config.department_weights.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let count = db::seed(&pool).await?;
            tracing::info!(count, "seeded users");
            println!("Database initialized with {count} users.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            tracing::info!(inserted, path = %csv.display(), "imported campaigns");
            println!("Inserted {inserted} campaigns from {}.", csv.display());
        }
        Commands::Launch { email, campaign } => {
            let log = db::launch_campaign(&pool, &email, &campaign).await?;
            tracing::info!(%email, log_id = log.log_id, campaign = %log.campaign_name, "campaign launched");
            print!(
                "{}",
                tracking::render_simulated_email(&email, &config.tracking_base_url, log.log_id)
            );
            recompute(&pool, &scorer, &email, "launched").await?;
        }
        Commands::Track { log_id, user_agent } => {
            match db::mark_clicked(&pool, log_id, &user_agent).await? {
                TransitionOutcome::Applied(email) => {
                    println!("Click recorded for campaign {log_id}.");
                    recompute(&pool, &scorer, &email, "clicked").await?;
                }
                TransitionOutcome::AlreadyApplied(_) => {
                    tracing::debug!(log_id, "repeat click ignored");
                    println!("Campaign {log_id} was already clicked.");
                }
                TransitionOutcome::NotFound => {
                    tracing::warn!(log_id, "click for unknown campaign");
                    println!("No campaign with id {log_id}.");
                }
            }
        }
        Commands::ReportAttack { log_id } => match db::mark_reported(&pool, log_id).await? {
            TransitionOutcome::Applied(email) => {
                println!("Thanks for reporting campaign {log_id}.");
                recompute(&pool, &scorer, &email, "reported").await?;
            }
            TransitionOutcome::AlreadyApplied(_) => {
                println!("Campaign {log_id} was already reported.");
            }
            TransitionOutcome::NotFound => {
                tracing::warn!(log_id, "report for unknown campaign");
                println!("No campaign with id {log_id}.");
            }
        },
        Commands::Reset { email } => match db::reset_history(&pool, &email).await? {
            Some(deleted) => {
                tracing::info!(%email, deleted, "history reset");
                println!("Removed {deleted} campaigns for {email}.");
                recompute(&pool, &scorer, &email, "reset").await?;
            }
            None => println!("No user with email {email}."),
        },
        Commands::Score {
            department,
            email,
            limit,
            json,
        } => {
            let profiles =
                db::fetch_profiles(&pool, department.as_deref(), email.as_deref()).await?;
            let scores = risk::score_users(&scorer, &profiles);

            if json {
                let top: Vec<_> = scores.into_iter().take(limit).collect();
                println!("{}", serde_json::to_string_pretty(&top)?);
                return Ok(());
            }

            if scores.is_empty() {
                println!("No users found.");
                return Ok(());
            }

            println!("Users by vulnerability score:");
            for score in scores.iter().take(limit) {
                println!(
                    "- {} ({}) score {:.1} across {} campaigns ({} clicked, {} fast, {} reported)",
                    score.email,
                    score.department,
                    score.score,
                    score.campaign_count,
                    score.clicks,
                    score.fast_clicks,
                    score.reports
                );
            }
        }
        Commands::Report {
            department,
            email,
            out,
        } => {
            let profiles =
                db::fetch_profiles(&pool, department.as_deref(), email.as_deref()).await?;
            let scores = risk::score_users(&scorer, &profiles);
            let report = report::build_report(
                department.as_deref().or(email.as_deref()),
                chrono::Utc::now(),
                &scores,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
