use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod access;
mod aggregate;
mod config;
mod dashboard;
mod error;
mod import;
mod models;
mod report;
mod role;
mod service;
mod store;
mod validation;

use access::redact;
use dashboard::Dashboard;
use models::{FeedbackRecord, FeedbackSubmission, Identity, Role};
use role::{CliIdentity, IdentityProvider};
use service::FeedbackService;
use store::postgres::PgBackend;

#[derive(Parser)]
#[command(name = "feedback-portal")]
#[command(about = "Student feedback collection portal", long_about = None)]
struct Cli {
    /// Act as this identity (falls back to PORTAL_IDENTITY)
    #[arg(long = "as", global = true, value_name = "UUID")]
    identity: Option<Identity>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo students, an admin and sample feedback
    Seed,
    /// Assign a role to an identity (admin only once an admin exists)
    GrantRole {
        #[arg(long)]
        user: Identity,
        #[arg(long)]
        role: Role,
    },
    /// Show the current identity and its resolved role
    Whoami,
    /// Submit one piece of feedback
    Submit {
        #[arg(long)]
        category: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        rating: f64,
        #[arg(long)]
        text: String,
        /// Attach your identity instead of submitting anonymously
        #[arg(long)]
        named: bool,
    },
    /// Submit feedback rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List your own feedback, newest first
    History {
        #[arg(long)]
        json: bool,
    },
    /// List every submission (admin only)
    All {
        #[arg(long)]
        json: bool,
    },
    /// Print dashboard statistics for your role
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown dashboard report
    Report {
        #[arg(long, default_value = "feedback-report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Keep the dashboard statistics fresh as new feedback arrives
    Watch,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config::log_json() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_records(
    records: &[FeedbackRecord],
    viewer: &Identity,
    json: bool,
) -> anyhow::Result<()> {
    let views: Vec<_> = records.iter().map(|record| redact(record, viewer)).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }
    if views.is_empty() {
        println!("No feedback submitted yet.");
    }
    for view in &views {
        println!("{}", report::record_line(view));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = config::Config::load()?;
    let session = CliIdentity(config::identity(cli.identity)?);
    let current = session.current_identity();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let service = FeedbackService::new(Arc::new(PgBackend::new(pool.clone())));

    match cli.command {
        Commands::InitDb => {
            store::postgres::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = import::seed(&service).await?;
            println!("Seed data inserted ({inserted} feedback entries).");
        }
        Commands::GrantRole { user, role } => {
            service
                .assign_role(current.as_ref(), &user, role)
                .await
                .context("role was not assigned")?;
            println!("{user} is now {role}.");
        }
        Commands::Whoami => {
            let role = service.resolve_role(current.as_ref()).await?;
            let viewer = access::require_identity(current.as_ref())?;
            println!("{viewer} ({role})");
        }
        Commands::Submit {
            category,
            subject,
            rating,
            text,
            named,
        } => {
            let submission = FeedbackSubmission {
                category,
                subject,
                rating,
                text,
                is_anonymous: !named,
            };
            let record = service
                .submit(current.as_ref(), &submission)
                .await
                .context("feedback was not submitted")?;
            println!("Feedback submitted ({}).", record.id);
        }
        Commands::Import { csv } => {
            let inserted = import::import_csv(&service, current.as_ref(), &csv).await?;
            println!("Inserted {inserted} feedback entries from {}.", csv.display());
        }
        Commands::History { json } => {
            let records = service.fetch_own(current.as_ref()).await?;
            let viewer = access::require_identity(current.as_ref())?;
            print_records(&records, viewer, json)?;
        }
        Commands::All { json } => {
            let records = service.fetch_all(current.as_ref()).await?;
            let viewer = access::require_identity(current.as_ref())?;
            print_records(&records, viewer, json)?;
        }
        Commands::Stats { json } => {
            let dashboard = Dashboard::open(&service, current.as_ref()).await?;
            let snapshot = dashboard.load(&service, Utc::now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot.stats)?);
            } else {
                println!("{}", report::summary_line(&snapshot));
                for (category, count) in &snapshot.stats.category_breakdown {
                    println!("- {category}: {count}");
                }
            }
        }
        Commands::Report { out, limit } => {
            let dashboard = Dashboard::open(&service, current.as_ref()).await?;
            let snapshot = dashboard.load(&service, Utc::now()).await?;
            std::fs::write(&out, report::build_report(&snapshot, limit))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch => {
            let dashboard = Dashboard::open(&service, current.as_ref()).await?;
            let snapshot = dashboard.load(&service, Utc::now()).await?;
            println!("{}", report::summary_line(&snapshot));

            let (tx, mut rx) = mpsc::unbounded_channel();
            let subscription = service
                .subscribe(current.as_ref(), dashboard.scope(), move |event| {
                    let _ = tx.send(event);
                })
                .await?;

            let shutdown = tokio::signal::ctrl_c();
            tokio::pin!(shutdown);

            loop {
                tokio::select! {
                    Some(event) = rx.recv() => {
                        info!(id = %event.id, "feedback received, refreshing dashboard");
                        let snapshot = dashboard.load(&service, Utc::now()).await?;
                        println!("{}", report::summary_line(&snapshot));
                    }
                    _ = &mut shutdown => break,
                }
            }

            subscription.unsubscribe().await;
        }
    }

    Ok(())
}
