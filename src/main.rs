//! # Grocer CLI (`grocer`)
//!
//! ## Usage
//!
//! ```bash
//! grocer --config ./config/grocer.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `grocer init` | Create the SQLite database and run schema migrations |
//! | `grocer serve` | Start the HTTP API |
//! | `grocer notify` | Email providers about approaching orders |
//! | `grocer match "<query>" --user <uid>` | Run the item matcher from the shell |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use grocer::config::{self, Config};
use grocer::mailer::{LogMailer, Mailer, SmtpMailer};
use grocer::notifier::Notifier;
use grocer::store::{DocumentStore, SqliteStore};
use grocer::{db, llm, migrate, server};

/// Grocer: grocery and medicine delivery backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/grocer.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "grocer", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/grocer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Email providers about recurring lists and scheduled orders due within
    /// `[notifier].lookahead_days`.
    Notify {
        /// Print the emails instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the item matcher for a user and print the result as JSON.
    Match {
        /// Free-text request, e.g. "2 litres of milk and bread".
        query: String,

        /// Id of the requesting user.
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Notify { dry_run } => {
            run_notify(&cfg, dry_run).await?;
        }
        Commands::Match { query, user } => {
            let state = server::build_state(&cfg).await?;
            let outcome = state.matcher.run(&user, &query).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

async fn run_notify(cfg: &Config, dry_run: bool) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    migrate::apply(&pool).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool));

    let mailer: Arc<dyn Mailer> = if dry_run {
        Arc::new(LogMailer)
    } else {
        Arc::new(SmtpMailer::new(&cfg.notifier).context("failed to configure SMTP mailer")?)
    };

    let notifier = Notifier::new(
        store,
        Arc::from(llm::create_chat_model(&cfg.llm)?),
        mailer,
        cfg.notifier.lookahead_days,
        cfg.llm.email_temperature,
    );

    let results = notifier.run(chrono::Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
