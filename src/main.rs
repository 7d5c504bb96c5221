//! ecam-schema - Schema bootstrap and diagnostics for the e-cam database

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecam_schema::{
    config::Config,
    db::{self, DynDocumentStore},
    models::ServiceAccount,
    services::{GroupMembersReporter, IndexCleanupService, SchemaService, UserCensus},
};

/// Schema bootstrap and diagnostics for the e-cam MongoDB database.
#[derive(Parser, Debug)]
#[command(name = "ecam-schema", version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "config.yml")]
    config: PathBuf,

    /// Report format.
    #[arg(long, short = 'o', global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the service account, collections and indexes if absent.
    EnsureSchema,

    /// Explain the group member lookup and show sample members.
    Report,

    /// List declared collections and indexes missing from the database.
    Status,

    /// Drop every index except _id_ on the cleanup collections.
    DropIndexes {
        /// Drop for real; without it the indexes are only listed.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Count IAM users by tenant and provider.
    CheckUsers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Print a report on stdout in the requested format
fn emit<T: Serialize + Display>(report: &T, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        ),
    }
    Ok(())
}

async fn run(command: &Commands, config: &Config, store: DynDocumentStore, output: OutputFormat) -> Result<()> {
    match command {
        Commands::EnsureSchema => {
            let account = ServiceAccount::from(&config.account);
            let report = SchemaService::new(store).ensure_schema(&account).await?;
            emit(&report, output)
        }
        Commands::Report => {
            let report = GroupMembersReporter::new(store)
                .run(&config.diagnostics)
                .await?;
            emit(&report, output)
        }
        Commands::Status => {
            let report = SchemaService::new(store).status().await?;
            emit(&report, output)
        }
        Commands::DropIndexes { yes } => {
            let report = IndexCleanupService::new(store)
                .run(&config.cleanup.collections, *yes)
                .await;
            emit(&report, output)
        }
        Commands::CheckUsers => {
            let report = UserCensus::new(store)
                .run(&config.diagnostics.tenant_id)
                .await?;
            emit(&report, output)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecam_schema=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load_with_env(&cli.config)?;
    tracing::debug!("Configuration loaded from {}", cli.config.display());

    let store = db::create_store(&config.database).await?;

    let result = run(&cli.command, &config, store.clone(), cli.output).await;
    store.close().await;
    result
}
