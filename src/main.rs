use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mongo_provision::connect::connect;
use mongo_provision::{
    plan_from_config, verify, Config, MongoStore, Provisioner, COMPLETION_NOTICE,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mongo-provision")]
#[command(about = "Create the application credential, collections and indexes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create whatever is missing (default)
    Provision,
    /// Compare the live database with the plan, exit 1 on drift
    Verify,
    /// Print the plan as JSON without connecting
    Plan,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env();

    match run(cli.command.unwrap_or(Commands::Provision), &cfg).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, cfg: &Config) -> Result<ExitCode> {
    let plan = plan_from_config(cfg);

    match command {
        Commands::Plan => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Provision => {
            info!(?cfg, "🚀 Provisioning started");
            let db = connect(cfg).await.context("connecting to MongoDB")?;
            let provisioner = Provisioner::new(MongoStore::new(db), plan);
            let report = provisioner.run().await?;
            info!(
                created = report.created(),
                existing = report.existing(),
                "✅ Provisioning complete"
            );
            println!("{COMPLETION_NOTICE}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify => {
            let db = connect(cfg).await.context("connecting to MongoDB")?;
            let report = verify(&MongoStore::new(db), &plan).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
    }
}
