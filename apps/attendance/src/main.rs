use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{AttendanceContract, JsonRpcProvider};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod session;
mod shell;
mod view;

use session::Session;

#[derive(Parser, Debug)]
#[command(about = "Mark and manage attendance on-chain")]
struct Cli {
    /// Config file (defaults to ./attendance.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    rpc_url: Option<String>,
    #[arg(long)]
    contract: Option<String>,
    /// Account to act as; defaults to the node's first account
    #[arg(long)]
    account: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show owner, attendees and your attendance
    Status,
    /// Mark your attendance and wait for confirmation
    Mark,
    /// Clear every attendance record (owner only)
    Clear,
    /// Read any address's attendance timestamp directly
    Lookup { address: String },
    /// Interactive session
    Shell,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut settings = config::load_settings(cli.config.as_deref())?;
    settings.apply_overrides(cli.rpc_url, cli.contract, cli.account);
    let provider = Arc::new(JsonRpcProvider::new(settings.rpc_settings()?));
    let contract = AttendanceContract::new(settings.contract_address()?, provider.clone());
    info!(
        rpc_url = %provider.settings().url,
        account = ?provider.settings().account,
        contract = %contract.contract_address(),
        "attendance: starting"
    );
    let mut session = Session::new(contract);

    match cli.command {
        Command::Status => {
            session.refresh().await;
            print!("{}", session.render().await);
        }
        Command::Mark => {
            session.refresh().await;
            session.handle_mark().await;
            print!("{}", session.render().await);
        }
        Command::Clear => {
            session.refresh().await;
            session.handle_clear().await;
            print!("{}", session.render().await);
        }
        Command::Lookup { address } => {
            println!("{}", session.lookup(&address).await);
        }
        Command::Shell => {
            session
                .run_shell(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?;
        }
    }

    Ok(())
}
