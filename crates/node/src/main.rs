//! zkminer - serves zero-knowledge proofs to validators and keeps the miner's
//! standing on the subnet up to date.
//!
//! This binary provides:
//! - The proof-serving axon (`POST /v1/proof`)
//! - Periodic roster refresh, weight assignment and self-update
//! - One-shot registration and status checks

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use zkminer_chain::{RegistryReader, RpcChainState};
use zkminer_core::resolve_identity;
use zkminer_node::config::{Config, Overrides};
use zkminer_node::logging::init_logging;
use zkminer_node::{Collaborators, GitUpdater, MinerSession, SessionSettings, Updater};
use zkminer_prover::{CommandBackend, CommandSpec};

#[derive(Parser)]
#[command(name = "zkminer")]
#[command(version, about = "zkminer proof-serving miner", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "miner.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Subnet to serve (overrides network.netuid)
    #[arg(long)]
    netuid: Option<u16>,

    /// Axon port (overrides axon.port)
    #[arg(long)]
    axon_port: Option<u16>,

    /// Enable or disable self-update (overrides update.auto_update)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    auto_update: Option<bool>,

    /// Chain RPC endpoint (overrides network.chain_endpoint)
    #[arg(long)]
    chain_endpoint: Option<String>,

    /// Hotkey file (overrides the [wallet] section)
    #[arg(long)]
    wallet: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve proofs and run maintenance until interrupted
    Run,

    /// Verify configuration, chain access and registration
    Check,

    /// Show this miner's metrics from the current roster
    Status,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            netuid: self.netuid,
            axon_port: self.axon_port,
            auto_update: self.auto_update,
            chain_endpoint: self.chain_endpoint.clone(),
            wallet: self.wallet.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    };

    std::process::exit(code);
}

async fn execute(cli: Cli) -> Result<i32> {
    let config = Config::from_file_with_overrides(&cli.config, &cli.overrides())
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    init_logging(&config.logging, cli.debug)?;

    info!("zkminer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_miner(config).await,
        Commands::Check => check(config).await.map(|()| 0),
        Commands::Status => show_status(config).await.map(|()| 0),
    }
}

/// Main miner service - serves proofs and runs the maintenance loop.
async fn run_miner(config: Config) -> Result<i32> {
    info!("Configuration loaded successfully");
    info!("  Chain endpoint: {}", config.network.chain_endpoint);
    info!("  Registry: {}", config.network.registry);
    info!("  Netuid: {}", config.network.netuid);
    info!("  Axon: {}:{}", config.axon.host, config.axon.port);
    info!("  Auto-update: {}", config.update.auto_update);

    let wallet = config.load_wallet()?;
    info!("Hotkey: {}", wallet.address());

    let chain = RpcChainState::new(
        &config.network.chain_endpoint,
        config.network.registry,
        &wallet,
    )
    .await
    .context("Failed to create chain client")?;

    let backend = CommandBackend::new(CommandSpec {
        program: config.prover.command.clone(),
        args: config.prover.args.clone(),
        models: config.prover.models.clone(),
        scratch_root: config.scratch_dir(),
    });

    let updater: Option<Arc<dyn Updater>> = if config.update.auto_update {
        Some(Arc::new(GitUpdater::new(&config.update.repo_dir)))
    } else {
        None
    };

    let settings = SessionSettings::from_config(&config)?;
    let session = MinerSession::start(
        settings,
        Collaborators {
            chain: Arc::new(chain),
            backend: Arc::new(backend),
            updater,
            address: wallet.address(),
        },
    )
    .await?;

    let exit = session.run(shutdown_signal()).await;
    Ok(exit.exit_code())
}

/// Verify that the miner could start.
async fn check(config: Config) -> Result<()> {
    let wallet = config.load_wallet()?;
    let reader = RegistryReader::new(&config.network.chain_endpoint, config.network.registry).await?;

    let snapshot = reader
        .get_snapshot(config.network.netuid)
        .await
        .context("Failed to fetch roster")?;
    let identity = resolve_identity(&snapshot, wallet.address())?;

    SessionSettings::from_config(&config).context("Invalid session settings")?;

    println!("Configuration OK");
    println!("  Hotkey:  {}", wallet.address());
    println!("  Netuid:  {}", config.network.netuid);
    println!("  Block:   {}", snapshot.block);
    println!("  Members: {}", snapshot.len());
    println!("  UID:     {}", identity.uid());

    Ok(())
}

/// Print this miner's metrics.
async fn show_status(config: Config) -> Result<()> {
    let wallet = config.load_wallet()?;
    let reader = RegistryReader::new(&config.network.chain_endpoint, config.network.registry).await?;

    let snapshot = reader
        .get_snapshot(config.network.netuid)
        .await
        .context("Failed to fetch roster")?;

    println!("\n=== zkminer Status ===\n");
    println!("Hotkey: {}", wallet.address());
    println!("Netuid: {}", config.network.netuid);
    println!("Block:  {}", snapshot.block);

    match snapshot.uid_of(&wallet.address()) {
        Some(uid) => {
            let member = snapshot.member(uid)?;
            println!("UID:    {}", uid);
            println!();
            println!("Stake:      {:.4}", member.stake);
            println!("Rank:       {:.4}", member.rank);
            println!("Trust:      {:.4}", member.trust);
            println!("Consensus:  {:.4}", member.consensus);
            println!("Incentive:  {:.4}", member.incentive);
            println!("Emission:   {:.4}", member.emission);
        }
        None => println!("UID:    not registered"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
