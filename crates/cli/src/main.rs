use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;

#[derive(Debug, Parser)]
#[command(name = "zkminer-cli")]
#[command(about = "zkminer operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a proof request to a miner, the way a validator does.
    Query(cmd::query::QueryArgs),
    /// Print the roster of a subnet.
    Roster(cmd::roster::RosterArgs),
    /// Print the address of a hotkey file.
    Whoami(cmd::whoami::WhoamiArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Query(args) => cmd::query::run(args).await?,
        Command::Roster(args) => cmd::roster::run(args).await?,
        Command::Whoami(args) => cmd::whoami::run(args)?,
    }

    Ok(())
}
