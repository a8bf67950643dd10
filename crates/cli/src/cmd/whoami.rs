use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use zkminer_chain::Wallet;

#[derive(Debug, Args)]
pub struct WhoamiArgs {
    /// Hotkey file (32-byte hex private key)
    #[arg(long)]
    wallet: PathBuf,
}

pub fn run(args: WhoamiArgs) -> Result<()> {
    let wallet = Wallet::from_key_file(&args.wallet)?;
    println!("{}", wallet.address());
    Ok(())
}
