use anyhow::{Context, Result};
use clap::Args;
use zkminer_chain::RegistryReader;
use zkminer_core::{Address, NetworkSnapshot};

#[derive(Debug, Args)]
pub struct RosterArgs {
    /// Chain RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:8545")]
    chain_endpoint: String,

    /// SubnetRegistry contract address
    #[arg(long)]
    registry: Address,

    /// Subnet to list
    #[arg(long)]
    netuid: u16,

    /// Highlight this hotkey
    #[arg(long)]
    hotkey: Option<Address>,

    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: RosterArgs) -> Result<()> {
    let reader = RegistryReader::new(&args.chain_endpoint, args.registry).await?;
    let snapshot = reader
        .get_snapshot(args.netuid)
        .await
        .context("Failed to fetch roster")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_table(&snapshot, args.hotkey));
    }

    Ok(())
}

fn render_table(snapshot: &NetworkSnapshot, hotkey: Option<Address>) -> String {
    let mut out = format!(
        "netuid {} at block {} ({} members)\n",
        snapshot.netuid,
        snapshot.block,
        snapshot.len()
    );
    out.push_str(&format!(
        "  {:>4}  {:<42}  {:>12}  {:>6}  {:>6}  {:>6}  {:>6}  {:>10}\n",
        "uid", "hotkey", "stake", "rank", "trust", "cons", "incen", "emission"
    ));

    for (uid, m) in snapshot.members.iter().enumerate() {
        let marker = if Some(m.address) == hotkey { '*' } else { ' ' };
        out.push_str(&format!(
            "{} {:>4}  {:<42}  {:>12.4}  {:>6.4}  {:>6.4}  {:>6.4}  {:>6.4}  {:>10.4}\n",
            marker,
            uid,
            m.address.to_string(),
            m.stake,
            m.rank,
            m.trust,
            m.consensus,
            m.incentive,
            m.emission
        ));
    }

    out
}
