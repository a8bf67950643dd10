//! RPC clients for the `SubnetRegistry` contract.

use alloy::eips::BlockId;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use zkminer_core::{MemberRecord, NetworkSnapshot};

use crate::bindings::SubnetRegistry;
use crate::state::ChainState;
use crate::wallet::Wallet;

/// How long to wait for a weight transaction to be mined.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

// Type alias for the Alloy provider with wallet support
type WalletProvider = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::fillers::JoinFill<
            alloy::providers::Identity,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::GasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::BlobGasFiller,
                    alloy::providers::fillers::JoinFill<
                        alloy::providers::fillers::NonceFiller,
                        alloy::providers::fillers::ChainIdFiller,
                    >,
                >,
            >,
        >,
        alloy::providers::fillers::WalletFiller<EthereumWallet>,
    >,
    RootProvider<Http<Client>>,
    Http<Client>,
    alloy::network::Ethereum,
>;

/// Read-only HTTP client for the subnet registry.
#[derive(Clone)]
pub struct RegistryReader {
    provider: RootProvider<Http<Client>>,
    registry: Address,
}

impl RegistryReader {
    /// Create a new reader.
    pub async fn new(rpc_url: &str, registry: Address) -> Result<Self> {
        let url = rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self { provider, registry })
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("Failed to get block number")
    }

    /// Read the roster of `netuid`.
    ///
    /// The contract call is pinned to the block reported in the snapshot so the
    /// height and the member list always belong together.
    pub async fn get_snapshot(&self, netuid: u16) -> Result<NetworkSnapshot> {
        let block = self.get_block_number().await?;

        let contract = SubnetRegistry::new(self.registry, self.provider.clone());
        let members = contract
            .members(netuid)
            .block(BlockId::number(block))
            .call()
            .await
            .with_context(|| {
                format!(
                    "Failed to read members of netuid {} at block {}",
                    netuid, block
                )
            })?
            ._0;

        debug!(
            "Fetched roster for netuid {} at block {}: {} members",
            netuid,
            block,
            members.len()
        );

        Ok(NetworkSnapshot::new(
            netuid,
            block,
            members.into_iter().map(MemberRecord::from).collect(),
        ))
    }
}

/// Signing chain client used by a running miner.
pub struct RpcChainState {
    reader: RegistryReader,
    /// The contract instance for weight transactions
    writer: SubnetRegistry::SubnetRegistryInstance<Http<Client>, WalletProvider>,
    hotkey: Address,
}

impl RpcChainState {
    /// Connect to `rpc_url` and sign weight transactions with `wallet`.
    pub async fn new(rpc_url: &str, registry: Address, wallet: &Wallet) -> Result<Self> {
        let reader = RegistryReader::new(rpc_url, registry).await?;

        // Build provider with wallet
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet.ethereum_wallet())
            .on_http(
                rpc_url
                    .parse()
                    .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?,
            );

        let writer = SubnetRegistry::new(registry, provider);

        Ok(Self {
            reader,
            writer,
            hotkey: wallet.address(),
        })
    }
}

#[async_trait]
impl ChainState for RpcChainState {
    async fn current_block(&self) -> Result<u64> {
        self.reader.get_block_number().await
    }

    async fn fetch_snapshot(&self, netuid: u16) -> Result<NetworkSnapshot> {
        self.reader.get_snapshot(netuid).await
    }

    async fn set_weights(&self, netuid: u16, weights: &[(u16, u16)]) -> Result<B256> {
        let (uids, values): (Vec<u16>, Vec<u16>) = weights.iter().copied().unzip();

        info!(
            "Setting weights on netuid {} from {}: {} entries",
            netuid,
            self.hotkey,
            uids.len()
        );

        let tx = self
            .writer
            .setWeights(netuid, uids, values)
            .send()
            .await
            .context("Failed to send setWeights transaction")?;

        let tx_hash = *tx.tx_hash();
        debug!("Transaction sent: 0x{}", hex::encode(tx_hash));

        let receipt = tokio::time::timeout(RECEIPT_TIMEOUT, tx.get_receipt())
            .await
            .with_context(|| {
                format!(
                    "Timed out after {}s waiting for setWeights receipt 0x{}",
                    RECEIPT_TIMEOUT.as_secs(),
                    hex::encode(tx_hash)
                )
            })?
            .context("Failed to get transaction receipt")?;

        if !receipt.status() {
            warn!(
                "Transaction reverted: 0x{} in block {}",
                hex::encode(receipt.transaction_hash),
                receipt.block_number.unwrap_or_default()
            );
            anyhow::bail!(
                "setWeights reverted: 0x{} in block {}",
                hex::encode(receipt.transaction_hash),
                receipt.block_number.unwrap_or_default()
            );
        }

        Ok(receipt.transaction_hash)
    }
}
