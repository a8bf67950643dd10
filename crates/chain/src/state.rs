//! The chain-state contract consumed by the session coordinator.

use alloy::primitives::B256;
use anyhow::Result;
use async_trait::async_trait;
use zkminer_core::NetworkSnapshot;

/// Source of roster snapshots and sink for weight assignments.
///
/// Every method may fail with a transient I/O error; callers decide whether
/// that is fatal.
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Latest block height.
    async fn current_block(&self) -> Result<u64>;

    /// Roster of `netuid` together with the block it was read at.
    async fn fetch_snapshot(&self, netuid: u16) -> Result<NetworkSnapshot>;

    /// Submit `(uid, weight)` pairs for `netuid` and return the transaction hash.
    async fn set_weights(&self, netuid: u16, weights: &[(u16, u16)]) -> Result<B256>;
}
