//! Shared, atomically replaced view of the subnet roster.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use zkminer_chain::ChainState;
use zkminer_core::NetworkSnapshot;

struct Entry {
    snapshot: Arc<NetworkSnapshot>,
    refreshed_at: Option<Instant>,
}

/// Cache for the latest [`NetworkSnapshot`] of one subnet.
///
/// Readers get an `Arc` to a complete snapshot. A refresh fetches the new
/// roster without holding the lock and swaps it in under a short write lock,
/// so a reader sees either the previous roster or the new one, never a mix.
/// A failed refresh leaves the previous snapshot in place.
#[derive(Clone)]
pub struct NetworkStateCache {
    chain: Arc<dyn ChainState>,
    netuid: u16,
    entry: Arc<RwLock<Entry>>,
}

impl NetworkStateCache {
    /// Create an empty cache for `netuid`. Call [`refresh`](Self::refresh)
    /// before relying on the roster.
    pub fn new(chain: Arc<dyn ChainState>, netuid: u16) -> Self {
        Self {
            chain,
            netuid,
            entry: Arc::new(RwLock::new(Entry {
                snapshot: Arc::new(NetworkSnapshot::empty(netuid)),
                refreshed_at: None,
            })),
        }
    }

    /// Fetch the roster from the chain and replace the cached snapshot.
    ///
    /// On error the previous snapshot stays current and the error is returned.
    pub async fn refresh(&self) -> Result<Arc<NetworkSnapshot>> {
        let fetched = match self.chain.fetch_snapshot(self.netuid).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "Roster refresh for netuid {} failed, keeping previous snapshot: {:#}",
                    self.netuid, e
                );
                return Err(e);
            }
        };

        if fetched.netuid != self.netuid {
            anyhow::bail!(
                "Chain returned roster for netuid {} while netuid {} was requested",
                fetched.netuid,
                self.netuid
            );
        }

        let snapshot = Arc::new(fetched);
        {
            let mut entry = self.entry.write().await;
            entry.snapshot = Arc::clone(&snapshot);
            entry.refreshed_at = Some(Instant::now());
        }

        debug!(
            "Roster for netuid {} refreshed at block {} ({} members)",
            self.netuid,
            snapshot.block,
            snapshot.len()
        );

        Ok(snapshot)
    }

    /// Most recent successfully fetched snapshot.
    pub async fn current(&self) -> Arc<NetworkSnapshot> {
        Arc::clone(&self.entry.read().await.snapshot)
    }

    /// Time since the last successful refresh, `None` before the first one.
    pub async fn age(&self) -> Option<Duration> {
        self.entry.read().await.refreshed_at.map(|t| t.elapsed())
    }

    /// Block height of the cached roster (0 before the first refresh).
    pub async fn last_refresh_block(&self) -> u64 {
        self.entry.read().await.snapshot.block
    }
}
