//! Hotkey wallet.

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::path::Path;

/// The miner's hotkey.
///
/// The key is loaded once at startup; the address is what the registry
/// lists in its roster.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Parse a 32-byte hex private key, with or without `0x`.
    pub fn from_hex(key: &str) -> Result<Self> {
        let key = key.trim().trim_start_matches("0x");
        if key.len() != 64 {
            anyhow::bail!("Hotkey must be 64 hex characters (got {})", key.len());
        }
        if !key.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Hotkey must be a valid hex string");
        }

        let signer = key
            .parse::<PrivateKeySigner>()
            .context("Failed to parse hotkey")?;
        Ok(Self { signer })
    }

    /// Read a hex private key from a file (surrounding whitespace ignored).
    pub fn from_key_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read hotkey file: {}", path.display()))?;
        Self::from_hex(&contents)
            .with_context(|| format!("Invalid hotkey file: {}", path.display()))
    }

    /// Hotkey address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Transaction-signing wallet for alloy providers.
    pub fn ethereum_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
