//! Chain access for zkminer.
//!
//! This crate provides:
//! - [`ChainState`], the contract the session coordinator consumes for roster
//!   reads and weight assignment
//! - [`RegistryReader`], a read-only HTTP client for the `SubnetRegistry` contract
//! - [`RpcChainState`], the signing implementation used by the miner
//! - [`Wallet`], the hotkey used to identify and sign

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bindings;
pub mod provider;
pub mod state;
pub mod wallet;

pub use provider::{RegistryReader, RpcChainState};
pub use state::ChainState;
pub use wallet::Wallet;
