//! Error types for the core crate.

use alloy_primitives::Address;
use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The wallet address has no slot in the subnet roster.
    #[error(
        "Address {address} is not registered on netuid {netuid}. \
         Register the hotkey on the subnet and restart the miner."
    )]
    NotRegistered {
        /// Address that was looked up.
        address: Address,
        /// Subnet the roster belongs to.
        netuid: u16,
    },

    /// A uid does not index into the roster.
    #[error("uid {uid} is out of range for a roster of {len} members")]
    UidOutOfRange {
        /// Requested uid.
        uid: u16,
        /// Roster length.
        len: usize,
    },

    /// Request payload could not be decoded.
    #[error("Malformed proof request: {0}")]
    MalformedRequest(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
