//! Resolution of this process's identity within a subnet roster.

use alloy_primitives::Address;
use serde::Serialize;
use std::fmt;

use crate::error::CoreError;
use crate::types::NetworkSnapshot;

/// This miner's position in the roster.
///
/// Only [`resolve_identity`] produces an `Identity`, so holding one means the
/// wallet was registered when the session started. The uid is never
/// re-resolved for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    address: Address,
    uid: u16,
}

impl Identity {
    /// Hotkey address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Roster index assigned at startup.
    pub const fn uid(&self) -> u16 {
        self.uid
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid {} ({})", self.uid, self.address)
    }
}

/// Find `address` in `snapshot` and return the resulting identity.
///
/// The first exact match wins. A missing address is fatal for the caller:
/// registration happens out of band, so there is nothing to retry.
pub fn resolve_identity(snapshot: &NetworkSnapshot, address: Address) -> Result<Identity, CoreError> {
    snapshot
        .uid_of(&address)
        .map(|uid| Identity { address, uid })
        .ok_or(CoreError::NotRegistered {
            address,
            netuid: snapshot.netuid,
        })
}
