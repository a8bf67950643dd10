//! # zkminer core
//!
//! Domain types shared by every zkminer crate.
//!
//! ## Features
//!
//! - **Roster types**: [`NetworkSnapshot`] and [`MemberRecord`], the point-in-time view of a subnet
//! - **Identity**: [`Identity`] and [`resolve_identity`], this process's stable uid in the roster
//! - **Wire types**: [`ProofRequest`] / [`ProofResponse`] exchanged with validators
//! - **Constants**: fixed-point scales and weight bounds used by the registry contract

#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod identity;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use error::{CoreError, Result};
pub use identity::{resolve_identity, Identity};
pub use types::*;

// Re-export Alloy primitives for convenience
pub use alloy_primitives::{Address, B256};
