//! Proof generation for zkminer.
//!
//! This crate provides:
//! - [`ProofBackend`] / [`ProofSession`], the scoped session contract the
//!   request handler drives (one session per request, always closed)
//! - [`CommandBackend`], which runs an external prover executable in a
//!   private scratch directory per session
//! - [`ProofError`], the request-scoped failure type

#![warn(missing_docs)]

pub mod backend;
pub mod command;
pub mod error;

pub use backend::{ProofBackend, ProofSession};
pub use command::{CommandBackend, CommandSpec};
pub use error::ProofError;
