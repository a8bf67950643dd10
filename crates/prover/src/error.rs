//! Error types for the prover crate.

use thiserror::Error;

/// Proof generation failure, scoped to a single request.
#[derive(Error, Debug)]
pub enum ProofError {
    /// Public inputs were rejected before proving.
    #[error("Invalid public inputs: {0}")]
    InvalidInputs(String),

    /// The backend does not serve the requested model.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The prover process could not be started.
    #[error("Failed to start prover: {0}")]
    Spawn(#[source] std::io::Error),

    /// The prover process exited unsuccessfully.
    #[error("Prover exited with {status}: {stderr}")]
    ProverFailed {
        /// Exit status as reported by the OS.
        status: String,
        /// Tail of the prover's stderr.
        stderr: String,
    },

    /// The prover finished but produced no proof.
    #[error("Prover produced no proof")]
    EmptyProof,

    /// The session was used after it was closed.
    #[error("Proof session already closed")]
    Closed,

    /// Scratch-space I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
