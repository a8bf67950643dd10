//! Backend contract consumed by the request handler.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProofError;

/// Factory for proof sessions.
///
/// Creating and tearing down a session is assumed to be expensive, so the
/// handler creates exactly one per request and never shares it.
#[async_trait]
pub trait ProofBackend: Send + Sync {
    /// Prepare a session proving `model_id` over `public_inputs`.
    async fn create_session(
        &self,
        model_id: &str,
        public_inputs: &Value,
    ) -> Result<Box<dyn ProofSession>, ProofError>;
}

/// A single proving session.
#[async_trait]
pub trait ProofSession: Send {
    /// Run the prover and return the proof bytes.
    ///
    /// The future may be dropped mid-flight when a deadline expires; `close`
    /// is still called afterwards.
    async fn generate_proof(&mut self) -> Result<Vec<u8>, ProofError>;

    /// Release every resource held by the session.
    async fn close(self: Box<Self>);
}
