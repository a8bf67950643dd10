//! Proof request handling.
//!
//! [`ProofRequestHandler::handle`] is total: every request yields a
//! [`ProofResponse`], carrying either the proof or an error marker. Backend
//! failures, malformed input, saturation and deadline expiry all end up in the
//! response payload and the log, never in the caller.

use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use zkminer_core::{ProofRequest, ProofResponse};
use zkminer_prover::ProofBackend;

/// What to do with a request that carries no public inputs.
#[derive(Debug, Clone, Default)]
pub enum FallbackPolicy {
    /// Answer with an error marker.
    #[default]
    Reject,
    /// Prove a randomly chosen default request instead.
    Corpus(Vec<ProofRequest>),
}

/// Request handler settings.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Model used when the request names none.
    pub default_model: String,
    /// Deadline covering permit wait, session creation and proving.
    pub proof_timeout: Duration,
    /// Upper bound on concurrently open proof sessions.
    pub max_concurrent: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            default_model: "default".to_string(),
            proof_timeout: Duration::from_secs(120),
            max_concurrent: 2,
        }
    }
}

/// Counters exposed on the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandlerStats {
    /// Requests answered with a proof.
    pub served: u64,
    /// Requests answered with an error marker.
    pub failed: u64,
    /// Requests currently being handled.
    pub in_flight: u64,
}

/// Turns inbound requests into responses using a [`ProofBackend`].
pub struct ProofRequestHandler {
    backend: Arc<dyn ProofBackend>,
    config: HandlerConfig,
    fallback: FallbackPolicy,
    permits: Arc<Semaphore>,
    served: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
}

impl ProofRequestHandler {
    /// Create a handler.
    pub fn new(backend: Arc<dyn ProofBackend>, config: HandlerConfig, fallback: FallbackPolicy) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            backend,
            config,
            fallback,
            permits,
            served: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> HandlerStats {
        HandlerStats {
            served: self.served.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }

    /// Decode a raw request body and handle it.
    pub async fn handle_bytes(&self, body: &[u8]) -> ProofResponse {
        match ProofRequest::from_json_slice(body) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!("Rejecting proof request: {}", e);
                self.failed.fetch_add(1, Ordering::Relaxed);
                ProofResponse::failed(None, e)
            }
        }
    }

    /// Produce a response for `request`.
    pub async fn handle(&self, request: ProofRequest) -> ProofResponse {
        let guard = InFlight::enter(self);
        let deadline = Instant::now() + self.config.proof_timeout;

        let requested_model = request.model_id.clone();
        let response = match self.select_inputs(request) {
            Ok((model_id, inputs)) => match self.prove(&model_id, &inputs, deadline).await {
                Ok(proof) => {
                    info!("Generated proof for model {} ({} bytes)", model_id, proof.len());
                    ProofResponse::proof(Some(model_id), &proof)
                }
                Err(reason) => {
                    warn!("Proof request for model {} failed: {}", model_id, reason);
                    ProofResponse::failed(Some(model_id), reason)
                }
            },
            Err(reason) => {
                warn!("Proof request rejected: {}", reason);
                ProofResponse::failed(requested_model, reason)
            }
        };

        guard.settle(response.is_proof());
        response
    }

    /// Resolve the model and inputs to prove, applying the fallback policy.
    fn select_inputs(&self, request: ProofRequest) -> Result<(String, Value), String> {
        let model_id = request
            .model_id
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());

        if let Some(inputs) = request.public_inputs {
            return Ok((model_id, inputs));
        }

        match &self.fallback {
            FallbackPolicy::Reject => Err("request has no public inputs".to_string()),
            FallbackPolicy::Corpus(entries) => {
                let entry = entries
                    .choose(&mut rand::thread_rng())
                    .ok_or_else(|| "request has no public inputs and the corpus is empty".to_string())?;
                let inputs = entry
                    .public_inputs
                    .clone()
                    .ok_or_else(|| "corpus entry has no public inputs".to_string())?;
                let model_id = entry.model_id.clone().unwrap_or(model_id);
                info!("Request has no public inputs, using a corpus entry for model {}", model_id);
                Ok((model_id, inputs))
            }
        }
    }

    async fn prove(&self, model_id: &str, inputs: &Value, deadline: Instant) -> Result<Vec<u8>, String> {
        let timed_out = || format!("timed out after {}s", self.config.proof_timeout.as_secs());

        let _permit = match timeout_at(deadline, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err("proof worker pool is closed".to_string()),
            Err(_) => return Err(format!("{} waiting for a proof worker", timed_out())),
        };

        let mut session = match timeout_at(deadline, self.backend.create_session(model_id, inputs)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(format!("failed to open proof session: {}", e)),
            Err(_) => return Err(format!("{} opening proof session", timed_out())),
        };
        debug!("Proof session opened for model {}", model_id);

        let result = timeout_at(deadline, session.generate_proof()).await;
        session.close().await;

        match result {
            Ok(Ok(proof)) => Ok(proof),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(timed_out()),
        }
    }
}

/// Counts a request as in flight until dropped. A request that unwinds
/// before settling is counted as failed.
struct InFlight<'a> {
    handler: &'a ProofRequestHandler,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn enter(handler: &'a ProofRequestHandler) -> Self {
        handler.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            handler,
            settled: false,
        }
    }

    fn settle(mut self, proved: bool) {
        let counter = if proved {
            &self.handler.served
        } else {
            &self.handler.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.handler.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.handler.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
