//! End-to-end session tests: a real listener, in-memory chain and prover.

use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use zkminer_chain::ChainState;
use zkminer_core::{MemberRecord, NetworkSnapshot, ProofResponse, MAX_WEIGHT};
use zkminer_node::{
    Collaborators, FallbackPolicy, HandlerConfig, MinerSession, SchedulerConfig, SessionExit,
    SessionSettings,
};
use zkminer_prover::{ProofBackend, ProofError, ProofSession};

struct Chain {
    block: Mutex<u64>,
    roster: Mutex<Vec<Address>>,
    weights: Mutex<Vec<(u64, Vec<(u16, u16)>)>>,
}

impl Chain {
    fn new(block: u64, roster: Vec<Address>) -> Arc<Self> {
        Arc::new(Self {
            block: Mutex::new(block),
            roster: Mutex::new(roster),
            weights: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChainState for Chain {
    async fn current_block(&self) -> Result<u64> {
        Ok(*self.block.lock().unwrap())
    }

    async fn fetch_snapshot(&self, netuid: u16) -> Result<NetworkSnapshot> {
        let block = *self.block.lock().unwrap();
        let members = self
            .roster
            .lock()
            .unwrap()
            .iter()
            .map(|a| MemberRecord::from_raw(*a, 5_000_000_000, 1000, 2000, 3000, 4000, 1_000_000))
            .collect();
        Ok(NetworkSnapshot::new(netuid, block, members))
    }

    async fn set_weights(&self, _netuid: u16, weights: &[(u16, u16)]) -> Result<B256> {
        let block = *self.block.lock().unwrap();
        self.weights.lock().unwrap().push((block, weights.to_vec()));
        Ok(B256::ZERO)
    }
}

/// Proof = reversed JSON of the inputs.
struct ReverseProver;

struct ReverseSession(Vec<u8>);

#[async_trait]
impl ProofBackend for ReverseProver {
    async fn create_session(
        &self,
        _model_id: &str,
        public_inputs: &Value,
    ) -> Result<Box<dyn ProofSession>, ProofError> {
        let bytes = serde_json::to_vec(public_inputs).map_err(|e| ProofError::InvalidInputs(e.to_string()))?;
        Ok(Box::new(ReverseSession(bytes)))
    }
}

#[async_trait]
impl ProofSession for ReverseSession {
    async fn generate_proof(&mut self) -> Result<Vec<u8>, ProofError> {
        Ok(self.0.iter().rev().copied().collect())
    }

    async fn close(self: Box<Self>) {}
}

/// Sleeps before answering so a request can still be running at shutdown.
struct SlowProver(Duration);

struct SlowSession(Duration);

#[async_trait]
impl ProofBackend for SlowProver {
    async fn create_session(
        &self,
        _model_id: &str,
        _public_inputs: &Value,
    ) -> Result<Box<dyn ProofSession>, ProofError> {
        Ok(Box::new(SlowSession(self.0)))
    }
}

#[async_trait]
impl ProofSession for SlowSession {
    async fn generate_proof(&mut self) -> Result<Vec<u8>, ProofError> {
        tokio::time::sleep(self.0).await;
        Ok(b"late".to_vec())
    }

    async fn close(self: Box<Self>) {}
}

fn settings(fallback: FallbackPolicy) -> SessionSettings {
    SessionSettings {
        netuid: 5,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        tick_interval: Duration::from_millis(20),
        drain_timeout: Duration::from_secs(5),
        handler: HandlerConfig {
            default_model: "sqrt".to_string(),
            proof_timeout: Duration::from_secs(5),
            max_concurrent: 4,
        },
        fallback,
        scheduler: SchedulerConfig {
            netuid: 5,
            update_every_ticks: 10,
            refresh_every_ticks: 2,
            weights_interval_blocks: 100,
            action_timeout: Duration::from_secs(5),
            auto_update: false,
        },
    }
}

async fn start(chain: Arc<Chain>, me: Address, fallback: FallbackPolicy) -> MinerSession {
    start_with(chain, me, fallback, Arc::new(ReverseProver)).await
}

async fn start_with(
    chain: Arc<Chain>,
    me: Address,
    fallback: FallbackPolicy,
    backend: Arc<dyn ProofBackend>,
) -> MinerSession {
    MinerSession::start(
        settings(fallback),
        Collaborators {
            chain,
            backend,
            updater: None,
            address: me,
        },
    )
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_serves_proofs_and_shuts_down_on_interrupt() {
    let (a, b, c) = (
        Address::repeat_byte(0xa),
        Address::repeat_byte(0xb),
        Address::repeat_byte(0xc),
    );
    let chain = Chain::new(1000, vec![a, b, c]);
    let session = start(chain.clone(), b, FallbackPolicy::Reject).await;
    assert_eq!(session.identity().uid(), 1);

    let base = format!("http://{}", session.local_addr());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(session.run(async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::new();

    let response: ProofResponse = client
        .post(format!("{base}/v1/proof"))
        .json(&json!({"query_input": {"model_id": "sqrt", "public_inputs": [1, 2]}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response.proof_bytes(), Some(b"]2,1[".to_vec()));

    let response: ProofResponse = client
        .post(format!("{base}/v1/proof"))
        .json(&json!({"query_input": null}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!response.is_proof());

    let status: Value = client
        .get(format!("{base}/v1/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["uid"], 1);
    assert_eq!(status["requests"]["served"], 1);
    assert_eq!(status["requests"]["failed"], 1);
    assert_eq!(status["metrics"]["stake"], 5.0);

    stop_tx.send(()).unwrap();
    let exit = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(exit, SessionExit::Interrupted));
    assert_eq!(exit.exit_code(), 0);

    assert_eq!(chain.weights.lock().unwrap()[0], (1000, vec![(1, MAX_WEIGHT)]));
    assert!(client.get(format!("{base}/health")).send().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deregistered_miner_keeps_uid_and_skips_weights() {
    let (a, b, c) = (
        Address::repeat_byte(0xa),
        Address::repeat_byte(0xb),
        Address::repeat_byte(0xc),
    );
    let chain = Chain::new(1000, vec![a, b, c]);
    let session = start(chain.clone(), b, FallbackPolicy::Reject).await;
    let cache = session.cache().clone();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(session.run(async move {
        let _ = stop_rx.await;
    }));

    // Wait for the first weight assignment.
    tokio::time::timeout(Duration::from_secs(5), async {
        while chain.weights.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Drop B from the roster and wait for a refresh to pick it up.
    *chain.roster.lock().unwrap() = vec![a, c];
    tokio::time::timeout(Duration::from_secs(5), async {
        while cache.current().await.uid_of(&b).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Weight interval elapses: the lookup fails and the assignment is skipped.
    *chain.block.lock().unwrap() = 1200;
    // Give the scheduler a few more ticks at the new height.
    tokio::time::sleep(Duration::from_millis(200)).await;

    stop_tx.send(()).unwrap();
    let exit = running.await.unwrap();
    assert!(matches!(exit, SessionExit::Interrupted));

    let weights = chain.weights.lock().unwrap().clone();
    assert_eq!(weights, vec![(1000, vec![(1, MAX_WEIGHT)])]);
}

#[tokio::test]
async fn test_corpus_fallback_answers_requests_without_inputs() {
    let me = Address::repeat_byte(0x1);
    let chain = Chain::new(10, vec![me]);
    let corpus = FallbackPolicy::Corpus(vec![zkminer_core::ProofRequest::new("sqrt", json!([7]))]);
    let session = start(chain, me, corpus).await;

    let base = format!("http://{}", session.local_addr());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(session.run(async move {
        let _ = stop_rx.await;
    }));

    let response: ProofResponse = reqwest::Client::new()
        .post(format!("{base}/v1/proof"))
        .body(r#"{"model_id":"sqrt"}"#)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response.proof_bytes(), Some(b"]7[".to_vec()));

    stop_tx.send(()).unwrap();
    assert!(matches!(running.await.unwrap(), SessionExit::Interrupted));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interrupt_drains_in_flight_request() {
    let me = Address::repeat_byte(0x1);
    let chain = Chain::new(10, vec![me]);
    let session = start_with(
        chain,
        me,
        FallbackPolicy::Reject,
        Arc::new(SlowProver(Duration::from_millis(500))),
    )
    .await;

    let base = format!("http://{}", session.local_addr());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(session.run(async move {
        let _ = stop_rx.await;
    }));

    let request = tokio::spawn(async move {
        let response = reqwest::Client::new()
            .post(format!("{base}/v1/proof"))
            .json(&json!({"model_id": "sqrt", "public_inputs": [3]}))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        response.json::<ProofResponse>().await.unwrap()
    });

    // Interrupt while the proof is still being generated.
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).unwrap();

    let exit = tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(exit, SessionExit::Interrupted));

    let response = request.await.unwrap();
    assert_eq!(response.proof_bytes(), Some(b"late".to_vec()));
}
