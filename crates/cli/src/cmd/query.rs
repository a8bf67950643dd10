use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use zkminer_core::{ProofOutput, ProofResponse};

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Miner base URL
    #[arg(long, default_value = "http://127.0.0.1:8091")]
    url: String,

    /// Model to prove (miner default when omitted)
    #[arg(long)]
    model: Option<String>,

    /// Public inputs as inline JSON
    #[arg(long, conflicts_with = "inputs_file")]
    inputs: Option<String>,

    /// Path to a JSON file holding the public inputs
    #[arg(long)]
    inputs_file: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 180)]
    timeout_secs: u64,
}

pub async fn run(args: QueryArgs) -> Result<()> {
    let inputs = load_inputs(&args)?;
    let body = request_body(args.model.as_deref(), inputs);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    let url = format!("{}/v1/proof", args.url.trim_end_matches('/'));
    let response: ProofResponse = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Failed to reach miner at {}", url))?
        .error_for_status()?
        .json()
        .await
        .context("Miner returned an invalid response")?;

    match &response.output {
        ProofOutput::Proof(proof) => {
            let len = response.proof_bytes().map(|p| p.len()).unwrap_or_default();
            println!("model: {}", response.model_id.as_deref().unwrap_or("-"));
            println!("proof ({} bytes): {}", len, proof);
            Ok(())
        }
        ProofOutput::Error(message) => anyhow::bail!("Miner answered with an error: {}", message),
    }
}

fn load_inputs(args: &QueryArgs) -> Result<Option<Value>> {
    let raw = match (&args.inputs, &args.inputs_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inputs file: {}", path.display()))?,
        (None, None) => return Ok(None),
    };

    let value = serde_json::from_str(&raw).context("Public inputs are not valid JSON")?;
    Ok(Some(value))
}

fn request_body(model: Option<&str>, inputs: Option<Value>) -> Value {
    json!({
        "query_input": {
            "model_id": model,
            "public_inputs": inputs,
        }
    })
}
