//! Core types for zkminer.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::constants::{PROOF_ERROR_MARKER, TOKEN_DECIMALS_SCALE, U16_RATIO_SCALE};
use crate::error::CoreError;

/// One participant of a subnet roster together with its reputation metrics.
///
/// Stake and emission are expressed in whole tokens, the remaining metrics are
/// ratios in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Hotkey address of the participant.
    pub address: Address,
    /// Stake, in tokens.
    pub stake: f64,
    /// Rank ratio.
    pub rank: f64,
    /// Trust ratio.
    pub trust: f64,
    /// Consensus ratio.
    pub consensus: f64,
    /// Incentive ratio.
    pub incentive: f64,
    /// Emission per block, in tokens.
    pub emission: f64,
}

impl MemberRecord {
    /// A member with zeroed metrics.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            stake: 0.0,
            rank: 0.0,
            trust: 0.0,
            consensus: 0.0,
            incentive: 0.0,
            emission: 0.0,
        }
    }

    /// Build a member from the registry's raw integer encoding.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        address: Address,
        stake: u64,
        rank: u16,
        trust: u16,
        consensus: u16,
        incentive: u16,
        emission: u64,
    ) -> Self {
        Self {
            address,
            stake: stake as f64 / TOKEN_DECIMALS_SCALE,
            rank: f64::from(rank) / U16_RATIO_SCALE,
            trust: f64::from(trust) / U16_RATIO_SCALE,
            consensus: f64::from(consensus) / U16_RATIO_SCALE,
            incentive: f64::from(incentive) / U16_RATIO_SCALE,
            emission: emission as f64 / TOKEN_DECIMALS_SCALE,
        }
    }
}

/// Point-in-time roster of a subnet.
///
/// A snapshot is never mutated after construction; a refresh builds a new one
/// and swaps it in whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// Subnet identifier.
    pub netuid: u16,
    /// Block height the roster was read at.
    pub block: u64,
    /// Members ordered by uid.
    pub members: Vec<MemberRecord>,
}

impl NetworkSnapshot {
    /// Create a new snapshot.
    pub fn new(netuid: u16, block: u64, members: Vec<MemberRecord>) -> Self {
        Self {
            netuid,
            block,
            members,
        }
    }

    /// Snapshot with no members, used before the first refresh.
    pub fn empty(netuid: u16) -> Self {
        Self::new(netuid, 0, Vec::new())
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// First uid whose address matches exactly.
    pub fn uid_of(&self, address: &Address) -> Option<u16> {
        self.members
            .iter()
            .position(|m| m.address == *address)
            .and_then(|pos| u16::try_from(pos).ok())
    }

    /// Member at `uid`.
    pub fn member(&self, uid: u16) -> Result<&MemberRecord, CoreError> {
        self.members
            .get(usize::from(uid))
            .ok_or(CoreError::UidOutOfRange {
                uid,
                len: self.members.len(),
            })
    }

    /// All hotkey addresses in uid order.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.members.iter().map(|m| &m.address)
    }
}

/// Proof request sent by a validator.
///
/// Both fields are optional on the wire; a request without public inputs is
/// answered according to the miner's fallback policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofRequest {
    /// Model to prove.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Opaque public inputs handed to the proof backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_inputs: Option<Value>,
}

impl ProofRequest {
    /// Build a request for `model_id` with the given inputs.
    pub fn new(model_id: impl Into<String>, public_inputs: Value) -> Self {
        Self {
            model_id: Some(model_id.into()),
            public_inputs: Some(public_inputs),
        }
    }

    /// Decode a request from a raw JSON body.
    ///
    /// The legacy envelope `{"query_input": {"model_id": .., "public_inputs": ..}}`
    /// is accepted as well as the flat form; `{"query_input": null}` is a
    /// request without inputs.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| CoreError::MalformedRequest(e.to_string()))?;

        let value = match value {
            Value::Object(mut map) if map.contains_key("query_input") => {
                map.remove("query_input").unwrap_or(Value::Null)
            }
            other => other,
        };

        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| CoreError::MalformedRequest(e.to_string())),
            other => Err(CoreError::MalformedRequest(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Outcome carried back to the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofOutput {
    /// Hex-encoded proof bytes (`0x` prefixed).
    Proof(String),
    /// Explicit error marker.
    Error(String),
}

/// Response to a [`ProofRequest`]. Always produced, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResponse {
    /// Model the response refers to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Proof or error marker.
    pub output: ProofOutput,
}

impl ProofResponse {
    /// Successful response carrying `proof`.
    pub fn proof(model_id: Option<String>, proof: &[u8]) -> Self {
        Self {
            model_id,
            output: ProofOutput::Proof(format!("0x{}", hex::encode(proof))),
        }
    }

    /// Error-marker response with a short reason.
    pub fn failed(model_id: Option<String>, reason: impl fmt::Display) -> Self {
        Self {
            model_id,
            output: ProofOutput::Error(format!("{}: {}", PROOF_ERROR_MARKER, reason)),
        }
    }

    /// Whether the response carries a proof.
    pub fn is_proof(&self) -> bool {
        matches!(self.output, ProofOutput::Proof(_))
    }

    /// Decoded proof bytes, if any.
    pub fn proof_bytes(&self) -> Option<Vec<u8>> {
        match &self.output {
            ProofOutput::Proof(hex_str) => hex::decode(hex_str.trim_start_matches("0x")).ok(),
            ProofOutput::Error(_) => None,
        }
    }
}
