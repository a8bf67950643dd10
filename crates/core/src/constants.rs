//! Fixed-point scales used by the subnet registry.
//!
//! These MUST match the encoding of `SubnetRegistry.members()`.

/// Base units per whole token for stake and emission.
pub const TOKEN_DECIMALS_SCALE: f64 = 1_000_000_000.0;

/// Denominator of the u16 fixed-point ratios (rank, trust, consensus, incentive).
pub const U16_RATIO_SCALE: f64 = u16::MAX as f64;

/// Weight value meaning "full trust" when assigning weights.
pub const MAX_WEIGHT: u16 = u16::MAX;

/// Error marker returned to validators when no proof could be produced.
pub const PROOF_ERROR_MARKER: &str = "An error occurred";
