//! Error taxonomy for the resonance engine.
//!
//! Budget exhaustion is not an error: it is reported through
//! [`crate::search::SearchOutcome::NoFactor`].

use num_bigint::BigUint;

/// Errors that abort a resonance run.
#[derive(Debug, thiserror::Error)]
pub enum ResonanceError {
    #[error("N={n} ({bits} bits) is outside the operational domain and not whitelisted")]
    Domain { n: BigUint, bits: u64 },

    #[error("cannot compare points of dimension {left} and {right}")]
    ShapeMismatch { left: usize, right: usize },

    #[error(
        "precision underflow: {bits}-bit value needs {required} digits, context has {available}"
    )]
    PrecisionUnderflow {
        required: u32,
        available: u32,
        bits: u64,
    },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ResonanceError {
    fn from(e: serde_json::Error) -> Self {
        ResonanceError::Config(e.to_string())
    }
}
