//! Toroidal-embedding resonance search for semiprime factors.
//!
//! Integers are mapped to points on the flat torus [0,1)^D by a golden-ratio
//! rotation at adaptive fixed-point precision. Candidates sampled around an
//! anchor near sqrt(N) are ranked by periodic distance to N's embedding and
//! every one of them is tested for exact division.
//!
//! The pipeline: [`precision`] sizes the arithmetic, [`embedding`] maps
//! integers to torus points, [`distance`] compares them, [`sampler`]
//! produces candidates and [`search`] drives the sweep.

pub mod config;
pub mod distance;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod precision;
pub mod sampler;
pub mod search;

pub use config::{ParameterGrid, SearchBudget, SearchConfig};
pub use distance::periodic_distance;
pub use domain::{DomainPolicy, OperationalDomain};
pub use embedding::{EmbeddingParameters, EmbeddingPoint, EmbeddingStrategy, ToroidalEmbedder};
pub use error::ResonanceError;
pub use precision::{Precision, PrecisionContext, PrecisionPolicy};
pub use sampler::{AdmissibilityFilter, Candidate, CandidateSampler, SamplingWindow, Tier};
pub use search::{
    CombinationSummary, FactorPair, NoFactorReport, ResonanceSearch, ScoredCandidate,
    SearchOutcome, StopReason,
};
