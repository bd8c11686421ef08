//! Run configuration: parameter grid, budget and the overridable empirical
//! constants. Loadable from JSON; every field has a default.

use std::path::Path;
use std::time::Duration;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingParameters, EmbeddingStrategy, ToroidalEmbedder};
use crate::error::ResonanceError;
use crate::precision::PrecisionPolicy;
use crate::sampler::{SamplerConfig, SamplingWindow};

/// Parameter sweep: outer loop over k, inner loop over theta_r.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterGrid {
    pub dimension: usize,
    pub k_values: Vec<f64>,
    /// Empty means no imbalance parameter.
    pub theta_values: Vec<f64>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            dimension: 7,
            k_values: vec![0.35],
            theta_values: Vec::new(),
        }
    }
}

impl ParameterGrid {
    /// Every (k, theta_r) combination in sweep order.
    pub fn combinations(&self) -> Vec<EmbeddingParameters> {
        let thetas: Vec<Option<f64>> = if self.theta_values.is_empty() {
            vec![None]
        } else {
            self.theta_values.iter().copied().map(Some).collect()
        };
        self.k_values
            .iter()
            .flat_map(|&k| {
                thetas.iter().map(move |&theta_r| EmbeddingParameters {
                    dimension: self.dimension,
                    k,
                    theta_r,
                })
            })
            .collect()
    }
}

/// Limits on a run. Whichever is reached first ends it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBudget {
    /// Candidates evaluated across all combinations.
    pub max_candidates: u64,
    /// Wall-clock limit in seconds.
    pub max_seconds: f64,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_candidates: 10_000,
            max_seconds: 60.0,
        }
    }
}

impl SearchBudget {
    pub fn timeout(&self) -> Result<Duration, ResonanceError> {
        Duration::try_from_secs_f64(self.max_seconds).map_err(|e| {
            ResonanceError::Config(format!("invalid timeout {}s: {}", self.max_seconds, e))
        })
    }
}

/// Everything a run needs besides N and the optional anchor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: EmbeddingStrategy,
    pub grid: ParameterGrid,
    pub budget: SearchBudget,
    pub precision: PrecisionPolicy,
    pub sampler: SamplerConfig,
    /// Explicit sampling radius; replaces the schedule's radius when set.
    pub window: Option<u64>,
    /// Skip the operational-domain check.
    pub domain_override: bool,
}

impl SearchConfig {
    pub fn from_json(json: &str) -> Result<Self, ResonanceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ResonanceError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), ResonanceError> {
        if self.grid.k_values.is_empty() {
            return Err(ResonanceError::Config("parameter grid has no k values".into()));
        }
        let embedder = ToroidalEmbedder::new(self.strategy);
        for params in self.grid.combinations() {
            embedder.validate(&params)?;
        }
        self.budget.timeout()?;
        self.sampler.validate()
    }

    /// Sampling window for `n`: the schedule's band, with the radius
    /// replaced by [`SearchConfig::window`] when set.
    pub fn window_for(&self, n: &BigUint) -> Result<SamplingWindow, ResonanceError> {
        let mut window = self
            .sampler
            .schedule
            .window_for_bits(n.bits())
            .ok_or_else(|| ResonanceError::Config("window schedule has no steps".into()))?;
        if let Some(radius) = self.window {
            window.radius = radius;
        }
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_order_k_outer_theta_inner() {
        let grid = ParameterGrid {
            dimension: 8,
            k_values: vec![0.3, 0.4],
            theta_values: vec![-0.5, 0.5],
        };
        let combos: Vec<(f64, Option<f64>)> = grid
            .combinations()
            .iter()
            .map(|p| (p.k, p.theta_r))
            .collect();
        assert_eq!(
            combos,
            vec![
                (0.3, Some(-0.5)),
                (0.3, Some(0.5)),
                (0.4, Some(-0.5)),
                (0.4, Some(0.5)),
            ]
        );
    }

    #[test]
    fn test_grid_without_theta() {
        let grid = ParameterGrid {
            k_values: vec![0.30, 0.35, 0.40],
            ..ParameterGrid::default()
        };
        let combos = grid.combinations();
        assert_eq!(combos.len(), 3);
        assert!(combos.iter().all(|p| p.theta_r.is_none() && p.dimension == 7));
    }

    #[test]
    fn test_defaults_validate() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = SearchConfig::default();
        config.grid.k_values.clear();
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.strategy = EmbeddingStrategy::Sheared;
        assert!(config.validate().is_err(), "sheared without theta");

        let mut config = SearchConfig::default();
        config.budget.max_seconds = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SearchConfig::from_json(
            r#"{
                "strategy": "imbalance_axis",
                "grid": { "dimension": 8, "theta_values": [-0.2, 0.2] },
                "budget": { "max_candidates": 500 },
                "window": 20000
            }"#,
        )
        .unwrap();
        assert_eq!(config.strategy, EmbeddingStrategy::ImbalanceAxis);
        assert_eq!(config.grid.k_values, vec![0.35]);
        assert_eq!(config.budget.max_candidates, 500);
        assert_eq!(config.budget.max_seconds, 60.0);
        assert_eq!(config.precision, PrecisionPolicy::default());
        assert!(config.validate().is_ok());

        let window = config.window_for(&BigUint::from(1_073_217_479u64)).unwrap();
        assert_eq!(window.radius, 20_000);
        assert_eq!(window.outer_stride, 1_000);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            SearchConfig::from_json("{ not json"),
            Err(ResonanceError::Config(_))
        ));
    }

    #[test]
    fn test_json_round_trip_of_defaults() {
        let json = serde_json::to_string(&SearchConfig::default()).unwrap();
        assert_eq!(SearchConfig::from_json(&json).unwrap(), SearchConfig::default());
    }
}
