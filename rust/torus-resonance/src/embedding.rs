//! Toroidal embedding of integers.
//!
//! Coordinate i of n is the golden-ratio rotation frac(n * phi^i), pushed
//! through the geodesic exponent k and, depending on the strategy, a phase
//! shear and an imbalance axis. Every coordinate lands in [0, 1).

use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};

use crate::error::ResonanceError;
use crate::precision::PrecisionContext;

/// Lower bound of the affine map that turns theta_r into the imbalance axis.
/// Matches the working theta_r range so that range spans the whole axis.
pub const THETA_AXIS_MIN: f64 = -0.6;
/// Upper bound (exclusive) of the imbalance-axis map.
pub const THETA_AXIS_MAX: f64 = 0.6;

/// Closed set of embedding variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStrategy {
    /// Golden rotation with geodesic exponent. theta_r must be absent.
    #[default]
    Rotation,
    /// Rotation plus a per-axis phase shear i * theta_r / 2.
    Sheared,
    /// Sheared rotation on the first D-1 axes; the last axis is theta_r
    /// rescaled into [0, 1).
    ImbalanceAxis,
}

impl EmbeddingStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotation" | "golden" => Some(EmbeddingStrategy::Rotation),
            "sheared" | "shear" => Some(EmbeddingStrategy::Sheared),
            "imbalance-axis" | "imbalance_axis" | "axis" => Some(EmbeddingStrategy::ImbalanceAxis),
            _ => None,
        }
    }

    fn uses_theta(self) -> bool {
        !matches!(self, EmbeddingStrategy::Rotation)
    }
}

/// Parameters of one embedding, fixed for a parameter combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParameters {
    /// Total number of torus axes (D).
    pub dimension: usize,
    /// Geodesic exponent.
    pub k: f64,
    /// Imbalance parameter.
    pub theta_r: Option<f64>,
}

/// A point on the flat torus [0, 1)^D.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingPoint {
    coords: Vec<f64>,
}

impl EmbeddingPoint {
    /// Build a point, wrapping every coordinate into [0, 1).
    pub fn new(coords: Vec<f64>) -> Self {
        let coords = coords
            .into_iter()
            .map(|c| {
                let w = c.rem_euclid(1.0);
                if w >= 1.0 {
                    0.0
                } else {
                    w
                }
            })
            .collect();
        Self { coords }
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn dimension(&self) -> usize {
        self.coords.len()
    }
}

/// Embeds integers according to a fixed strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToroidalEmbedder {
    strategy: EmbeddingStrategy,
}

impl ToroidalEmbedder {
    pub fn new(strategy: EmbeddingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> EmbeddingStrategy {
        self.strategy
    }

    /// Check that `params` make sense for this strategy.
    pub fn validate(&self, params: &EmbeddingParameters) -> Result<(), ResonanceError> {
        if params.dimension == 0 {
            return Err(ResonanceError::InvalidParameters(
                "dimension must be at least 1".into(),
            ));
        }
        if params.dimension > u32::MAX as usize {
            return Err(ResonanceError::InvalidParameters(format!(
                "dimension {} is too large",
                params.dimension
            )));
        }
        if !params.k.is_finite() || params.k <= 0.0 {
            return Err(ResonanceError::InvalidParameters(format!(
                "geodesic exponent k={} must be finite and positive",
                params.k
            )));
        }
        match (self.strategy.uses_theta(), params.theta_r) {
            (false, Some(theta)) => {
                return Err(ResonanceError::InvalidParameters(format!(
                    "theta_r={} given but the rotation strategy has no imbalance term",
                    theta
                )))
            }
            (true, None) => {
                return Err(ResonanceError::InvalidParameters(format!(
                    "{:?} strategy requires theta_r",
                    self.strategy
                )))
            }
            (true, Some(theta)) if !theta.is_finite() => {
                return Err(ResonanceError::InvalidParameters(format!(
                    "theta_r={} must be finite",
                    theta
                )))
            }
            _ => {}
        }
        if self.strategy == EmbeddingStrategy::ImbalanceAxis && params.dimension < 2 {
            return Err(ResonanceError::InvalidParameters(
                "imbalance-axis embedding needs dimension >= 2".into(),
            ));
        }
        Ok(())
    }

    /// Embed `n` under `params`, entirely in `ctx`'s fixed-point arithmetic.
    pub fn embed(
        &self,
        n: &BigUint,
        params: &EmbeddingParameters,
        ctx: &PrecisionContext,
    ) -> Result<EmbeddingPoint, ResonanceError> {
        self.validate(params)?;
        ctx.ensure_covers(n)?;

        let rotation_axes = match self.strategy {
            EmbeddingStrategy::ImbalanceAxis => params.dimension - 1,
            _ => params.dimension,
        };

        let k = (params.k != 1.0).then(|| ctx.fixed_from_f64(params.k).into_parts().1);
        // theta_r / 2 in fixed point; multiplied by the axis index below
        let half_shear = params
            .theta_r
            .filter(|_| self.strategy.uses_theta())
            .map(|theta| ctx.fixed_from_f64(theta) >> 1u32);

        let mut coords = Vec::with_capacity(params.dimension);
        for i in 1..=rotation_axes as u32 {
            let mut c = ctx.golden_rotation(n, i);
            if let Some(k) = &k {
                c = ctx.pow_unit(&c, k);
            }
            if let Some(shear) = &half_shear {
                c = ctx.wrap(&(BigInt::from(c) + shear * i));
            }
            coords.push(ctx.to_unit_f64(&c));
        }

        if self.strategy == EmbeddingStrategy::ImbalanceAxis {
            let theta = params.theta_r.unwrap_or_default();
            coords.push(imbalance_coordinate(theta, ctx));
        }

        Ok(EmbeddingPoint { coords })
    }
}

/// Affine map of theta_r from [THETA_AXIS_MIN, THETA_AXIS_MAX) onto [0, 1),
/// wrapped for values outside that range.
fn imbalance_coordinate(theta: f64, ctx: &PrecisionContext) -> f64 {
    let span = THETA_AXIS_MAX - THETA_AXIS_MIN;
    let shifted = ctx.fixed_from_f64((theta - THETA_AXIS_MIN) / span);
    ctx.to_unit_f64(&ctx.wrap(&shifted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precision::PrecisionPolicy;

    fn params(dimension: usize, k: f64, theta_r: Option<f64>) -> EmbeddingParameters {
        EmbeddingParameters {
            dimension,
            k,
            theta_r,
        }
    }

    fn ctx_for(n: &BigUint) -> PrecisionContext {
        PrecisionContext::for_modulus(PrecisionPolicy::default(), n)
    }

    #[test]
    fn test_rotation_shape_and_range() {
        let n = BigUint::from(1_073_217_479u64);
        let ctx = ctx_for(&n);
        let embedder = ToroidalEmbedder::new(EmbeddingStrategy::Rotation);
        for &k in &[0.25, 0.35, 0.45, 1.0] {
            let p = embedder.embed(&n, &params(7, k, None), &ctx).unwrap();
            assert_eq!(p.dimension(), 7);
            for &c in p.coords() {
                assert!((0.0..1.0).contains(&c), "coordinate {} out of range", c);
            }
        }
    }

    #[test]
    fn test_unit_exponent_is_plain_rotation() {
        let n = BigUint::from(1u32);
        let ctx = ctx_for(&n);
        let embedder = ToroidalEmbedder::default();
        let p = embedder.embed(&n, &params(2, 1.0, None), &ctx).unwrap();
        // frac(phi) and frac(phi^2) are both phi - 1
        for &c in p.coords() {
            assert!((c - 0.618_033_988_749_894_8).abs() < 1e-15);
        }
    }

    #[test]
    fn test_geodesic_exponent_applied() {
        let n = BigUint::from(1u32);
        let ctx = ctx_for(&n);
        let embedder = ToroidalEmbedder::default();
        let p = embedder.embed(&n, &params(1, 0.5, None), &ctx).unwrap();
        let expected = 0.618_033_988_749_894_8f64.sqrt();
        assert!((p.coords()[0] - expected).abs() < 1e-14);
    }

    #[test]
    fn test_shear_offsets_each_axis() {
        let n = BigUint::from(1u32);
        let ctx = ctx_for(&n);
        let plain = ToroidalEmbedder::new(EmbeddingStrategy::Rotation)
            .embed(&n, &params(3, 1.0, None), &ctx)
            .unwrap();
        let sheared = ToroidalEmbedder::new(EmbeddingStrategy::Sheared)
            .embed(&n, &params(3, 1.0, Some(0.2)), &ctx)
            .unwrap();
        for (i, (a, b)) in plain.coords().iter().zip(sheared.coords()).enumerate() {
            let expected = (a + (i + 1) as f64 * 0.1).rem_euclid(1.0);
            assert!((b - expected).abs() < 1e-12, "axis {}: {} vs {}", i + 1, b, expected);
        }
    }

    #[test]
    fn test_imbalance_axis_is_independent_of_n() {
        let embedder = ToroidalEmbedder::new(EmbeddingStrategy::ImbalanceAxis);
        let a = BigUint::from(1_000_003u64);
        let b = BigUint::from(7_919u64);
        let ctx = ctx_for(&a);
        let pa = embedder.embed(&a, &params(8, 0.35, Some(-0.3)), &ctx).unwrap();
        let pb = embedder.embed(&b, &params(8, 0.35, Some(-0.3)), &ctx).unwrap();
        assert_eq!(pa.dimension(), 8);
        assert_eq!(pa.coords()[7], pb.coords()[7]);
        assert!((pa.coords()[7] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_imbalance_axis_spans_theta_range() {
        let n = BigUint::from(1_000_003u64);
        let ctx = ctx_for(&n);
        let embedder = ToroidalEmbedder::new(EmbeddingStrategy::ImbalanceAxis);
        for (theta, expected) in [(-0.6, 0.0), (-0.3, 0.25), (0.0, 0.5), (0.3, 0.75)] {
            let p = embedder.embed(&n, &params(4, 0.35, Some(theta)), &ctx).unwrap();
            assert!(
                (p.coords()[3] - expected).abs() < 1e-12,
                "theta_r={} gave {}",
                theta,
                p.coords()[3]
            );
        }
        // The upper end wraps back to the origin.
        let p = embedder.embed(&n, &params(4, 0.35, Some(0.6)), &ctx).unwrap();
        assert!(p.coords()[3] < 1e-12 || p.coords()[3] > 1.0 - 1e-12);
    }

    #[test]
    fn test_deterministic() {
        let n = BigUint::from(1_152_921_470_247_108_503u64);
        let ctx = ctx_for(&n);
        let embedder = ToroidalEmbedder::new(EmbeddingStrategy::Sheared);
        let p = params(7, 0.3, Some(0.4));
        assert_eq!(
            embedder.embed(&n, &p, &ctx).unwrap(),
            embedder.embed(&n, &p, &ctx).unwrap()
        );
    }

    #[test]
    fn test_precision_underflow_is_fatal() {
        let n = BigUint::from(1_152_921_470_247_108_503u64);
        let weak = PrecisionContext::with_precision(
            PrecisionPolicy::default(),
            crate::precision::Precision::from_digits(50),
        );
        let result = ToroidalEmbedder::default().embed(&n, &params(7, 0.35, None), &weak);
        assert!(matches!(
            result,
            Err(ResonanceError::PrecisionUnderflow { .. })
        ));
    }

    #[test]
    fn test_parameter_validation() {
        let rotation = ToroidalEmbedder::new(EmbeddingStrategy::Rotation);
        let sheared = ToroidalEmbedder::new(EmbeddingStrategy::Sheared);
        let axis = ToroidalEmbedder::new(EmbeddingStrategy::ImbalanceAxis);
        assert!(rotation.validate(&params(7, 0.35, None)).is_ok());
        assert!(rotation.validate(&params(0, 0.35, None)).is_err());
        assert!(rotation.validate(&params(7, 0.0, None)).is_err());
        assert!(rotation.validate(&params(7, f64::NAN, None)).is_err());
        assert!(rotation.validate(&params(7, 0.35, Some(0.1))).is_err());
        assert!(sheared.validate(&params(7, 0.35, None)).is_err());
        assert!(sheared.validate(&params(7, 0.35, Some(f64::INFINITY))).is_err());
        assert!(axis.validate(&params(1, 0.35, Some(0.1))).is_err());
        assert!(axis.validate(&params(8, 0.35, Some(0.1))).is_ok());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(EmbeddingStrategy::parse("rotation"), Some(EmbeddingStrategy::Rotation));
        assert_eq!(EmbeddingStrategy::parse("Sheared"), Some(EmbeddingStrategy::Sheared));
        assert_eq!(
            EmbeddingStrategy::parse("imbalance-axis"),
            Some(EmbeddingStrategy::ImbalanceAxis)
        );
        assert_eq!(EmbeddingStrategy::parse("spiral"), None);
    }

    #[test]
    fn test_point_new_wraps() {
        let p = EmbeddingPoint::new(vec![1.25, -0.25, 0.0]);
        assert_eq!(p.coords(), &[0.25, 0.75, 0.0]);
    }
}
