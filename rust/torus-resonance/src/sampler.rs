//! Deterministic multi-resolution candidate sampling around an anchor.
//!
//! Offsets come from a declarative table of tiers. Each tier is a range of
//! offset magnitudes walked with a fixed stride; resolution drops as the
//! magnitude grows. The outermost tier's reach and stride depend on N's bit
//! length through a [`WindowSchedule`].

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::ResonanceError;

/// Magnitude where the fixed tiers end and the outer tier begins.
pub const OUTER_TIER_START: u64 = 50_000;

/// Optional extra pre-filter supplied by the caller. It may only skip work:
/// a rejected value is never tested, so it must not reject true factors the
/// experiment expects to find.
pub trait AdmissibilityFilter: Send + Sync {
    fn is_admissible(&self, v: &BigUint) -> bool;
}

impl<F> AdmissibilityFilter for F
where
    F: Fn(&BigUint) -> bool + Send + Sync,
{
    fn is_admissible(&self, v: &BigUint) -> bool {
        self(v)
    }
}

/// Offset magnitudes `from, from + stride, ...` up to `to` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub from: u64,
    pub to: u64,
    pub stride: u64,
}

impl Tier {
    pub const fn new(from: u64, to: u64, stride: u64) -> Self {
        Self { from, to, stride }
    }

    fn magnitudes(self) -> impl Iterator<Item = u64> {
        let stride = self.stride.max(1);
        let count = if self.to < self.from {
            0
        } else {
            (self.to - self.from) / stride + 1
        };
        (0..count).map(move |j| self.from + j * stride)
    }

    fn clipped(self, radius: u64) -> Option<Self> {
        let to = self.to.min(radius);
        (self.from <= to).then_some(Tier { to, ..self })
    }
}

/// Ultra-inner, inner and middle tiers.
pub const FIXED_TIERS: [Tier; 3] = [
    Tier::new(0, 100, 1),
    Tier::new(110, 5_000, 10),
    Tier::new(5_100, OUTER_TIER_START, 100),
];

/// Sampling reach for one bit-length band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingWindow {
    /// Largest offset magnitude sampled.
    pub radius: u64,
    /// Stride of the outer tier.
    pub outer_stride: u64,
}

/// Band of the window schedule: applies to N with fewer than `below_bits` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStep {
    pub below_bits: u64,
    pub window: SamplingWindow,
}

/// Monotone step function from N's bit length to a sampling window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSchedule {
    pub steps: Vec<WindowStep>,
}

impl Default for WindowSchedule {
    fn default() -> Self {
        let step = |below_bits, radius, outer_stride| WindowStep {
            below_bits,
            window: SamplingWindow {
                radius,
                outer_stride,
            },
        };
        Self {
            steps: vec![
                step(40, 100_000, 1_000),
                step(60, 1_000_000, 10_000),
                step(86, 5_000_000, 50_000),
                step(u64::MAX, 20_000_000, 200_000),
            ],
        }
    }
}

impl WindowSchedule {
    /// Window for an N of `bits` bits. Past the last band, the last band's
    /// window applies.
    pub fn window_for_bits(&self, bits: u64) -> Option<SamplingWindow> {
        self.steps
            .iter()
            .find(|s| bits < s.below_bits)
            .or_else(|| self.steps.last())
            .map(|s| s.window)
    }

    /// Steps must be ordered by bit band with non-shrinking radius and stride.
    pub fn validate(&self) -> Result<(), ResonanceError> {
        if self.steps.is_empty() {
            return Err(ResonanceError::Config("window schedule has no steps".into()));
        }
        for pair in self.steps.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.below_bits >= b.below_bits
                || a.window.radius > b.window.radius
                || a.window.outer_stride > b.window.outer_stride
            {
                return Err(ResonanceError::Config(format!(
                    "window schedule is not monotone at {} bits",
                    b.below_bits
                )));
            }
        }
        if self.steps.iter().any(|s| s.window.outer_stride == 0) {
            return Err(ResonanceError::Config("outer stride must be positive".into()));
        }
        Ok(())
    }
}

/// Tier table and window schedule, serialisable as part of the search config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub tiers: Vec<Tier>,
    pub schedule: WindowSchedule,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tiers: FIXED_TIERS.to_vec(),
            schedule: WindowSchedule::default(),
        }
    }
}

impl SamplerConfig {
    /// Tiers must have positive strides and cover ascending, disjoint
    /// magnitude ranges.
    pub fn validate(&self) -> Result<(), ResonanceError> {
        for t in &self.tiers {
            if t.stride == 0 {
                return Err(ResonanceError::Config("tier stride must be positive".into()));
            }
            if t.from > t.to {
                return Err(ResonanceError::Config(format!(
                    "tier {}..={} is empty",
                    t.from, t.to
                )));
            }
        }
        for pair in self.tiers.windows(2) {
            if pair[0].to >= pair[1].from {
                return Err(ResonanceError::Config(format!(
                    "tier starting at {} overlaps or precedes the tier ending at {}",
                    pair[1].from, pair[0].to
                )));
            }
        }
        self.schedule.validate()
    }
}

/// A sampled value `anchor + offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub offset: i64,
    pub value: BigUint,
}

/// Tiered offset generator for one window.
#[derive(Debug, Clone)]
pub struct CandidateSampler {
    tiers: Vec<Tier>,
}

impl CandidateSampler {
    /// Clip `inner` to the window and append the outer tier, which begins
    /// one outer stride past the furthest inner tier.
    pub fn new(inner: &[Tier], window: SamplingWindow) -> Self {
        let radius = window.radius.min(i64::MAX as u64);
        let mut tiers: Vec<Tier> = inner.iter().filter_map(|t| t.clipped(radius)).collect();
        let stride = window.outer_stride.max(1);
        let outer_from = match inner.iter().map(|t| t.to).max() {
            Some(reach) => reach.checked_add(stride),
            None => Some(0),
        };
        if let Some(from) = outer_from.filter(|&from| from <= radius) {
            tiers.push(Tier::new(from, radius, stride));
        }
        Self { tiers }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// All offsets, tier by tier, ascending magnitude, `+m` before `-m`.
    pub fn offsets(&self) -> impl Iterator<Item = i64> + '_ {
        self.tiers
            .iter()
            .flat_map(|tier| tier.magnitudes())
            .flat_map(|m| {
                let m = m as i64;
                std::iter::once(m).chain((m != 0).then_some(-m))
            })
    }

    /// Candidates in visitation order, after the range, wheel and
    /// admissibility pre-filters.
    pub fn generate<'a>(
        &'a self,
        anchor: &'a BigUint,
        n: &'a BigUint,
        filter: Option<&'a dyn AdmissibilityFilter>,
    ) -> impl Iterator<Item = Candidate> + 'a {
        self.offsets().filter_map(move |offset| {
            let value = offset_value(anchor, offset)?;
            if !in_open_range(&value, n) || !passes_wheel(&value) {
                return None;
            }
            if let Some(f) = filter {
                if !f.is_admissible(&value) {
                    return None;
                }
            }
            Some(Candidate { offset, value })
        })
    }
}

fn offset_value(anchor: &BigUint, offset: i64) -> Option<BigUint> {
    let magnitude = BigUint::from(offset.unsigned_abs());
    if offset >= 0 {
        Some(anchor + magnitude)
    } else if *anchor > magnitude {
        Some(anchor - magnitude)
    } else {
        None
    }
}

fn in_open_range(v: &BigUint, n: &BigUint) -> bool {
    *v > BigUint::from(1u32) && v < n
}

/// False for multiples of 2, 3 or 5.
pub fn passes_wheel(v: &BigUint) -> bool {
    match (v % 30u32).to_u32() {
        Some(r) => r % 2 != 0 && r % 3 != 0 && r % 5 != 0,
        None => false,
    }
}
