//! Adaptive-precision fixed-point arithmetic.
//!
//! The embedding multiplies N by powers of the golden ratio and then raises
//! fractional parts to non-integer powers, so the number of trustworthy
//! low-order digits shrinks as N grows. [`PrecisionPolicy`] fixes how many
//! decimal digits a run needs; [`PrecisionContext`] carries out the
//! arithmetic at that precision.
//!
//! Fixed-point values are plain `BigUint`s scaled by `2^B`, where `B` is the
//! context's fractional bit count. A value in `[0, 1)` is therefore an
//! integer in `[0, 2^B)`.

use std::fmt;

use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{Float, One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::error::ResonanceError;

/// Extra fractional bits carried beyond the policy's requirement. Absorbs
/// the rounding of series truncation and the squaring steps in `exp`.
const GUARD_BITS: u64 = 64;

/// Number of argument halvings before the exponential Taylor series.
const EXP_HALVINGS: u32 = 16;

/// log2(10) scaled by 10^6, rounded up.
const LOG2_10_MICRO: u64 = 3_321_929;

/// Arithmetic precision in decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Precision(u32);

impl Precision {
    pub fn from_digits(digits: u32) -> Self {
        Precision(digits.max(1))
    }

    pub fn digits(self) -> u32 {
        self.0
    }

    /// Binary fractional bits equivalent to this many decimal digits.
    pub fn binary_bits(self) -> u64 {
        (self.0 as u64 * LOG2_10_MICRO + 999_999) / 1_000_000
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} digits", self.0)
    }
}

/// Maps N's bit length to the decimal precision the embedding needs.
///
/// `required = max(floor_digits, bits * digits_per_bit + offset_digits)`.
/// The defaults are empirical; they are fields so experiments can override
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionPolicy {
    pub floor_digits: u32,
    pub digits_per_bit: u32,
    pub offset_digits: u32,
}

impl Default for PrecisionPolicy {
    fn default() -> Self {
        Self {
            floor_digits: 50,
            digits_per_bit: 4,
            offset_digits: 200,
        }
    }
}

impl PrecisionPolicy {
    /// Precision required to embed `n`.
    pub fn required_precision(&self, n: &BigUint) -> Precision {
        self.required_for_bits(n.bits())
    }

    pub fn required_for_bits(&self, bits: u64) -> Precision {
        let scaled = bits
            .saturating_mul(self.digits_per_bit as u64)
            .saturating_add(self.offset_digits as u64);
        let digits = scaled.max(self.floor_digits as u64).min(u32::MAX as u64) as u32;
        Precision::from_digits(digits)
    }
}

/// Per-run fixed-point arithmetic context.
///
/// Owned by exactly one run (or one worker of a parallel run). Cloning is
/// how a parallel driver hands each worker its own context.
#[derive(Debug, Clone)]
pub struct PrecisionContext {
    policy: PrecisionPolicy,
    precision: Precision,
    frac_bits: u64,
    one: BigUint,
    phi: BigUint,
    ln2: BigUint,
    sqrt_half: BigUint,
}

impl PrecisionContext {
    /// Context at exactly the precision `policy` requires for `n`.
    pub fn for_modulus(policy: PrecisionPolicy, n: &BigUint) -> Self {
        Self::with_precision(policy, policy.required_precision(n))
    }

    /// Context at an explicit precision. Embedding a value whose requirement
    /// exceeds `precision` fails with [`ResonanceError::PrecisionUnderflow`].
    pub fn with_precision(policy: PrecisionPolicy, precision: Precision) -> Self {
        let frac_bits = precision.binary_bits() + GUARD_BITS;
        let one = BigUint::one() << frac_bits;

        // phi = (1 + sqrt 5) / 2
        let sqrt5 = (BigUint::from(5u32) << (2 * frac_bits)).sqrt();
        let phi = (&one + sqrt5) >> 1u32;

        // ln 2 = 2 atanh(1/3)
        let third = &one / 3u32;
        let ln2 = atanh_series(&third, frac_bits) << 1u32;

        let sqrt_half = (BigUint::one() << (2 * frac_bits - 1)).sqrt();

        Self {
            policy,
            precision,
            frac_bits,
            one,
            phi,
            ln2,
            sqrt_half,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn policy(&self) -> &PrecisionPolicy {
        &self.policy
    }

    /// Working fractional bits, guard band included.
    pub fn frac_bits(&self) -> u64 {
        self.frac_bits
    }

    /// Fails unless this context is precise enough to embed `value`.
    pub fn ensure_covers(&self, value: &BigUint) -> Result<(), ResonanceError> {
        let required = self.policy.required_precision(value);
        if self.precision < required {
            return Err(ResonanceError::PrecisionUnderflow {
                required: required.digits(),
                available: self.precision.digits(),
                bits: value.bits(),
            });
        }
        Ok(())
    }

    /// Fixed-point 1.0.
    pub fn one(&self) -> &BigUint {
        &self.one
    }

    /// frac(n * phi^i) as a fixed-point value in [0, 1).
    ///
    /// Uses phi^i = F_i * phi + F_{i-1}; the second term is an integer
    /// multiple of n and drops out of the fractional part, so the only
    /// rounding is the single truncation of phi.
    pub fn golden_rotation(&self, n: &BigUint, i: u32) -> BigUint {
        let fib = fibonacci(i);
        (n * fib * &self.phi) % &self.one
    }

    /// x^k re-wrapped into [0, 1), for x in [0, 1) and k > 0.
    pub fn pow_unit(&self, x: &BigUint, k: &BigUint) -> BigUint {
        if x.is_zero() {
            return BigUint::zero();
        }
        let y = (self.neg_ln(x) * k) >> self.frac_bits;
        self.exp_neg(&y) % &self.one
    }

    /// -ln(x) for x in (0, 1), returned as a non-negative fixed-point value.
    pub fn neg_ln(&self, x: &BigUint) -> BigUint {
        debug_assert!(!x.is_zero() && x < &self.one);
        let shift = self.frac_bits - x.bits();
        let mut m = x << shift;
        let mut e = shift;
        // Normalise m into [1/sqrt 2, sqrt 2) so the atanh argument stays small.
        if m < self.sqrt_half {
            m <<= 1u32;
            e += 1;
        }
        let scaled_ln2 = &self.ln2 * e;
        if m >= self.one {
            let z = ((&m - &self.one) << self.frac_bits) / (&m + &self.one);
            let ln_m = atanh_series(&z, self.frac_bits) << 1u32;
            scaled_ln2 - ln_m
        } else {
            let z = ((&self.one - &m) << self.frac_bits) / (&m + &self.one);
            let ln_m = atanh_series(&z, self.frac_bits) << 1u32;
            scaled_ln2 + ln_m
        }
    }

    /// e^(-y) for y >= 0.
    pub fn exp_neg(&self, y: &BigUint) -> BigUint {
        let b = self.frac_bits;
        let (q, r) = y.div_rem(&self.ln2);
        let q = match q.to_u64() {
            Some(q) if q < b => q,
            _ => return BigUint::zero(),
        };
        let r = r >> EXP_HALVINGS;

        // Alternating series; positive and negative terms kept apart.
        let mut positive = self.one.clone();
        let mut negative = BigUint::zero();
        let mut term = self.one.clone();
        let mut j = 1u32;
        loop {
            term = ((&term * &r) >> b) / j;
            if term.is_zero() {
                break;
            }
            if j % 2 == 1 {
                negative += &term;
            } else {
                positive += &term;
            }
            j += 1;
        }
        let mut value = if positive > negative {
            positive - negative
        } else {
            BigUint::zero()
        };
        for _ in 0..EXP_HALVINGS {
            value = (&value * &value) >> b;
        }
        value >> q
    }

    /// Exact signed fixed-point image of a finite f64.
    pub fn fixed_from_f64(&self, v: f64) -> BigInt {
        let (mantissa, exponent, sign) = Float::integer_decode(v);
        let shift = exponent as i64 + self.frac_bits as i64;
        let magnitude = if shift >= 0 {
            BigUint::from(mantissa) << shift as u64
        } else {
            BigUint::from(mantissa) >> shift.unsigned_abs()
        };
        let sign = if sign < 0 { Sign::Minus } else { Sign::Plus };
        BigInt::from_biguint(sign, magnitude)
    }

    /// Reduce a signed fixed-point value into [0, 1).
    pub fn wrap(&self, v: &BigInt) -> BigUint {
        let modulus = BigInt::from(self.one.clone());
        let (_, magnitude) = v.mod_floor(&modulus).into_parts();
        magnitude
    }

    /// Nearest f64 to a fixed-point value in [0, 1). A value that rounds up
    /// to 1.0 is the same torus point as 0.0 and is returned as 0.0.
    pub fn to_unit_f64(&self, x: &BigUint) -> f64 {
        let top = x >> (self.frac_bits - 64);
        let v = top.to_u64().map_or(0.0, |t| t as f64 / 2f64.powi(64));
        if v >= 1.0 {
            0.0
        } else {
            v
        }
    }
}

/// atanh(z) = z + z^3/3 + z^5/5 + ... for a fixed-point z in [0, 1).
fn atanh_series(z: &BigUint, frac_bits: u64) -> BigUint {
    let z2 = (z * z) >> frac_bits;
    let mut power = z.clone();
    let mut sum = z.clone();
    let mut j = 1u32;
    loop {
        power = (&power * &z2) >> frac_bits;
        if power.is_zero() {
            break;
        }
        sum += &power / (2 * j + 1);
        j += 1;
    }
    sum
}

/// F_i with F_0 = 0, F_1 = 1.
fn fibonacci(i: u32) -> BigUint {
    let mut a = BigUint::zero();
    let mut b = BigUint::one();
    for _ in 0..i {
        let next = &a + &b;
        a = std::mem::replace(&mut b, next);
    }
    a
}
