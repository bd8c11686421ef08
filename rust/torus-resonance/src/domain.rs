//! Operational-domain gate applied once at the start of a run.

use std::collections::BTreeSet;

use num_bigint::BigUint;

/// Decides which N a run accepts without an explicit override.
pub trait DomainPolicy: Send + Sync {
    fn is_in_operational_domain(&self, n: &BigUint) -> bool;

    /// Individually approved N outside the operational range.
    fn is_whitelisted(&self, _n: &BigUint) -> bool {
        false
    }

    fn admits(&self, n: &BigUint) -> bool {
        self.is_in_operational_domain(n) || self.is_whitelisted(n)
    }
}

/// Bit-length range plus an explicit whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationalDomain {
    pub min_bits: u64,
    pub max_bits: u64,
    pub whitelist: BTreeSet<BigUint>,
}

impl Default for OperationalDomain {
    fn default() -> Self {
        Self {
            min_bits: 24,
            max_bits: 128,
            whitelist: BTreeSet::new(),
        }
    }
}

impl OperationalDomain {
    pub fn with_whitelist<I: IntoIterator<Item = BigUint>>(mut self, values: I) -> Self {
        self.whitelist.extend(values);
        self
    }
}

impl DomainPolicy for OperationalDomain {
    fn is_in_operational_domain(&self, n: &BigUint) -> bool {
        let bits = n.bits();
        bits >= self.min_bits && bits <= self.max_bits
    }

    fn is_whitelisted(&self, n: &BigUint) -> bool {
        self.whitelist.contains(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    #[test]
    fn test_default_range() {
        let domain = OperationalDomain::default();
        assert!(domain.admits(&BigUint::from(1_073_217_479u64)));
        assert!(domain.admits(&BigUint::from(1_152_921_470_247_108_503u64)));
        assert!(!domain.admits(&BigUint::from(15u32)));
        assert!(!domain.admits(&(BigUint::one() << 200u32)));
    }

    #[test]
    fn test_whitelist_overrides_range() {
        let big = (BigUint::one() << 200u32) + 1u32;
        let domain = OperationalDomain::default().with_whitelist([big.clone()]);
        assert!(!domain.is_in_operational_domain(&big));
        assert!(domain.is_whitelisted(&big));
        assert!(domain.admits(&big));
        assert!(!domain.admits(&(big + 2u32)));
    }
}
