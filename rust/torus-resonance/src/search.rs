//! Resonance search: sweep the parameter grid, rank sampled candidates by
//! torus distance to N and test every one of them for exact division.
//!
//! Distance is diagnostic only. Every candidate the sampler yields receives
//! the direct `N mod v` check regardless of its score, and the first exact
//! divisor ends the whole run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::Zero;
use rayon::prelude::*;

use crate::config::SearchConfig;
use crate::distance::periodic_distance;
use crate::domain::{DomainPolicy, OperationalDomain};
use crate::embedding::{EmbeddingParameters, EmbeddingPoint, ToroidalEmbedder};
use crate::error::ResonanceError;
use crate::precision::PrecisionContext;
use crate::sampler::{AdmissibilityFilter, Candidate, CandidateSampler};

/// Primes excluded by the sampler's wheel; tested exactly before sampling.
const WHEEL_PRIMES: [u32; 3] = [2, 3, 5];

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// Index into the grid's combination list.
    pub combination: usize,
    pub offset: i64,
    pub value: BigUint,
    pub distance: f64,
    /// `N mod value == 0`.
    pub divides: bool,
}

/// A verified split N = p * q with p <= q.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorPair {
    pub p: BigUint,
    pub q: BigUint,
    /// Combination that sampled the divisor; `None` for the wheel pre-check.
    pub parameters: Option<EmbeddingParameters>,
    /// Distance of the divisor to N, when it was found by sampling.
    pub distance: Option<f64>,
    pub candidates_tested: u64,
    pub elapsed: Duration,
}

impl FactorPair {
    fn new(n: &BigUint, divisor: BigUint) -> Self {
        let cofactor = n / &divisor;
        let (p, q) = if divisor <= cofactor {
            (divisor, cofactor)
        } else {
            (cofactor, divisor)
        };
        Self {
            p,
            q,
            parameters: None,
            distance: None,
            candidates_tested: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Why a run ended without a divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CandidateBudget,
    Timeout,
    /// Every sampled candidate of every combination was evaluated.
    Exhausted,
}

/// Per-combination diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinationSummary {
    pub parameters: EmbeddingParameters,
    pub min_distance: Option<f64>,
    pub candidates_tested: u64,
}

impl CombinationSummary {
    fn new(parameters: EmbeddingParameters) -> Self {
        Self {
            parameters,
            min_distance: None,
            candidates_tested: 0,
        }
    }

    fn record(&mut self, distance: f64) {
        self.candidates_tested += 1;
        if self.min_distance.map_or(true, |d| distance < d) {
            self.min_distance = Some(distance);
        }
    }
}

/// Diagnostic report of a run that found no divisor.
#[derive(Debug, Clone, PartialEq)]
pub struct NoFactorReport {
    /// Smallest distance observed over the whole run.
    pub min_distance: Option<f64>,
    /// Combination that produced `min_distance`.
    pub best_parameters: Option<EmbeddingParameters>,
    pub candidates_tested: u64,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
    /// One entry per combination that was started, in grid order.
    pub combinations: Vec<CombinationSummary>,
}

/// Terminal artifact of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Factor(FactorPair),
    NoFactor(NoFactorReport),
}

impl SearchOutcome {
    pub fn factors(&self) -> Option<(&BigUint, &BigUint)> {
        match self {
            SearchOutcome::Factor(pair) => Some((&pair.p, &pair.q)),
            SearchOutcome::NoFactor(_) => None,
        }
    }

    pub fn candidates_tested(&self) -> u64 {
        match self {
            SearchOutcome::Factor(pair) => pair.candidates_tested,
            SearchOutcome::NoFactor(report) => report.candidates_tested,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            SearchOutcome::Factor(pair) => pair.elapsed,
            SearchOutcome::NoFactor(report) => report.elapsed,
        }
    }
}

/// Why `admit` refused a candidate.
enum Halt {
    Stop(StopReason),
    /// Another worker already found a divisor.
    Cancelled,
}

/// Result of sweeping one combination.
enum Sweep {
    Completed,
    Halted(Halt),
    Found(ScoredCandidate),
}

/// Everything prepared once per run after validation.
struct Prepared {
    ctx: PrecisionContext,
    anchor: BigUint,
    sampler: CandidateSampler,
    combinations: Vec<EmbeddingParameters>,
    timeout: Duration,
}

/// Resonance search engine.
pub struct ResonanceSearch {
    config: SearchConfig,
    domain: Box<dyn DomainPolicy>,
    filter: Option<Box<dyn AdmissibilityFilter>>,
}

impl ResonanceSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            domain: Box::new(OperationalDomain::default()),
            filter: None,
        }
    }

    pub fn with_domain(mut self, domain: impl DomainPolicy + 'static) -> Self {
        self.domain = Box::new(domain);
        self
    }

    pub fn with_filter(mut self, filter: impl AdmissibilityFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run sequentially. `anchor` defaults to floor(sqrt N).
    pub fn run(
        &self,
        n: &BigUint,
        anchor: Option<&BigUint>,
    ) -> Result<SearchOutcome, ResonanceError> {
        self.run_observed(n, anchor, |_| {})
    }

    /// Run sequentially, handing every evaluated candidate to `observer` in
    /// visitation order.
    pub fn run_observed<F>(
        &self,
        n: &BigUint,
        anchor: Option<&BigUint>,
        mut observer: F,
    ) -> Result<SearchOutcome, ResonanceError>
    where
        F: FnMut(&ScoredCandidate),
    {
        let start = Instant::now();
        if let Some(pair) = self.precheck(n)? {
            return Ok(SearchOutcome::Factor(FactorPair {
                elapsed: start.elapsed(),
                ..pair
            }));
        }
        let prepared = self.prepare(n, anchor)?;
        let embedder = ToroidalEmbedder::new(self.config.strategy);
        let max_candidates = self.config.budget.max_candidates;

        let mut tested = 0u64;
        let mut summaries = Vec::with_capacity(prepared.combinations.len());
        let mut stop_reason = StopReason::Exhausted;

        for (index, params) in prepared.combinations.iter().enumerate() {
            if tested >= max_candidates {
                stop_reason = StopReason::CandidateBudget;
                break;
            }
            if start.elapsed() >= prepared.timeout {
                stop_reason = StopReason::Timeout;
                break;
            }

            let target = embedder.embed(n, params, &prepared.ctx)?;
            let mut summary = CombinationSummary::new(*params);
            let sweep = self.sweep(
                n,
                index,
                &target,
                &embedder,
                &prepared,
                &mut summary,
                |_: &Candidate| {
                    if tested >= max_candidates {
                        return Some(Halt::Stop(StopReason::CandidateBudget));
                    }
                    if start.elapsed() >= prepared.timeout {
                        return Some(Halt::Stop(StopReason::Timeout));
                    }
                    tested += 1;
                    None
                },
                &mut observer,
            )?;
            log::debug!(
                "combination {} (k={}, theta_r={:?}): {} candidates, min distance {:?}",
                index,
                params.k,
                params.theta_r,
                summary.candidates_tested,
                summary.min_distance
            );
            summaries.push(summary);

            match sweep {
                Sweep::Found(hit) => {
                    let elapsed = start.elapsed();
                    log::info!(
                        "divisor {} of N={} found at offset {} after {} candidates in {:.3}s",
                        hit.value,
                        n,
                        hit.offset,
                        tested,
                        elapsed.as_secs_f64()
                    );
                    return Ok(SearchOutcome::Factor(FactorPair {
                        parameters: Some(*params),
                        distance: Some(hit.distance),
                        candidates_tested: tested,
                        elapsed,
                        ..FactorPair::new(n, hit.value)
                    }));
                }
                Sweep::Halted(Halt::Stop(reason)) => {
                    stop_reason = reason;
                    break;
                }
                Sweep::Halted(Halt::Cancelled) | Sweep::Completed => {}
            }
        }

        Ok(SearchOutcome::NoFactor(finish(
            n,
            summaries,
            tested,
            start.elapsed(),
            stop_reason,
        )))
    }

    /// Sweep combinations on the rayon pool.
    ///
    /// Each worker clones its own precision context. The first divisor sets
    /// a shared flag that every worker polls before each candidate; the
    /// candidate budget is a shared counter. Which combination reports the
    /// divisor may vary between runs, the pair itself does not.
    pub fn run_parallel(
        &self,
        n: &BigUint,
        anchor: Option<&BigUint>,
    ) -> Result<SearchOutcome, ResonanceError> {
        let start = Instant::now();
        if let Some(pair) = self.precheck(n)? {
            return Ok(SearchOutcome::Factor(FactorPair {
                elapsed: start.elapsed(),
                ..pair
            }));
        }
        let prepared = self.prepare(n, anchor)?;
        let embedder = ToroidalEmbedder::new(self.config.strategy);
        let max_candidates = self.config.budget.max_candidates;

        let found = AtomicBool::new(false);
        let granted = AtomicU64::new(0);
        let hit: Mutex<Option<(usize, ScoredCandidate)>> = Mutex::new(None);
        let stop: Mutex<Option<StopReason>> = Mutex::new(None);

        let summaries: Vec<CombinationSummary> = prepared
            .combinations
            .par_iter()
            .enumerate()
            .map(|(index, params)| -> Result<CombinationSummary, ResonanceError> {
                let mut summary = CombinationSummary::new(*params);
                if found.load(Ordering::Relaxed) {
                    return Ok(summary);
                }
                let local = Prepared {
                    ctx: prepared.ctx.clone(),
                    anchor: prepared.anchor.clone(),
                    sampler: prepared.sampler.clone(),
                    combinations: Vec::new(),
                    timeout: prepared.timeout,
                };
                let target = embedder.embed(n, params, &local.ctx)?;
                let sweep = self.sweep(
                    n,
                    index,
                    &target,
                    &embedder,
                    &local,
                    &mut summary,
                    |_: &Candidate| {
                        if found.load(Ordering::Relaxed) {
                            return Some(Halt::Cancelled);
                        }
                        if start.elapsed() >= local.timeout {
                            return Some(Halt::Stop(StopReason::Timeout));
                        }
                        if granted.fetch_add(1, Ordering::Relaxed) >= max_candidates {
                            return Some(Halt::Stop(StopReason::CandidateBudget));
                        }
                        None
                    },
                    &mut |_: &ScoredCandidate| {},
                )?;
                match sweep {
                    Sweep::Found(candidate) => {
                        found.store(true, Ordering::Relaxed);
                        let mut guard = hit.lock().unwrap_or_else(|e| e.into_inner());
                        // Keep the lowest combination index for a stable report.
                        if guard.as_ref().map_or(true, |(i, _)| index < *i) {
                            *guard = Some((index, candidate));
                        }
                    }
                    Sweep::Halted(Halt::Stop(reason)) => {
                        let mut guard = stop.lock().unwrap_or_else(|e| e.into_inner());
                        guard.get_or_insert(reason);
                    }
                    _ => {}
                }
                Ok(summary)
            })
            .collect::<Result<Vec<_>, ResonanceError>>()?;

        let tested = granted.load(Ordering::Relaxed).min(max_candidates);
        let elapsed = start.elapsed();
        let hit = hit.into_inner().unwrap_or_else(|e| e.into_inner());
        if let Some((index, candidate)) = hit {
            log::info!(
                "divisor {} of N={} found in parallel sweep after {} candidates",
                candidate.value,
                n,
                tested
            );
            return Ok(SearchOutcome::Factor(FactorPair {
                parameters: Some(prepared.combinations[index]),
                distance: Some(candidate.distance),
                candidates_tested: tested,
                elapsed,
                ..FactorPair::new(n, candidate.value)
            }));
        }
        let stop_reason = stop
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(StopReason::Exhausted);
        Ok(SearchOutcome::NoFactor(finish(
            n,
            summaries,
            tested,
            elapsed,
            stop_reason,
        )))
    }

    /// Config, domain and input validation, then the exact wheel-prime
    /// check. Runs before any precision context exists.
    fn precheck(&self, n: &BigUint) -> Result<Option<FactorPair>, ResonanceError> {
        self.config.validate()?;
        if !self.config.domain_override && !self.domain.admits(n) {
            return Err(ResonanceError::Domain {
                n: n.clone(),
                bits: n.bits(),
            });
        }
        if *n < BigUint::from(4u32) {
            return Err(ResonanceError::InvalidParameters(format!(
                "N={} is too small to have a nontrivial factor",
                n
            )));
        }
        for p in WHEEL_PRIMES {
            if n.is_multiple_of(&BigUint::from(p)) {
                log::info!("N={} is divisible by wheel prime {}", n, p);
                return Ok(Some(FactorPair::new(n, BigUint::from(p))));
            }
        }
        Ok(None)
    }

    fn prepare(&self, n: &BigUint, anchor: Option<&BigUint>) -> Result<Prepared, ResonanceError> {
        let ctx = PrecisionContext::for_modulus(self.config.precision, n);
        ctx.ensure_covers(n)?;
        let anchor = anchor.cloned().unwrap_or_else(|| n.sqrt());
        let window = self.config.window_for(n)?;
        let sampler = CandidateSampler::new(&self.config.sampler.tiers, window);
        let combinations = self.config.grid.combinations();
        log::info!(
            "resonance search: N={} ({} bits), precision {}, anchor {}, window ±{} (outer stride {}), {} combinations",
            n,
            n.bits(),
            ctx.precision(),
            anchor,
            window.radius,
            window.outer_stride,
            combinations.len()
        );
        Ok(Prepared {
            ctx,
            anchor,
            sampler,
            combinations,
            timeout: self.config.budget.timeout()?,
        })
    }

    /// Evaluate one combination's candidates. `admit` is asked before each
    /// candidate and may stop the sweep.
    #[allow(clippy::too_many_arguments)]
    fn sweep<A, O>(
        &self,
        n: &BigUint,
        index: usize,
        target: &EmbeddingPoint,
        embedder: &ToroidalEmbedder,
        prepared: &Prepared,
        summary: &mut CombinationSummary,
        mut admit: A,
        observer: &mut O,
    ) -> Result<Sweep, ResonanceError>
    where
        A: FnMut(&Candidate) -> Option<Halt>,
        O: FnMut(&ScoredCandidate) + ?Sized,
    {
        let params = summary.parameters;
        let candidates = prepared
            .sampler
            .generate(&prepared.anchor, n, self.filter.as_deref());
        for candidate in candidates {
            if let Some(halt) = admit(&candidate) {
                return Ok(Sweep::Halted(halt));
            }
            let point = embedder.embed(&candidate.value, &params, &prepared.ctx)?;
            let distance = periodic_distance(target, &point)?;
            summary.record(distance);
            let divides = (n % &candidate.value).is_zero();
            let scored = ScoredCandidate {
                combination: index,
                offset: candidate.offset,
                value: candidate.value,
                distance,
                divides,
            };
            observer(&scored);
            if divides {
                return Ok(Sweep::Found(scored));
            }
        }
        Ok(Sweep::Completed)
    }
}

fn finish(
    n: &BigUint,
    summaries: Vec<CombinationSummary>,
    tested: u64,
    elapsed: Duration,
    stop_reason: StopReason,
) -> NoFactorReport {
    let best = summaries
        .iter()
        .filter_map(|s| s.min_distance.map(|d| (d, s.parameters)))
        .fold(None, |best: Option<(f64, EmbeddingParameters)>, (d, p)| match best {
            Some((bd, _)) if bd <= d => best,
            _ => Some((d, p)),
        });
    match stop_reason {
        StopReason::Exhausted => log::info!(
            "no divisor of N={} among {} candidates ({:.3}s)",
            n,
            tested,
            elapsed.as_secs_f64()
        ),
        reason => log::warn!(
            "search for N={} stopped by {:?} after {} candidates ({:.3}s)",
            n,
            reason,
            tested,
            elapsed.as_secs_f64()
        ),
    }
    NoFactorReport {
        min_distance: best.map(|(d, _)| d),
        best_parameters: best.map(|(_, p)| p),
        candidates_tested: tested,
        elapsed,
        stop_reason,
        combinations: summaries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParameterGrid, SearchBudget};

    fn config(k_values: Vec<f64>, max_candidates: u64) -> SearchConfig {
        SearchConfig {
            grid: ParameterGrid {
                dimension: 7,
                k_values,
                theta_values: Vec::new(),
            },
            budget: SearchBudget {
                max_candidates,
                max_seconds: 600.0,
            },
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_even_n_short_circuits() {
        // 21 bits: below the default domain, so the override is needed.
        let n = BigUint::from(2u64 * 1_000_003);
        let mut cfg = config(vec![0.35], 100);
        cfg.domain_override = true;
        let search = ResonanceSearch::new(cfg);
        let mut seen = 0;
        let outcome = search.run_observed(&n, None, |_| seen += 1).unwrap();
        assert_eq!(seen, 0);
        let (p, q) = outcome.factors().unwrap();
        assert_eq!(*p, BigUint::from(2u32));
        assert_eq!(*q, BigUint::from(1_000_003u32));
        assert_eq!(outcome.candidates_tested(), 0);
    }

    #[test]
    fn test_too_small_n_rejected() {
        let mut cfg = config(vec![0.35], 100);
        cfg.domain_override = true;
        let search = ResonanceSearch::new(cfg);
        assert!(matches!(
            search.run(&BigUint::from(3u32), None),
            Err(ResonanceError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_tiny_n_outside_domain_is_a_domain_error() {
        let search = ResonanceSearch::new(config(vec![0.35], 100));
        for v in [0u32, 1, 3] {
            assert!(
                matches!(
                    search.run(&BigUint::from(v), None),
                    Err(ResonanceError::Domain { .. })
                ),
                "N={}",
                v
            );
        }
    }

    #[test]
    fn test_domain_checked_before_wheel() {
        // 2^200 is even but out of the default domain.
        let n = BigUint::from(1u32) << 200u32;
        let search = ResonanceSearch::new(config(vec![0.35], 100));
        assert!(matches!(
            search.run(&n, None),
            Err(ResonanceError::Domain { bits: 201, .. })
        ));
    }

    #[test]
    fn test_factor_pair_ordering() {
        let n = BigUint::from(35u32);
        let pair = FactorPair::new(&n, BigUint::from(7u32));
        assert_eq!(pair.p, BigUint::from(5u32));
        assert_eq!(pair.q, BigUint::from(7u32));
    }

    #[test]
    fn test_summary_tracks_minimum() {
        let params = EmbeddingParameters {
            dimension: 7,
            k: 0.35,
            theta_r: None,
        };
        let mut summary = CombinationSummary::new(params);
        for d in [0.9, 0.4, 0.6] {
            summary.record(d);
        }
        assert_eq!(summary.min_distance, Some(0.4));
        assert_eq!(summary.candidates_tested, 3);
    }

    #[test]
    fn test_finish_picks_global_minimum() {
        let p = |k| EmbeddingParameters {
            dimension: 7,
            k,
            theta_r: None,
        };
        let summaries = vec![
            CombinationSummary {
                parameters: p(0.3),
                min_distance: Some(0.5),
                candidates_tested: 4,
            },
            CombinationSummary {
                parameters: p(0.4),
                min_distance: Some(0.2),
                candidates_tested: 4,
            },
            CombinationSummary {
                parameters: p(0.5),
                min_distance: Some(0.2),
                candidates_tested: 4,
            },
        ];
        let report = finish(
            &BigUint::from(77u32),
            summaries,
            12,
            Duration::ZERO,
            StopReason::Exhausted,
        );
        assert_eq!(report.min_distance, Some(0.2));
        assert_eq!(report.best_parameters.map(|p| p.k), Some(0.4));
    }

    #[test]
    fn test_every_candidate_is_divisibility_tested() {
        // Distance never gates the exact check: every observed candidate
        // before the hit is a non-divisor, the hit is a divisor.
        let n = BigUint::from(1_073_217_479u64);
        let search = ResonanceSearch::new(config(vec![0.35], 10_000));
        let mut records = Vec::new();
        let outcome = search
            .run_observed(&n, None, |c| records.push(c.clone()))
            .unwrap();
        assert!(outcome.factors().is_some());
        let (last, rest) = records.split_last().unwrap();
        assert!(last.divides);
        assert!(rest.iter().all(|c| !c.divides));
        assert_eq!(records.len() as u64, outcome.candidates_tested());
    }
}
