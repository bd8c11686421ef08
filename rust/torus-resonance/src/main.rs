//! torus-resonance CLI: resonance search for the factors of one semiprime.
//!
//! Usage:
//!   torus-resonance --n=1073217479
//!   torus-resonance --n=1152921470247108503 --k=0.30,0.35,0.40 --max-candidates=50000
//!   torus-resonance --n=15 --domain-override --window=16
//!
//! Options:
//!   --n=<N>                   Number to factor (required)
//!   --config=<file>           Load a JSON SearchConfig; flags below override it
//!   --dimension=<D>           Torus dimension (default: 7)
//!   --k=a,b,c                 Geodesic exponents to sweep (default: 0.35)
//!   --theta=a,b               Imbalance parameters to sweep (default: none)
//!   --strategy=<name>         rotation | sheared | imbalance-axis
//!   --max-candidates=<N>      Candidate budget across all combinations
//!   --timeout-secs=<S>        Wall-clock limit in seconds
//!   --anchor=<A>              Sampling anchor (default: floor(sqrt N))
//!   --window=<W>              Sampling radius around the anchor
//!   --domain-override         Skip the operational-domain check
//!   --whitelist=a,b           Extra N accepted outside the domain
//!   --parallel                Sweep combinations on the rayon pool
//!   --json                    Print the outcome as JSON

use std::str::FromStr;

use num_bigint::BigUint;
use serde::Serialize;

use torus_resonance::{
    EmbeddingParameters, EmbeddingStrategy, OperationalDomain, ResonanceError, ResonanceSearch,
    SearchConfig, SearchOutcome,
};

/// CLI configuration parsed from command-line arguments.
struct CliConfig {
    n: BigUint,
    config: SearchConfig,
    anchor: Option<BigUint>,
    whitelist: Vec<BigUint>,
    parallel: bool,
    json: bool,
}

#[derive(Serialize)]
struct ParametersReport {
    dimension: usize,
    k: f64,
    theta_r: Option<f64>,
}

impl From<EmbeddingParameters> for ParametersReport {
    fn from(p: EmbeddingParameters) -> Self {
        Self {
            dimension: p.dimension,
            k: p.k,
            theta_r: p.theta_r,
        }
    }
}

/// JSON view of an outcome. Big integers are written as decimal strings.
#[derive(Serialize)]
struct OutcomeReport {
    n: String,
    bits: u64,
    factor_found: bool,
    p: Option<String>,
    q: Option<String>,
    parameters: Option<ParametersReport>,
    distance: Option<f64>,
    min_distance: Option<f64>,
    stop_reason: Option<String>,
    candidates_tested: u64,
    combinations: usize,
    time_ms: f64,
}

impl OutcomeReport {
    fn new(n: &BigUint, outcome: &SearchOutcome) -> Self {
        let time_ms = outcome.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            SearchOutcome::Factor(pair) => Self {
                n: n.to_string(),
                bits: n.bits(),
                factor_found: true,
                p: Some(pair.p.to_string()),
                q: Some(pair.q.to_string()),
                parameters: pair.parameters.map(ParametersReport::from),
                distance: pair.distance,
                min_distance: None,
                stop_reason: None,
                candidates_tested: pair.candidates_tested,
                combinations: 0,
                time_ms,
            },
            SearchOutcome::NoFactor(report) => Self {
                n: n.to_string(),
                bits: n.bits(),
                factor_found: false,
                p: None,
                q: None,
                parameters: report.best_parameters.map(ParametersReport::from),
                distance: None,
                min_distance: report.min_distance,
                stop_reason: Some(format!("{:?}", report.stop_reason)),
                candidates_tested: report.candidates_tested,
                combinations: report.combinations.len(),
                time_ms,
            },
        }
    }
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter().find_map(|a| a.strip_prefix(name))
}

fn parse_value<T: FromStr>(args: &[String], name: &str) -> Result<Option<T>, ResonanceError> {
    flag(args, name)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| ResonanceError::Config(format!("cannot parse {}{}", name, v)))
        })
        .transpose()
}

fn parse_list<T: FromStr>(args: &[String], name: &str) -> Result<Option<Vec<T>>, ResonanceError> {
    flag(args, name)
        .map(|v| {
            v.split(',')
                .map(|s| {
                    s.trim()
                        .parse::<T>()
                        .map_err(|_| ResonanceError::Config(format!("cannot parse {} in {}", s, name)))
                })
                .collect()
        })
        .transpose()
}

fn parse_args() -> Result<CliConfig, ResonanceError> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let n: BigUint = parse_value(&args, "--n=")?
        .ok_or_else(|| ResonanceError::Config("--n=<N> is required".into()))?;

    let mut config = match flag(&args, "--config=") {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::default(),
    };

    if let Some(dimension) = parse_value(&args, "--dimension=")? {
        config.grid.dimension = dimension;
    }
    if let Some(k_values) = parse_list(&args, "--k=")? {
        config.grid.k_values = k_values;
    }
    if let Some(theta_values) = parse_list(&args, "--theta=")? {
        config.grid.theta_values = theta_values;
    }
    if let Some(name) = flag(&args, "--strategy=") {
        config.strategy = EmbeddingStrategy::parse(name)
            .ok_or_else(|| ResonanceError::Config(format!("unknown strategy {}", name)))?;
    }
    if let Some(max_candidates) = parse_value(&args, "--max-candidates=")? {
        config.budget.max_candidates = max_candidates;
    }
    if let Some(seconds) = parse_value(&args, "--timeout-secs=")? {
        config.budget.max_seconds = seconds;
    }
    if let Some(window) = parse_value(&args, "--window=")? {
        config.window = Some(window);
    }
    if args.iter().any(|a| a == "--domain-override") {
        config.domain_override = true;
    }

    Ok(CliConfig {
        n,
        config,
        anchor: parse_value(&args, "--anchor=")?,
        whitelist: parse_list(&args, "--whitelist=")?.unwrap_or_default(),
        parallel: args.iter().any(|a| a == "--parallel"),
        json: args.iter().any(|a| a == "--json"),
    })
}

fn print_summary(n: &BigUint, outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::Factor(pair) => {
            println!("  {} = {} x {}", n, pair.p, pair.q);
            match pair.parameters {
                Some(params) => println!(
                    "  found by k={}, theta_r={:?} at distance {:.6}",
                    params.k,
                    params.theta_r,
                    pair.distance.unwrap_or_default()
                ),
                None => println!("  found by the wheel pre-check"),
            }
        }
        SearchOutcome::NoFactor(report) => {
            println!("  no factor found ({:?})", report.stop_reason);
            if let (Some(d), Some(params)) = (report.min_distance, report.best_parameters) {
                println!(
                    "  closest approach {:.6} at k={}, theta_r={:?}",
                    d, params.k, params.theta_r
                );
            }
            for (i, summary) in report.combinations.iter().enumerate() {
                println!(
                    "    [{}] k={:<6} theta_r={:<10} tested={:<8} min={:?}",
                    i,
                    summary.parameters.k,
                    format!("{:?}", summary.parameters.theta_r),
                    summary.candidates_tested,
                    summary.min_distance
                );
            }
        }
    }
    println!(
        "  candidates tested: {}, time: {:.3}s",
        outcome.candidates_tested(),
        outcome.elapsed().as_secs_f64()
    );
}

fn run(cli: CliConfig) -> Result<(), ResonanceError> {
    let domain = OperationalDomain::default().with_whitelist(cli.whitelist);
    let search = ResonanceSearch::new(cli.config).with_domain(domain);

    if !cli.json {
        println!("=== torus-resonance ===");
        println!("N = {} ({} bits)", cli.n, cli.n.bits());
        println!(
            "strategy {:?}, D={}, k={:?}, theta={:?}, budget {} candidates / {}s{}",
            search.config().strategy,
            search.config().grid.dimension,
            search.config().grid.k_values,
            search.config().grid.theta_values,
            search.config().budget.max_candidates,
            search.config().budget.max_seconds,
            if cli.parallel { ", parallel" } else { "" }
        );
        println!();
    }

    let outcome = if cli.parallel {
        search.run_parallel(&cli.n, cli.anchor.as_ref())?
    } else {
        search.run(&cli.n, cli.anchor.as_ref())?
    };

    if cli.json {
        let report = OutcomeReport::new(&cli.n, &outcome);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&cli.n, &outcome);
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Usage: torus-resonance --n=<N> [--k=a,b] [--max-candidates=N] [--json]");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
