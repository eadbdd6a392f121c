//! CLI surface and resolved run configuration (spec §6).
//!
//! `RawArgs` is the `clap`-derived argv shape; [`RunConfig::from_args`]
//! resolves and validates it into the typed configuration the rest of
//! the crate consumes, rejecting anything invalid as `BadConfig` at
//! parse time rather than later (spec §9 "Dynamic strategy selection").

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::bet::BetConfig;
use crate::error::{OptError, Result};
use crate::optimizer::sa::{CoolingSchedule, NeighborStrategy};

const FIAT_CURVES: &[&str] = &["curve25519", "p256", "secp256k1"];
const FIAT_METHODS: &[&str] = &["square", "mul", "add", "sub"];
const BITCOIN_CORE_METHODS: &[&str] = &["square", "mul"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Bridge {
    Fiat,
    Manual,
    #[value(name = "bitcoin-core")]
    BitcoinCore,
    Jasmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptimizerKind {
    Rls,
    Sa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FramePointer {
    Omit,
    Save,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MemoryConstraints {
    None,
    All,
    #[value(name = "out1-arg1")]
    Out1Arg1,
}

/// Parses a CLI path argument, allowing the empty string (used as the
/// "not provided" sentinel for `json_file`/`c_file` defaults) since clap's
/// built-in `PathBuf` value parser rejects empty values outright.
fn parse_path_allow_empty(s: &str) -> std::result::Result<PathBuf, std::convert::Infallible> {
    Ok(PathBuf::from(s))
}

/// Raw command-line surface, one field per spec §6 option.
#[derive(Debug, Parser)]
#[command(name = "cryptopt", about = "Stochastic local-search optimizer for field-arithmetic assembly")]
pub struct RawArgs {
    #[arg(long, default_value = "curve25519")]
    pub curve: String,

    #[arg(long, default_value = "square")]
    pub method: String,

    #[arg(long, value_enum, default_value = "fiat")]
    pub bridge: Bridge,

    #[arg(long, default_value = "", value_parser = parse_path_allow_empty)]
    pub json_file: PathBuf,

    #[arg(long, default_value = "", value_parser = parse_path_allow_empty)]
    pub c_file: PathBuf,

    #[arg(long, value_enum, default_value = "rls")]
    pub optimizer: OptimizerKind,

    /// Master seed; defaults to the current millisecond clock if absent.
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value = "10k")]
    pub evals: String,

    #[arg(long, default_value_t = 10)]
    pub bets: u32,

    #[arg(long, default_value_t = 0.2)]
    pub bet_ratio: f64,

    #[arg(long, default_value_t = false)]
    pub single: bool,

    #[arg(long, default_value_t = 10_000)]
    pub cyclegoal: u32,

    #[arg(long, default_value_t = false)]
    pub xmm: bool,

    #[arg(long, default_value_t = false)]
    pub prefer_xmm: bool,

    #[arg(long, default_value_t = true)]
    pub redzone: bool,

    #[arg(long, value_enum, default_value = "omit")]
    pub frame_pointer: FramePointer,

    #[arg(long, value_enum, default_value = "none")]
    pub memory_constraints: MemoryConstraints,

    #[arg(long, default_value_t = true)]
    pub proof: bool,

    #[arg(long)]
    pub result_dir: Option<PathBuf>,

    #[arg(long)]
    pub read_state: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub start_from_best_json: bool,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long, default_value = "")]
    pub log_comment: String,

    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    #[arg(long, default_value_t = 18_351.0)]
    pub sa_initial_temperature: f64,

    #[arg(long, default_value_t = 1.62)]
    pub sa_visit_param: f64,

    #[arg(long, default_value_t = 1.0 / 5.515)]
    pub sa_accept_param: f64,

    #[arg(long, value_enum, default_value = "greedy")]
    pub sa_neighbor_strategy: SaNeighborStrategyArg,

    #[arg(long, default_value_t = 1)]
    pub sa_num_neighbors: u32,

    #[arg(long, default_value_t = 0.005)]
    pub sa_step_size_param: f64,

    #[arg(long, allow_hyphen_values = true, default_value_t = -1)]
    pub sa_max_mut_step_size: i64,

    #[arg(long, value_enum, default_value = "exp")]
    pub sa_cooling_schedule: SaCoolingScheduleArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SaNeighborStrategyArg {
    Uniform,
    Greedy,
    Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SaCoolingScheduleArg {
    Exp,
    Lin,
    Log,
}

/// Parses a human evaluation-budget string such as `10k`, `0.4M`, `4e9`
/// into an evaluation count (spec §6 `evals`).
pub fn parse_eval_budget(raw: &str) -> Result<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OptError::BadConfig("evals must not be empty".into()));
    }
    let (number_part, multiplier) = match trimmed.chars().last() {
        Some('k') | Some('K') => (&trimmed[..trimmed.len() - 1], 1_000.0),
        Some('M') => (&trimmed[..trimmed.len() - 1], 1_000_000.0),
        Some('T') => (&trimmed[..trimmed.len() - 1], 1_000_000_000_000.0),
        _ => (trimmed, 1.0),
    };
    let base: f64 = number_part
        .parse()
        .map_err(|_| OptError::BadConfig(format!("malformed evals value `{raw}`")))?;
    let evals = base * multiplier;
    if !evals.is_finite() || evals <= 0.0 {
        return Err(OptError::BadConfig(format!("evals must be positive, got `{raw}`")));
    }
    Ok(evals.round() as u64)
}

/// Fully resolved, validated run configuration (spec §9: reject unknown
/// strings as `BadConfig` at parse time, not later).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub curve: String,
    pub method: String,
    pub bridge: Bridge,
    pub json_file: PathBuf,
    pub c_file: PathBuf,
    pub optimizer: OptimizerKind,
    pub seed: u64,
    pub evals: u64,
    pub bet: BetConfig,
    pub cyclegoal: u32,
    pub xmm: bool,
    pub prefer_xmm: bool,
    pub redzone: bool,
    pub frame_pointer: FramePointer,
    pub memory_constraints: MemoryConstraints,
    pub proof: bool,
    pub result_dir: PathBuf,
    pub read_state: Option<PathBuf>,
    pub start_from_best_json: bool,
    pub log_file: Option<PathBuf>,
    pub log_comment: String,
    pub verbose: bool,
    pub sa_initial_temperature: f64,
    pub sa_visit_param: f64,
    pub sa_accept_param: f64,
    pub sa_neighbor_strategy: NeighborStrategy,
    pub sa_num_neighbors: u32,
    pub sa_step_size_param: f64,
    pub sa_max_mut_step_size: i64,
    pub sa_cooling_schedule: CoolingSchedule,
}

impl RunConfig {
    pub fn from_args(args: RawArgs, current_millis: u64) -> Result<Self> {
        let evals = parse_eval_budget(&args.evals)?;
        if evals == 0 {
            return Err(OptError::BadConfig("evals must be greater than zero".into()));
        }

        if args.bridge == Bridge::Manual {
            if args.json_file.as_os_str().is_empty() || args.c_file.as_os_str().is_empty() {
                return Err(OptError::BadConfig(
                    "bridge=manual requires both jsonFile and cFile".into(),
                ));
            }
            if !args.json_file.exists() {
                return Err(OptError::BadConfig(format!(
                    "jsonFile `{}` does not exist or is not readable",
                    args.json_file.display()
                )));
            }
            if !args.c_file.exists() {
                return Err(OptError::BadConfig(format!(
                    "cFile `{}` does not exist or is not readable",
                    args.c_file.display()
                )));
            }
        }
        if args.bridge == Bridge::Fiat {
            if !FIAT_METHODS.contains(&args.method.as_str()) {
                return Err(OptError::BadConfig(format!("unknown fiat method `{}`", args.method)));
            }
            if !FIAT_CURVES.contains(&args.curve.as_str()) {
                return Err(OptError::BadConfig(format!("unknown fiat curve `{}`", args.curve)));
            }
        }
        if args.bridge == Bridge::BitcoinCore && !BITCOIN_CORE_METHODS.contains(&args.method.as_str()) {
            return Err(OptError::BadConfig(format!("unknown bitcoin-core method `{}`", args.method)));
        }
        if !(0.0..=1.0).contains(&args.bet_ratio) {
            return Err(OptError::BadConfig("betRatio must lie in [0, 1]".into()));
        }
        if args.bets == 0 {
            return Err(OptError::BadConfig("bets must be at least 1".into()));
        }
        if args.sa_num_neighbors == 0 {
            return Err(OptError::BadConfig("saNumNeighbors must be at least 1".into()));
        }

        let seed = args.seed.unwrap_or(current_millis);
        let bet = BetConfig {
            evals,
            num_bets: if args.single { 1 } else { args.bets },
            bet_ratio: if args.single { 1.0 } else { args.bet_ratio },
            single: args.single,
        };
        bet.validate()?;

        let result_dir = args.result_dir.clone().unwrap_or_else(|| PathBuf::from(format!("./results-{seed}")));

        let sa_neighbor_strategy = match args.sa_neighbor_strategy {
            SaNeighborStrategyArg::Uniform => NeighborStrategy::Uniform,
            SaNeighborStrategyArg::Greedy => NeighborStrategy::Greedy,
            SaNeighborStrategyArg::Weighted => NeighborStrategy::Weighted,
        };
        let sa_cooling_schedule = match args.sa_cooling_schedule {
            SaCoolingScheduleArg::Exp => CoolingSchedule::Exp,
            SaCoolingScheduleArg::Lin => CoolingSchedule::Lin,
            SaCoolingScheduleArg::Log => CoolingSchedule::Log,
        };

        Ok(RunConfig {
            curve: args.curve,
            method: args.method,
            bridge: args.bridge,
            json_file: args.json_file,
            c_file: args.c_file,
            optimizer: args.optimizer,
            seed,
            evals,
            bet,
            cyclegoal: args.cyclegoal,
            xmm: args.xmm,
            prefer_xmm: args.prefer_xmm,
            redzone: args.redzone,
            frame_pointer: args.frame_pointer,
            memory_constraints: args.memory_constraints,
            proof: args.proof,
            result_dir,
            read_state: args.read_state,
            start_from_best_json: args.start_from_best_json,
            log_file: args.log_file,
            log_comment: args.log_comment,
            verbose: args.verbose,
            sa_initial_temperature: args.sa_initial_temperature,
            sa_visit_param: args.sa_visit_param,
            sa_accept_param: args.sa_accept_param,
            sa_neighbor_strategy,
            sa_num_neighbors: args.sa_num_neighbors,
            sa_step_size_param: args.sa_step_size_param,
            sa_max_mut_step_size: args.sa_max_mut_step_size,
            sa_cooling_schedule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixed_eval_budgets() {
        assert_eq!(parse_eval_budget("10k").unwrap(), 10_000);
        assert_eq!(parse_eval_budget("0.4M").unwrap(), 400_000);
        assert_eq!(parse_eval_budget("4e9").unwrap(), 4_000_000_000);
        assert_eq!(parse_eval_budget("250").unwrap(), 250);
    }

    #[test]
    fn rejects_malformed_or_nonpositive_eval_budgets() {
        assert!(parse_eval_budget("").is_err());
        assert!(parse_eval_budget("abc").is_err());
        assert!(parse_eval_budget("-5").is_err());
        assert!(parse_eval_budget("0").is_err());
    }

    fn base_args() -> RawArgs {
        RawArgs::parse_from(["cryptopt"])
    }

    #[test]
    fn defaults_resolve_into_a_valid_run_config() {
        let config = RunConfig::from_args(base_args(), 1234).unwrap();
        assert_eq!(config.seed, 1234);
        assert_eq!(config.evals, 10_000);
        assert_eq!(config.bet.num_bets, 10);
    }

    #[test]
    fn single_flag_forces_one_bet_and_full_ratio() {
        let mut args = base_args();
        args.single = true;
        let config = RunConfig::from_args(args, 1).unwrap();
        assert_eq!(config.bet.num_bets, 1);
        assert_eq!(config.bet.bet_ratio, 1.0);
    }

    #[test]
    fn manual_bridge_requires_json_and_c_files() {
        let mut args = base_args();
        args.bridge = Bridge::Manual;
        assert!(matches!(RunConfig::from_args(args, 1), Err(OptError::BadConfig(_))));
    }

    #[test]
    fn manual_bridge_rejects_a_nonexistent_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args();
        args.bridge = Bridge::Manual;
        args.json_file = dir.path().join("does_not_exist.json");
        args.c_file = dir.path().join("does_not_exist.c");
        std::fs::write(&args.c_file, "// stub").unwrap();
        assert!(matches!(RunConfig::from_args(args, 1), Err(OptError::BadConfig(_))));
    }

    #[test]
    fn unknown_fiat_method_is_bad_config() {
        let mut args = base_args();
        args.method = "frobnicate".into();
        assert!(matches!(RunConfig::from_args(args, 1), Err(OptError::BadConfig(_))));
    }

    #[test]
    fn explicit_seed_overrides_the_clock() {
        let mut args = base_args();
        args.seed = Some(99);
        let config = RunConfig::from_args(args, 555).unwrap();
        assert_eq!(config.seed, 99);
    }
}
