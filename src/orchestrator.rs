//! Run orchestrator (spec §4.7): ties every other component together
//! into one end-to-end run. Generic over the three external-interface
//! implementations (`Assembler`, `Measurer`, `Prover`) so tests can
//! inject deterministic stand-ins without touching this module.

use std::fs;
use std::path::{Path, PathBuf};

use crate::assemble::{check_no_undefined, Assembler};
use crate::bet::{run_bet, BetOutcome, StageOutcome};
use crate::bridge::Bridge;
use crate::config::{OptimizerKind, RunConfig};
use crate::error::{OptError, Result};
use crate::measure::Measurer;
use crate::model::Model;
use crate::optimizer::rls::{run_rls, RlsConfig};
use crate::optimizer::sa::{run_sa, SaConfig};
use crate::optimizer::MutationLog;
use crate::prover::Prover;
use crate::session::Session;

/// Everything a finished run reports back to the caller (and, for the
/// CLI binary, what gets logged before exit).
pub struct RunReport {
    pub asm_path: PathBuf,
    pub csv_path: PathBuf,
    pub final_ratio: f64,
    pub cache_dir: PathBuf,
    pub validated_in: Option<std::time::Duration>,
}

/// Creates `<tmpdir>/CryptOpt.cache/<hash>`, where `<hash>` is derived
/// from the run's seed via `Rng::short_hash` (spec §4.7 step (b), §5
/// "its name embeds a Rng-derived hash").
pub fn make_cache_dir(base_tmp_dir: &Path, hash: &str) -> Result<PathBuf> {
    let dir = base_tmp_dir.join("CryptOpt.cache").join(hash);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn symbol_for(config: &RunConfig) -> String {
    format!("{}_{}", config.curve, config.method)
}

fn nasm_header(symbol: &str) -> String {
    format!("SECTION .text\nGLOBAL {symbol}\n{symbol}:\n")
}

fn stats_footer(config: &RunConfig, outcome: &BetOutcome, validated_in: Option<std::time::Duration>) -> String {
    let mut footer = String::new();
    footer.push_str(&format!("\n; evals={}\n", config.evals));
    footer.push_str(&format!("; ratio={:.6}\n", outcome.final_ratio));
    if let Some(record) = &outcome.best.by_cycles {
        footer.push_str(&format!("; best-cycle-count={:.3} (epoch {})\n", record.cycle_count, record.epoch));
    }
    if let Some(last) = outcome.convergence.last() {
        footer.push_str(&format!("; convergence-last={last}\n"));
    }
    if let Some(duration) = validated_in {
        footer.push_str(&format!("; validated in {}ns\n", duration.as_nanos()));
    }
    footer
}

/// Maps a fatal `OptError` raised mid-search to the documented failure
/// artefacts (spec §6 "Persisted outputs: On failure"), writing whatever
/// this error kind requires before the caller surfaces the exit code.
fn persist_failure_artefacts(model: &Model, cache_dir: &Path, error: &OptError) -> Result<()> {
    match error {
        OptError::MeasureIncorrect { model_dump_path, .. } | OptError::MeasureInvalid { model_dump_path, .. } => {
            model.dump_json(model_dump_path)?;
        }
        OptError::MeasureGeneric { .. } | OptError::AssembleUndefined { .. } => {
            let path = cache_dir.join("generic_error_model.json");
            model.dump_json(&path)?;
        }
        _ => {}
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn run<A: Assembler, M: Measurer, P: Prover>(
    config: &RunConfig,
    bridge: &dyn Bridge,
    assembler: &A,
    measurer: &mut M,
    prover: Option<&P>,
    base_tmp_dir: &Path,
) -> Result<RunReport> {
    let model = bridge.baseline_model()?;
    let baseline_rendered = assembler.render(&model)?;
    check_no_undefined(&baseline_rendered.assembly, "<baseline>")?;

    let mutation_log_path = base_tmp_dir.join(format!("{}.csv", symbol_for(config)));
    let mutation_log = MutationLog::create(&mutation_log_path)?;
    let mut session = Session::new(config.seed, model, mutation_log);

    let cache_dir = make_cache_dir(base_tmp_dir, &session.rng.short_hash())?;

    let result = run_inner(config, assembler, measurer, &mut session, &cache_dir);

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(error) => {
            persist_failure_artefacts(&session.model, &cache_dir, &error)?;
            if !config.verbose {
                let _ = fs::remove_dir_all(&cache_dir);
            }
            return Err(error);
        }
    };

    fs::create_dir_all(&config.result_dir)?;
    let symbol = symbol_for(config);
    let asm_path = config.result_dir.join(format!("{symbol}_ratio{:.6}.asm", outcome.final_ratio));
    let csv_path = config.result_dir.join(format!("{symbol}.csv"));

    let mut validated_in = None;
    if config.proof {
        if let Some(prover) = prover {
            let baseline_path = cache_dir.join("baseline.asm");
            fs::write(&baseline_path, &baseline_rendered.assembly)?;
            let candidate_path = cache_dir.join("candidate.asm");
            fs::write(&candidate_path, &outcome.final_assembly)?;
            validated_in = Some(prover.prove(&baseline_path, &candidate_path)?);
        }
    }

    let mut asm_contents = nasm_header(&symbol);
    asm_contents.push_str(&outcome.final_assembly);
    asm_contents.push_str(&stats_footer(config, &outcome, validated_in));
    fs::write(&asm_path, asm_contents)?;
    fs::copy(&mutation_log_path, &csv_path)?;

    if !config.verbose {
        let _ = fs::remove_dir_all(&cache_dir);
    }

    Ok(RunReport { asm_path, csv_path, final_ratio: outcome.final_ratio, cache_dir, validated_in })
}

fn run_inner<A: Assembler, M: Measurer>(
    config: &RunConfig,
    assembler: &A,
    measurer: &mut M,
    session: &mut Session,
    cache_dir: &Path,
) -> Result<BetOutcome> {
    let _ = cache_dir;
    let optimizer_kind = config.optimizer;
    let config = config.clone();

    run_bet(
        &mut session.model,
        &mut session.rng,
        &session_bet_config(&config),
        &mut session.stats.mutation_log,
        |model, rng, evals, mutation_log| {
            run_stage(optimizer_kind, &config, model, rng, assembler, &mut *measurer, evals, mutation_log)
        },
        |model| Ok(assembler.render(model)?.assembly),
    )
}

fn session_bet_config(config: &RunConfig) -> crate::bet::BetConfig {
    crate::bet::BetConfig { evals: config.evals, ..config.bet.clone() }
}

fn run_stage<A: Assembler, M: Measurer>(
    kind: OptimizerKind,
    config: &RunConfig,
    model: &mut Model,
    rng: &mut crate::rng::Rng,
    assembler: &A,
    measurer: &mut M,
    evals: u64,
    mutation_log: &mut MutationLog,
) -> Result<StageOutcome> {
    match kind {
        OptimizerKind::Rls => {
            let rls_config = RlsConfig { evals, cyclegoal: config.cyclegoal, ..RlsConfig::default() };
            let outcome = run_rls(model, rng, assembler, measurer, &rls_config, mutation_log)?;
            Ok(StageOutcome { final_ratio: outcome.final_ratio, best: outcome.best, convergence: outcome.convergence })
        }
        OptimizerKind::Sa => {
            let sa_config = SaConfig {
                evals,
                cyclegoal: config.cyclegoal,
                num_neighbors: config.sa_num_neighbors as usize,
                initial_temperature: config.sa_initial_temperature,
                visit_param: config.sa_visit_param,
                accept_param: config.sa_accept_param,
                step_size_param: config.sa_step_size_param,
                max_mut_step_size: config.sa_max_mut_step_size,
                cooling_schedule: config.sa_cooling_schedule,
                neighbor_strategy: config.sa_neighbor_strategy,
                ..SaConfig::default()
            };
            let outcome = run_sa(model, rng, assembler, measurer, &sa_config, mutation_log)?;
            Ok(StageOutcome { final_ratio: outcome.final_ratio, best: outcome.best, convergence: outcome.convergence })
        }
    }
}
