//! Simulated annealing: multi-neighbour sampling, a cooling schedule, and
//! a neighbour-selection strategy over a configurable number of
//! neighbours per epoch (spec §4.5).

use crate::analyser::{analyse, clamp_batch_size, ratio};
use crate::assemble::{Assembler, RenderedCandidate};
use crate::error::{OptError, Result};
use crate::measure::Measurer;
use crate::model::Model;
use crate::rng::Rng;

use super::{apply_random_mutation, BestEver, CandidateSlot, ConvergenceLog, MutationLog};

const CURRENT_SNAPSHOT: &str = "__sa_current__";

/// The three cooling curves of spec §4.5, each a pure function of epoch
/// index `t`, the visit parameter `q`, and the initial temperature `t0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolingSchedule {
    Exp,
    Lin,
    Log,
}

impl CoolingSchedule {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "exp" => Ok(CoolingSchedule::Exp),
            "lin" => Ok(CoolingSchedule::Lin),
            "log" => Ok(CoolingSchedule::Log),
            other => Err(OptError::BadConfig(format!("unknown cooling schedule `{other}`"))),
        }
    }

    /// Temperature at epoch `t`, monotone non-increasing in `t` for every
    /// documented parameter range (spec §8).
    pub fn temperature(&self, t: f64, q: f64, t0: f64, n_evals: f64) -> f64 {
        match self {
            CoolingSchedule::Exp => {
                let num = 2f64.powf(q - 1.0) - 1.0;
                let den = (t + 2.0).powf(q - 1.0) - 1.0;
                t0 * num / den
            }
            CoolingSchedule::Lin => {
                let frac = (t / n_evals).clamp(0.0, 1.0);
                t0 * (1.0 - frac) * q
            }
            CoolingSchedule::Log => {
                let value = t0 / ((2.62 - q) * (t + 1.0)).ln();
                value.max(0.0)
            }
        }
    }
}

/// The three neighbour-selection strategies of spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborStrategy {
    Uniform,
    Greedy,
    Weighted,
}

impl NeighborStrategy {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "uniform" => Ok(NeighborStrategy::Uniform),
            "greedy" => Ok(NeighborStrategy::Greedy),
            "weighted" => Ok(NeighborStrategy::Weighted),
            other => Err(OptError::BadConfig(format!("unknown neighbour strategy `{other}`"))),
        }
    }

    /// Pick a 1-based neighbour index from `energies` (`energies[0]` is
    /// neighbour 1, ..., `energies[n-1]` is neighbour `n`).
    pub fn select(&self, energies: &[f64], rng: &mut Rng) -> usize {
        let n = energies.len();
        assert!(n >= 1, "neighbour selection requires at least one neighbour");
        if n == 1 {
            return 1;
        }
        match self {
            NeighborStrategy::Uniform => 1 + rng.uniform_index(n),
            NeighborStrategy::Greedy => {
                let (idx, _) = energies
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                    .expect("nonempty energies");
                idx + 1
            }
            NeighborStrategy::Weighted => {
                let total: f64 = energies.iter().sum();
                let weights: Vec<f64> = if total <= 0.0 {
                    vec![1.0; n]
                } else {
                    energies.iter().map(|&e| (1.0 / (n as f64 - 1.0)) * (1.0 - e / total)).collect()
                };
                1 + rng.pick_weighted(&weights)
            }
        }
    }
}

/// Scalar objective driving SA acceptance; isolated so future scaling of
/// measured cycle counts is a single-point change (spec §4.5).
fn energy(median_cycles: f64) -> f64 {
    median_cycles
}

#[derive(Debug, Clone)]
pub struct SaConfig {
    pub evals: u64,
    pub cyclegoal: u32,
    pub print_every: u64,
    pub initial_batch_size: u32,
    pub num_batches: usize,
    pub num_neighbors: usize,
    pub initial_temperature: f64,
    pub visit_param: f64,
    pub accept_param: f64,
    pub step_size_param: f64,
    pub max_mut_step_size: i64,
    pub cooling_schedule: CoolingSchedule,
    pub neighbor_strategy: NeighborStrategy,
}

impl Default for SaConfig {
    fn default() -> Self {
        SaConfig {
            evals: 10_000,
            cyclegoal: 10_000,
            print_every: super::DEFAULT_PRINT_EVERY,
            initial_batch_size: 50,
            num_batches: crate::measure::DEFAULT_NUM_BATCHES,
            num_neighbors: 1,
            initial_temperature: 18_351.0,
            visit_param: 1.62,
            accept_param: 1.0 / 5.515,
            step_size_param: 0.005,
            max_mut_step_size: -1,
            cooling_schedule: CoolingSchedule::Exp,
            neighbor_strategy: NeighborStrategy::Greedy,
        }
    }
}

pub struct SaOutcome {
    pub final_assembly: String,
    pub final_ratio: f64,
    pub best: BestEver,
    pub convergence: ConvergenceLog,
}

/// Draw this epoch's mutation step count for one neighbour: a clamped,
/// rounded Cauchy draw (spec §4.5 step 2, §9 "the clamp ... is essential
/// and must precede Model mutations").
fn draw_step_count(rng: &mut Rng, temperature: f64, step_size_param: f64, max_mut_step_size: i64) -> Result<u32> {
    let scale = (temperature / step_size_param).max(f64::MIN_POSITIVE);
    let raw = rng.cauchy(1.0, scale)?;
    let rounded = raw.round();
    let hi = if max_mut_step_size <= 0 { i64::MAX } else { max_mut_step_size };
    let clamped = (rounded as i64).clamp(1, hi);
    Ok(clamped as u32)
}

#[allow(clippy::too_many_arguments)]
pub fn run_sa<A: Assembler, M: Measurer>(
    model: &mut Model,
    rng: &mut Rng,
    assembler: &A,
    measurer: &mut M,
    config: &SaConfig,
    mutation_log: &mut MutationLog,
) -> Result<SaOutcome> {
    let n = config.num_neighbors.max(1);
    let mut batch_size = config.initial_batch_size;
    let mut best = BestEver::default();
    let mut convergence = ConvergenceLog::default();
    let mut final_ratio = 1.0;
    let mut final_assembly = assembler.render(model)?.assembly;

    let mut consumed: u64 = 0;
    let mut epoch: u64 = 0;

    while consumed < config.evals {
        model.save_snapshot(CURRENT_SNAPSHOT);
        let current_rendered = assembler.render(model)?;

        let t = config.cooling_schedule.temperature(
            epoch as f64,
            config.visit_param,
            config.initial_temperature,
            config.evals as f64,
        );

        let mut neighbor_renders: Vec<RenderedCandidate> = Vec::with_capacity(n);
        let mut neighbor_choices = Vec::with_capacity(n);
        for i in 1..=n {
            let k = draw_step_count(rng, t, config.step_size_param, config.max_mut_step_size)?;
            let mut last_choice = "permutation";
            for _ in 0..k {
                last_choice = apply_random_mutation(model, rng);
            }
            let snapshot_id = format!("nbr{i}");
            model.save_snapshot(&snapshot_id);
            neighbor_renders.push(assembler.render(model)?);
            neighbor_choices.push((last_choice, k, snapshot_id));
            model.restore_snapshot(CURRENT_SNAPSHOT)?;
        }

        let mut all_candidates = Vec::with_capacity(n + 1);
        all_candidates.push(current_rendered.clone());
        all_candidates.extend(neighbor_renders.iter().cloned());

        let raw = measurer.measure(&all_candidates, batch_size, config.num_batches)?;
        let analysis = analyse(&raw)?;
        let median_current = analysis.raw_median[0];
        let neighbor_medians = &analysis.raw_median[1..];
        let median_check = analysis.check_median;
        batch_size = clamp_batch_size(config.cyclegoal, batch_size, median_check);

        let energies: Vec<f64> = neighbor_medians.iter().map(|&m| energy(m)).collect();
        let j = config.neighbor_strategy.select(&energies, rng);
        let energy_j = energies[j - 1];
        let energy_0 = energy(median_current);

        let accept = if energy_j < energy_0 {
            true
        } else if config.accept_param <= 0.0 {
            false
        } else {
            let delta = energy_j - energy_0;
            let p = (-config.accept_param * delta / t.max(f64::MIN_POSITIVE)).exp().min(1.0);
            rng.uniform_real() < p
        };

        if accept {
            let (_, _, snapshot_id) = &neighbor_choices[j - 1];
            model.restore_snapshot(snapshot_id)?;
            final_assembly = neighbor_renders[j - 1].assembly.clone();
        } else {
            // Model and slot 0 are already the current state: every
            // neighbour render restored to CURRENT_SNAPSHOT before the
            // next was drawn.
            final_assembly = current_rendered.assembly.clone();
        }

        // One CSV row per evaluation, not per epoch: an epoch with
        // `n` neighbours consumes `n` evaluations (spec's mutation-log
        // contract), so each neighbour gets its own row keyed by a
        // running evaluation counter rather than the epoch index.
        for (i, (choice, k, _snapshot_id)) in neighbor_choices.iter().enumerate() {
            let evaluation = consumed + i as u64;
            let kept = accept && i + 1 == j;
            let detail = format!("neighbor={};steps={k}", i + 1);
            let (perm_details, decision_details) =
                if *choice == "permutation" { (detail, String::new()) } else { (String::new(), detail) };
            mutation_log.append(evaluation, choice, kept, &perm_details, &decision_details)?;
        }

        let r = ratio(median_check, median_current, energies[j - 1]);
        final_ratio = r;
        let winning_median = if accept { energy_j } else { energy_0 };
        best.consider(&final_assembly, r, winning_median, epoch);

        if epoch % config.print_every == 0 {
            convergence.push_ratio(r);
        }

        consumed += n as u64;
        epoch += 1;
    }

    mutation_log.flush()?;
    Ok(SaOutcome { final_assembly, final_ratio, best, convergence })
}
