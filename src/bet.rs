//! Bet controller: hedge a run's evaluation budget across several
//! independently-seeded child attempts before committing to one (spec
//! §4.6).
//!
//! Grounded in the candidate-bookkeeping/sorting-by-score shape common to
//! population search drivers: every child is run to completion, scored,
//! and only the winner's state is kept, the same "generate many, keep the
//! best" structure a random-restart search uses for its candidate pool.

use crate::error::{OptError, Result};
use crate::model::Model;
use crate::optimizer::{BestEver, ConvergenceLog, MutationLog};
use crate::rng::Rng;

/// Tunables for the bet controller: split `evals` across `num_bets`
/// children, each given an `evals * bet_ratio / num_bets` share, then
/// hand the remaining `evals * (1 - bet_ratio)` to the winner.
#[derive(Debug, Clone)]
pub struct BetConfig {
    pub evals: u64,
    pub num_bets: u32,
    pub bet_ratio: f64,
    pub single: bool,
}

impl Default for BetConfig {
    fn default() -> Self {
        BetConfig { evals: 10_000, num_bets: 1, bet_ratio: 1.0, single: true }
    }
}

impl BetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_bets == 0 {
            return Err(OptError::BadConfig("numBets must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.bet_ratio) {
            return Err(OptError::BadConfig("betRatio must lie in [0, 1]".into()));
        }
        Ok(())
    }

    fn child_evals(&self) -> u64 {
        ((self.evals as f64) * self.bet_ratio / (self.num_bets as f64)).floor() as u64
    }

    fn continuation_evals(&self, spent: u64) -> u64 {
        self.evals.saturating_sub(spent)
    }
}

/// Unified result shape a bet-controller stage function must return,
/// regardless of whether the underlying stage ran RLS or SA.
pub struct StageOutcome {
    pub final_ratio: f64,
    pub best: BestEver,
    pub convergence: ConvergenceLog,
}

pub struct BetOutcome {
    pub final_assembly: String,
    pub final_ratio: f64,
    pub best: BestEver,
    pub convergence: ConvergenceLog,
}

/// Run the bet controller. `run_stage(model, rng, evals, mutation_log)`
/// runs whichever optimizer (RLS or SA) the caller configured for exactly
/// `evals` evaluations against `model` in place, returning its
/// [`StageOutcome`]; `render(model)` renders the model's current assembly
/// text for the final return value.
pub fn run_bet(
    model: &mut Model,
    rng: &mut Rng,
    config: &BetConfig,
    mutation_log: &mut MutationLog,
    mut run_stage: impl FnMut(&mut Model, &mut Rng, u64, &mut MutationLog) -> Result<StageOutcome>,
    render: impl Fn(&Model) -> Result<String>,
) -> Result<BetOutcome> {
    config.validate()?;

    if config.single || config.num_bets == 1 {
        let outcome = run_stage(model, rng, config.evals, mutation_log)?;
        let final_assembly = render(model)?;
        return Ok(BetOutcome {
            final_assembly,
            final_ratio: outcome.final_ratio,
            best: outcome.best,
            convergence: outcome.convergence,
        });
    }

    let child_evals = config.child_evals();
    let baseline_export = model.export();

    let mut best_child_ratio = f64::NEG_INFINITY;
    let mut best_child_export = None;
    let mut merged_best = BestEver::default();
    let mut merged_convergence = ConvergenceLog::default();

    for bet in 0..config.num_bets {
        let mut child_rng = rng.derive(bet as u64);
        let mut child_model = Model::import_from_export(baseline_export.clone());
        let outcome = run_stage(&mut child_model, &mut child_rng, child_evals, mutation_log)?;

        merged_convergence.0.extend(outcome.convergence.0.iter().cloned());
        if let Some(record) = &outcome.best.by_ratio {
            merged_best.consider(&record.assembly, record.ratio, record.cycle_count, record.epoch);
        }
        if let Some(record) = &outcome.best.by_cycles {
            merged_best.consider(&record.assembly, record.ratio, record.cycle_count, record.epoch);
        }

        if outcome.final_ratio > best_child_ratio {
            best_child_ratio = outcome.final_ratio;
            best_child_export = Some(child_model.export());
        }
    }

    let winner = best_child_export.expect("at least one bet runs when num_bets > 0");
    *model = Model::import_from_export(winner);

    let spent = child_evals.saturating_mul(config.num_bets as u64);
    let remaining = config.continuation_evals(spent);
    let final_outcome = run_stage(model, rng, remaining, mutation_log)?;

    merged_convergence.0.extend(final_outcome.convergence.0.iter().cloned());
    if let Some(record) = &final_outcome.best.by_ratio {
        merged_best.consider(&record.assembly, record.ratio, record.cycle_count, record.epoch);
    }
    if let Some(record) = &final_outcome.best.by_cycles {
        merged_best.consider(&record.assembly, record.ratio, record.cycle_count, record.epoch);
    }

    let final_assembly = render(model)?;
    Ok(BetOutcome {
        final_assembly,
        final_ratio: final_outcome.final_ratio,
        best: merged_best,
        convergence: merged_convergence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    fn small_model() -> Model {
        Model::new(vec![Node::new(0, "a", vec![]), Node::new(1, "b", vec![0])])
    }

    #[test]
    fn single_shortcut_runs_exactly_once_for_the_full_budget() {
        let mut model = small_model();
        let mut rng = Rng::new(1);
        let config = BetConfig { evals: 40, num_bets: 1, bet_ratio: 1.0, single: true };
        let dir = tempfile::tempdir().unwrap();
        let mut log = MutationLog::create(&dir.path().join("m.csv")).unwrap();

        let mut calls = 0u32;
        let mut seen_evals = Vec::new();
        let outcome = run_bet(
            &mut model,
            &mut rng,
            &config,
            &mut log,
            |_m, _r, evals, _log| {
                calls += 1;
                seen_evals.push(evals);
                Ok(StageOutcome { final_ratio: 1.0, best: BestEver::default(), convergence: ConvergenceLog::default() })
            },
            |_m| Ok("asm".to_string()),
        )
        .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(seen_evals, vec![40]);
        assert_eq!(outcome.final_assembly, "asm");
    }

    /// Scenario 3 (spec §8): 4 bets, betRatio 0.25, evals 400 gives each
    /// child 25 evals and the continuation 300.
    #[test]
    fn splits_evals_per_scenario_three() {
        let mut model = small_model();
        let mut rng = Rng::new(7);
        let config = BetConfig { evals: 400, num_bets: 4, bet_ratio: 0.25, single: false };
        let dir = tempfile::tempdir().unwrap();
        let mut log = MutationLog::create(&dir.path().join("m.csv")).unwrap();

        let mut child_evals_seen = Vec::new();
        let mut call = 0u32;
        let outcome = run_bet(
            &mut model,
            &mut rng,
            &config,
            &mut log,
            |_m, _r, evals, _log| {
                call += 1;
                child_evals_seen.push(evals);
                let ratio = if call == 3 { 2.0 } else { 1.0 };
                Ok(StageOutcome { final_ratio: ratio, best: BestEver::default(), convergence: ConvergenceLog::default() })
            },
            |_m| Ok("asm".to_string()),
        )
        .unwrap();

        assert_eq!(&child_evals_seen[0..4], &[25, 25, 25, 25]);
        assert_eq!(child_evals_seen[4], 300);
        assert_eq!(outcome.final_ratio, 1.0); // the continuation's own ratio, not the winning child's
    }

    #[test]
    fn child_seeds_are_deterministic_across_runs() {
        let config = BetConfig { evals: 40, num_bets: 3, bet_ratio: 0.5, single: false };
        let run = |seed: u64| {
            let mut model = small_model();
            let mut rng = Rng::new(seed);
            let dir = tempfile::tempdir().unwrap();
            let mut log = MutationLog::create(&dir.path().join("m.csv")).unwrap();
            let mut seeds = Vec::new();
            run_bet(
                &mut model,
                &mut rng,
                &config,
                &mut log,
                |_m, r, evals, _log| {
                    if evals != 40 - (40.0_f64 * 0.5 / 3.0).floor() as u64 {
                        // a child call, not the continuation
                        seeds.push(r.seed());
                    }
                    Ok(StageOutcome { final_ratio: 1.0, best: BestEver::default(), convergence: ConvergenceLog::default() })
                },
                |_m| Ok("asm".to_string()),
            )
            .unwrap();
            seeds
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn rejects_zero_bets_and_out_of_range_ratio() {
        assert!(BetConfig { evals: 10, num_bets: 0, bet_ratio: 1.0, single: false }.validate().is_err());
        assert!(BetConfig { evals: 10, num_bets: 1, bet_ratio: 1.5, single: false }.validate().is_err());
    }
}
