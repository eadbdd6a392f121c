//! Random local search: accept-if-not-worse mutate/measure loop (spec
//! §4.4).

use crate::analyser::{analyse, clamp_batch_size, ratio};
use crate::assemble::Assembler;
use crate::error::Result;
use crate::measure::Measurer;
use crate::model::Model;
use crate::rng::Rng;

use super::{apply_random_mutation, BestEver, CandidateSlot, ConvergenceLog, MutationLog};

/// Tunables the RLS loop needs beyond the `Model`/`Rng`/assembler pair.
#[derive(Debug, Clone)]
pub struct RlsConfig {
    pub evals: u64,
    pub cyclegoal: u32,
    pub print_every: u64,
    pub initial_batch_size: u32,
    pub num_batches: usize,
}

impl Default for RlsConfig {
    fn default() -> Self {
        RlsConfig {
            evals: 10_000,
            cyclegoal: 10_000,
            print_every: super::DEFAULT_PRINT_EVERY,
            initial_batch_size: 50,
            num_batches: crate::measure::DEFAULT_NUM_BATCHES,
        }
    }
}

/// Final state emitted when the RLS loop terminates (spec §4.4
/// "Termination").
pub struct RlsOutcome {
    pub final_assembly: String,
    pub final_ratio: f64,
    pub best: BestEver,
    pub convergence: ConvergenceLog,
}

/// Run random local search for `config.evals` iterations, logging every
/// mutation to `mutation_log` and returning the last-accepted candidate.
pub fn run_rls<A: Assembler, M: Measurer>(
    model: &mut Model,
    rng: &mut Rng,
    assembler: &A,
    measurer: &mut M,
    config: &RlsConfig,
    mutation_log: &mut MutationLog,
) -> Result<RlsOutcome> {
    let mut batch_size = config.initial_batch_size;
    let mut slots: [CandidateSlot; 2] = {
        let rendered = assembler.render(model)?;
        let slot: CandidateSlot = rendered.into();
        [slot.clone(), slot]
    };
    let mut current_is_a = true;
    let mut best = BestEver::default();
    let mut convergence = ConvergenceLog::default();
    let mut final_ratio = 1.0;

    for evaluation in 0..config.evals {
        let (choice, perm_details, decision_details) = if evaluation == 0 {
            ("init".to_string(), String::new(), String::new())
        } else {
            let kind = apply_random_mutation(model, rng);
            let (p, d) = model.last_mutation_record().csv_details();
            (kind.to_string(), p, d)
        };

        let other_idx = if current_is_a { 1 } else { 0 };
        let rendered = assembler.render(model)?;
        slots[other_idx] = CandidateSlot { last_mutation_kind: "pending", ..rendered.into() };

        let candidates = vec![
            crate::assemble::RenderedCandidate {
                assembly: slots[0].assembly.clone(),
                stack_len: slots[0].stack_len,
                instruction_count: slots[0].instruction_count,
            },
            crate::assemble::RenderedCandidate {
                assembly: slots[1].assembly.clone(),
                stack_len: slots[1].stack_len,
                instruction_count: slots[1].instruction_count,
            },
        ];
        let raw = measurer.measure(&candidates, batch_size, config.num_batches)?;
        let analysis = analyse(&raw)?;
        let median_a = analysis.raw_median[0];
        let median_b = analysis.raw_median[1];
        let median_check = analysis.check_median;

        batch_size = clamp_batch_size(config.cyclegoal, batch_size, median_check);

        let mutated_idx = other_idx;
        let current_idx = if current_is_a { 0 } else { 1 };
        let mutated_median = if mutated_idx == 0 { median_a } else { median_b };
        let current_median = if current_idx == 0 { median_a } else { median_b };

        let kept = evaluation == 0 || mutated_median <= current_median;
        if kept {
            current_is_a = other_idx == 0;
        } else {
            model.revert_last_mutation()?;
        }

        mutation_log.append(evaluation, &choice, kept, &perm_details, &decision_details)?;

        let current_idx_after = if current_is_a { 0 } else { 1 };
        let winning_median = if current_idx_after == 0 { median_a } else { median_b };
        let r = ratio(median_check, median_a, median_b);
        final_ratio = r;
        best.consider(&slots[current_idx_after].assembly, r, winning_median, evaluation);

        if evaluation % config.print_every == 0 {
            convergence.push_ratio(r);
        }
    }

    mutation_log.flush()?;
    let final_idx = if current_is_a { 0 } else { 1 };
    Ok(RlsOutcome {
        final_assembly: slots[final_idx].assembly.clone(),
        final_ratio,
        best,
        convergence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::TextAssembler;
    use crate::measure::DeterministicMeasurer;
    use crate::model::Node;

    fn small_model() -> Model {
        Model::new(vec![Node::new(0, "a", vec![]), Node::new(1, "b", vec![0]), Node::new(2, "c", vec![1])])
    }

    #[test]
    fn runs_for_exactly_evals_iterations_and_logs_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let mut model = small_model();
        let mut rng = Rng::new(42);
        let mut measurer = DeterministicMeasurer::new(42);
        let config = RlsConfig { evals: 100, ..RlsConfig::default() };
        let mut log = MutationLog::create(&path).unwrap();

        let outcome =
            run_rls(&mut model, &mut rng, &TextAssembler, &mut measurer, &config, &mut log).unwrap();

        assert!(!outcome.final_assembly.is_empty());
        assert_eq!(log.rows_written(), 100);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 101); // header + 100 rows
    }

    /// Scenario 4 (spec §8): a Measurer that always ties accepts every
    /// mutation, and the accepted slot alternates every iteration.
    #[test]
    fn ties_are_always_accepted_and_slot_alternates() {
        struct TieMeasurer;
        impl Measurer for TieMeasurer {
            fn measure(
                &mut self,
                candidates: &[crate::assemble::RenderedCandidate],
                batch_size: u32,
                num_batches: usize,
            ) -> Result<crate::analyser::RawSamples> {
                let flat = vec![1000u64; num_batches];
                Ok(crate::analyser::RawSamples {
                    batch_size,
                    batches: candidates.iter().map(|_| flat.clone()).collect(),
                    check_batches: flat,
                })
            }
        }

        let mut model = small_model();
        let mut rng = Rng::new(1);
        let mut measurer = TieMeasurer;
        let config = RlsConfig { evals: 10, ..RlsConfig::default() };
        let dir = tempfile::tempdir().unwrap();
        let mut log = MutationLog::create(&dir.path().join("m.csv")).unwrap();

        let outcome =
            run_rls(&mut model, &mut rng, &TextAssembler, &mut measurer, &config, &mut log).unwrap();
        assert!((outcome.final_ratio - 1.0).abs() < 1e-9);

        let contents = std::fs::read_to_string(dir.path().join("m.csv")).unwrap();
        for line in contents.lines().skip(1) {
            let kept: &str = line.split(',').nth(2).unwrap();
            assert_eq!(kept, "true");
        }
    }
}
