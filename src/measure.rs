//! The `Measurer` external interface (spec §2, §4.8).
//!
//! Executing candidate assemblies against real hardware and returning raw
//! cycle counts is native-harness work, explicitly out of scope (spec
//! §1). This module defines the seam plus a deterministic in-process
//! measurer used by tests and by `--bridge manual` smoke runs, so the
//! optimizer loop is exercisable without a NASM toolchain on the host.

use std::path::PathBuf;

use crate::analyser::RawSamples;
use crate::assemble::RenderedCandidate;
use crate::error::{OptError, Result};

pub const DEFAULT_NUM_BATCHES: usize = 5;

/// Executes a set of candidate assemblies in interleaved batches and
/// returns raw cycle-count samples (spec §2). Slot 0 is always "current";
/// later slots are neighbours under evaluation. Must be explicitly
/// destroyed on exit (spec §5) — modeled here as `Drop`, which real
/// native-library-backed implementations can use to release FFI state.
pub trait Measurer {
    fn measure(
        &mut self,
        candidates: &[RenderedCandidate],
        batch_size: u32,
        num_batches: usize,
    ) -> Result<RawSamples>;
}

/// A deterministic measurer whose cycle counts are a pure function of a
/// candidate's instruction count and stack length, with a small amount of
/// seeded jitter — enough to exercise medians, batch-size retuning, and
/// acceptance logic without hardware. `inject_mismatch_at` reproduces
/// spec §8 end-to-end scenario 5 (a Measurer that flags a mismatch on a
/// specific evaluation).
pub struct DeterministicMeasurer {
    rng: crate::rng::Rng,
    evaluation: u64,
    inject_mismatch_at: Option<u64>,
    cache_dir: Option<PathBuf>,
}

impl DeterministicMeasurer {
    pub fn new(seed: u64) -> Self {
        DeterministicMeasurer {
            rng: crate::rng::Rng::new(seed),
            evaluation: 0,
            inject_mismatch_at: None,
            cache_dir: None,
        }
    }

    /// Reproduces spec §8 end-to-end scenario 5: `measure` fails with
    /// `MeasureIncorrect` on `at_evaluation`, after persisting the
    /// mismatching candidates under `cache_dir` (the model dump itself is
    /// the caller's responsibility, since this type has no `Model`
    /// access).
    pub fn with_injected_mismatch(seed: u64, at_evaluation: u64, cache_dir: impl Into<PathBuf>) -> Self {
        DeterministicMeasurer {
            rng: crate::rng::Rng::new(seed),
            evaluation: 0,
            inject_mismatch_at: Some(at_evaluation),
            cache_dir: Some(cache_dir.into()),
        }
    }

    /// Whether `measure` would, on its next call, be the injected
    /// mismatch evaluation.
    pub fn next_call_is_injected_mismatch(&self) -> bool {
        self.inject_mismatch_at == Some(self.evaluation)
    }

    fn base_cost(candidate: &RenderedCandidate) -> f64 {
        (candidate.instruction_count as f64) * 10.0 + (candidate.stack_len as f64) * 2.0 + 500.0
    }

    fn one_batch(&mut self, cost: f64, batch_size: u32) -> u64 {
        let mut sum = 0.0;
        for _ in 0..batch_size {
            let jitter = 1.0 + (self.rng.uniform_real() - 0.5) * 0.02;
            sum += cost * jitter;
        }
        sum.round() as u64
    }
}

impl Measurer for DeterministicMeasurer {
    fn measure(
        &mut self,
        candidates: &[RenderedCandidate],
        batch_size: u32,
        num_batches: usize,
    ) -> Result<RawSamples> {
        let this_evaluation = self.evaluation;
        self.evaluation += 1;

        if self.inject_mismatch_at == Some(this_evaluation) {
            let cache_dir = self
                .cache_dir
                .clone()
                .expect("with_injected_mismatch always sets a cache_dir");
            let a_path = cache_dir.join("tested_incorrect_A.asm");
            let b_path = cache_dir.join("tested_incorrect_B.asm");
            let model_dump_path = cache_dir.join("tested_incorrect.json");
            std::fs::write(&a_path, &candidates[0].assembly)?;
            std::fs::write(&b_path, &candidates.get(1).unwrap_or(&candidates[0]).assembly)?;
            return Err(OptError::MeasureIncorrect {
                evaluation: this_evaluation,
                a_path,
                b_path,
                model_dump_path,
            });
        }

        let costs: Vec<f64> = candidates.iter().map(Self::base_cost).collect();
        let mut batches = vec![Vec::with_capacity(num_batches); candidates.len()];
        for b in 0..num_batches {
            for (k, cost) in costs.iter().enumerate() {
                batches[k].push(self.one_batch(*cost, batch_size));
            }
        }
        let check_cost = costs[0];
        let check_batches: Vec<u64> = (0..num_batches).map(|_| self.one_batch(check_cost, batch_size)).collect();
        Ok(RawSamples { batch_size, batches, check_batches })
    }
}
