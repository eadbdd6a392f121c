//! Shared optimizer scaffolding: candidate slots, best-ever tracking, the
//! convergence/mutation logs, and the one mutation-choice rule both RLS
//! (§4.4) and SA (§4.5) use (spec §3, §9).

pub mod rls;
pub mod sa;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::assemble::RenderedCandidate;
use crate::error::Result;
use crate::model::Model;
use crate::rng::Rng;

/// How often the optimizer loop appends to the convergence log and emits
/// a status line, absent an explicit override (spec §4.4/§4.5 "emit
/// status every PRINT_EVERY").
pub const DEFAULT_PRINT_EVERY: u64 = 100;

/// One of the two mutation kinds an epoch may apply, with the "decision
/// falls back to permutation if no hot decision exists" rule of spec
/// §4.4 step 1 baked in. Shared between RLS and SA so the rule is
/// expressed exactly once.
pub fn apply_random_mutation(model: &mut Model, rng: &mut Rng) -> &'static str {
    if rng.coin_flip() && model.mutate_decision(rng) {
        "decision"
    } else {
        model.mutate_permutation(rng);
        "permutation"
    }
}

/// A fixed-index record holding one rendered candidate under measurement
/// (spec §3 "Candidate slot").
#[derive(Debug, Clone)]
pub struct CandidateSlot {
    pub assembly: String,
    pub stack_len: u32,
    pub instruction_count: u32,
    pub last_mutation_kind: &'static str,
}

impl From<RenderedCandidate> for CandidateSlot {
    fn from(rendered: RenderedCandidate) -> Self {
        CandidateSlot {
            assembly: rendered.assembly,
            stack_len: rendered.stack_len,
            instruction_count: rendered.instruction_count,
            last_mutation_kind: "init",
        }
    }
}

/// One of the two best-ever views of spec §3: ranked either by ratio or
/// by raw cycle count.
#[derive(Debug, Clone)]
pub struct BestRecord {
    pub assembly: String,
    pub ratio: f64,
    pub cycle_count: f64,
    pub epoch: u64,
}

/// Tracks the best candidate seen so far under both orderings.
#[derive(Debug, Clone, Default)]
pub struct BestEver {
    pub by_ratio: Option<BestRecord>,
    pub by_cycles: Option<BestRecord>,
}

impl BestEver {
    pub fn consider(&mut self, assembly: &str, ratio: f64, cycle_count: f64, epoch: u64) {
        let better_ratio = self.by_ratio.as_ref().map_or(true, |b| ratio > b.ratio);
        if better_ratio {
            self.by_ratio = Some(BestRecord { assembly: assembly.to_string(), ratio, cycle_count, epoch });
        }
        let better_cycles = self.by_cycles.as_ref().map_or(true, |b| cycle_count < b.cycle_count);
        if better_cycles {
            self.by_cycles = Some(BestRecord { assembly: assembly.to_string(), ratio, cycle_count, epoch });
        }
    }
}

/// Append-only sequence of ratio strings, one per status sample (spec
/// §3 "Convergence log"), for later plotting.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceLog(pub Vec<String>);

impl ConvergenceLog {
    pub fn push_ratio(&mut self, ratio: f64) {
        self.0.push(format!("{ratio:.6}"));
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

/// Append-only CSV mutation log: `evaluation,choice,kept,permutation-
/// details,decision-details` (spec §3, §6).
pub struct MutationLog {
    writer: BufWriter<File>,
    rows_written: u64,
}

impl MutationLog {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "evaluation,choice,kept,permutation-details,decision-details")?;
        Ok(MutationLog { writer, rows_written: 0 })
    }

    pub fn append(
        &mut self,
        evaluation: u64,
        choice: &str,
        kept: bool,
        permutation_details: &str,
        decision_details: &str,
    ) -> Result<()> {
        writeln!(
            self.writer,
            "{evaluation},{choice},{kept},{permutation_details},{decision_details}"
        )?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Decision, Node};

    #[test]
    fn apply_random_mutation_falls_back_when_no_hot_decision() {
        let mut model = Model::new(vec![Node::new(0, "a", vec![]), Node::new(1, "b", vec![0])]);
        let mut rng = Rng::new(1);
        for _ in 0..20 {
            assert_eq!(apply_random_mutation(&mut model, &mut rng), "permutation");
        }
    }

    #[test]
    fn apply_random_mutation_can_choose_decision_when_hot() {
        let mut node = Node::new(0, "a", vec![]);
        node.decisions.push(Decision::new("reg", vec!["xmm".into(), "gpr".into()], 0, true));
        let mut model = Model::new(vec![node]);
        let mut rng = Rng::new(2);
        let mut saw_decision = false;
        for _ in 0..100 {
            if apply_random_mutation(&mut model, &mut rng) == "decision" {
                saw_decision = true;
                break;
            }
        }
        assert!(saw_decision);
    }

    #[test]
    fn best_ever_tracks_both_views_independently() {
        let mut best = BestEver::default();
        best.consider("a", 1.0, 100.0, 0);
        best.consider("b", 1.5, 120.0, 1);
        best.consider("c", 1.2, 90.0, 2);
        assert_eq!(best.by_ratio.unwrap().assembly, "b");
        assert_eq!(best.by_cycles.unwrap().assembly, "c");
    }

    #[test]
    fn mutation_log_round_trips_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        {
            let mut log = MutationLog::create(&path).unwrap();
            log.append(0, "init", true, "", "").unwrap();
            log.append(1, "permutation", false, "node=1;dir=forward;walked=2", "").unwrap();
            log.flush().unwrap();
            assert_eq!(log.rows_written(), 2);
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3); // header + 2 rows
        assert!(contents.lines().next().unwrap().starts_with("evaluation,choice,kept"));
    }
}
