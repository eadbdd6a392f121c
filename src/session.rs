//! Explicit per-run state (spec §9 "Global mutable state"): a `Session`
//! owns the `Rng`, the `Model`, and a `Statistics` sink, replacing the
//! module-level singletons (`Paul`, a global `Model`, `globals`) the
//! source used. One `Session` exists per run; nothing here is shared
//! across threads (spec §5).

use crate::model::Model;
use crate::optimizer::{BestEver, ConvergenceLog, MutationLog};
use crate::rng::Rng;

/// The run-wide bookkeeping the source kept in a module-level `globals`
/// object: convergence samples, best-ever records, and the mutation log.
pub struct Statistics {
    pub convergence: ConvergenceLog,
    pub best: BestEver,
    pub mutation_log: MutationLog,
}

impl Statistics {
    pub fn new(mutation_log: MutationLog) -> Self {
        Statistics { convergence: ConvergenceLog::default(), best: BestEver::default(), mutation_log }
    }

    pub fn merge_stage(&mut self, convergence: &ConvergenceLog, best: &BestEver) {
        self.convergence.0.extend(convergence.0.iter().cloned());
        if let Some(record) = &best.by_ratio {
            self.best.consider(&record.assembly, record.ratio, record.cycle_count, record.epoch);
        }
        if let Some(record) = &best.by_cycles {
            self.best.consider(&record.assembly, record.ratio, record.cycle_count, record.epoch);
        }
    }
}

/// Owns everything one run needs: the deterministic randomness source,
/// the mutable program IR, and the statistics sink.
pub struct Session {
    pub rng: Rng,
    pub model: Model,
    pub stats: Statistics,
}

impl Session {
    pub fn new(seed: u64, model: Model, mutation_log: MutationLog) -> Self {
        Session { rng: Rng::new(seed), model, stats: Statistics::new(mutation_log) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    fn model() -> Model {
        Model::new(vec![Node::new(0, "a", vec![])])
    }

    #[test]
    fn merge_stage_folds_child_bests_into_the_session_wide_view() {
        let dir = tempfile::tempdir().unwrap();
        let log = MutationLog::create(&dir.path().join("m.csv")).unwrap();
        let mut session = Session::new(1, model(), log);

        let mut child_best = BestEver::default();
        child_best.consider("a", 1.5, 90.0, 3);
        let mut convergence = ConvergenceLog::default();
        convergence.push_ratio(1.5);

        session.stats.merge_stage(&convergence, &child_best);
        assert_eq!(session.stats.best.by_ratio.unwrap().assembly, "a");
        assert_eq!(session.stats.convergence.0.len(), 1);
    }
}
