//! The `Prover` external interface (spec §1, §4.7 step (h)).
//!
//! Symbolic equivalence proving is delegated to an out-of-tree tool in
//! production. This module defines the seam plus a subprocess-backed
//! implementation that shells out to it, printing the command line
//! before running it (spec §7 `ProofUnsuccessful` policy).

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use crate::error::{OptError, Result};

/// Proves semantic equivalence between a baseline and a candidate
/// assembly listing, returning the wall-clock time spent (spec §5
/// "accounted under `validate` time").
pub trait Prover {
    fn prove(&self, baseline: &Path, candidate: &Path) -> Result<Duration>;
}

/// Invokes an external prover binary as a blocking subprocess.
pub struct SubprocessProver {
    pub command: String,
}

impl SubprocessProver {
    pub fn new(command: impl Into<String>) -> Self {
        SubprocessProver { command: command.into() }
    }
}

impl Prover for SubprocessProver {
    fn prove(&self, baseline: &Path, candidate: &Path) -> Result<Duration> {
        let full_command = format!(
            "{} {} {}",
            self.command,
            baseline.display(),
            candidate.display()
        );
        println!("{full_command}");

        let started = Instant::now();
        let status = Command::new(&self.command)
            .arg(baseline)
            .arg(candidate)
            .status()?;
        let elapsed = started.elapsed();

        if status.success() {
            Ok(elapsed)
        } else {
            Err(OptError::ProofUnsuccessful {
                command: full_command,
                status: status.code().unwrap_or(-1),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_command_reports_proof_unsuccessful() {
        let prover = SubprocessProver::new("false");
        let result = prover.prove(Path::new("a.asm"), Path::new("b.asm"));
        assert!(matches!(result, Err(OptError::ProofUnsuccessful { .. })));
    }

    #[test]
    fn successful_command_returns_elapsed_time() {
        let prover = SubprocessProver::new("true");
        let result = prover.prove(Path::new("a.asm"), Path::new("b.asm"));
        assert!(result.is_ok());
    }
}
