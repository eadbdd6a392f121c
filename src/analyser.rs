//! Reduces raw Measurer samples to the statistics the optimizers and the
//! status line need (spec §4.3).

use crate::error::{OptError, Result};

/// `K` candidates x `num_batches` repetitions of `batch_size` executions
/// each, plus a trailing re-measurement of candidate 0 used as the noise
/// check (spec §4.3's "by convention a re-measurement of the first
/// candidate"). `batches[k][b]` is the summed cycle count of batch `b` for
/// candidate `k`; `check_batches[b]` is the matching re-measurement.
#[derive(Debug, Clone)]
pub struct RawSamples {
    pub batch_size: u32,
    pub batches: Vec<Vec<u64>>,
    pub check_batches: Vec<u64>,
}

impl RawSamples {
    pub fn candidate_count(&self) -> usize {
        self.batches.len()
    }
}

/// A small fixed-width compression of a sample sequence for a terminal
/// status line: min/median/max of the per-batch sums.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub min: u64,
    pub median: f64,
    pub max: u64,
}

/// Everything the optimizer loop needs after one measurement round.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub raw_median: Vec<f64>,
    pub batch_size_scaled_raw_median: Vec<f64>,
    pub chunks: Vec<Chunk>,
    pub check_median: f64,
}

fn median_u64(values: &[u64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    assert!(n > 0, "median of an empty sample set is undefined");
    if n % 2 == 1 {
        sorted[n / 2] as f64
    } else {
        (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
    }
}

fn chunk_of(values: &[u64]) -> Chunk {
    let min = *values.iter().min().expect("chunk requires at least one sample");
    let max = *values.iter().max().expect("chunk requires at least one sample");
    Chunk { min, median: median_u64(values), max }
}

/// Reduce one measurement round to per-candidate statistics.
///
/// Fails with [`OptError::MeasureGeneric`] if the batch shapes are
/// inconsistent (every candidate and the check column must report the
/// same number of batches) — callers that need `MeasureIncorrect`/
/// `MeasureInvalid` surface those directly from the `Measurer`, since only
/// it knows whether a mismatch was a miscompilation or an assembly
/// failure (spec §4.3).
pub fn analyse(samples: &RawSamples) -> Result<Analysis> {
    if samples.batches.is_empty() {
        return Err(OptError::BadState("analyse called with zero candidates".into()));
    }
    let num_batches = samples.check_batches.len();
    if samples.batches.iter().any(|b| b.len() != num_batches) {
        return Err(OptError::MeasureGeneric {
            reason: "inconsistent batch counts across candidates".into(),
            a_path: Default::default(),
            b_path: Default::default(),
        });
    }

    let batch_size = samples.batch_size as f64;
    let mut raw_median = Vec::with_capacity(samples.batches.len());
    let mut batch_size_scaled_raw_median = Vec::with_capacity(samples.batches.len());
    let mut chunks = Vec::with_capacity(samples.batches.len());

    for batch in &samples.batches {
        let scaled = median_u64(batch);
        batch_size_scaled_raw_median.push(scaled);
        raw_median.push(scaled / batch_size);
        chunks.push(chunk_of(batch));
    }
    chunks.push(chunk_of(&samples.check_batches));

    let check_median = median_u64(&samples.check_batches) / batch_size;

    Ok(Analysis { raw_median, batch_size_scaled_raw_median, chunks, check_median })
}

/// Self-tuning batch size update (spec §4.4 step 4): drive the sample
/// budget toward `cyclegoal` cycles per batch using the *check* median,
/// never the mutated candidate, so search direction cannot bias sampling
/// effort (spec §9 "Batch-size re-tuning").
pub fn clamp_batch_size(cyclegoal: u32, current_batch_size: u32, median_check: f64) -> u32 {
    if median_check <= 0.0 {
        return current_batch_size.clamp(5, 10_000);
    }
    let proposed = (cyclegoal as f64 * current_batch_size as f64 / median_check).ceil();
    (proposed as u32).clamp(5, 10_000)
}

/// The dimensionless speedup indicator of the GLOSSARY: `medianCheck /
/// min(medianCurrent, medianCandidate)`.
pub fn ratio(median_check: f64, median_current: f64, median_candidate: f64) -> f64 {
    median_check / median_current.min(median_candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_round() -> RawSamples {
        RawSamples {
            batch_size: 100,
            batches: vec![vec![1000, 1010, 990], vec![1200, 1190, 1205]],
            check_batches: vec![1001, 999, 1002],
        }
    }

    #[test]
    fn raw_median_divides_by_batch_size() {
        let analysis = analyse(&sample_round()).unwrap();
        assert_eq!(analysis.batch_size_scaled_raw_median[0], 1000.0);
        assert_eq!(analysis.raw_median[0], 10.0);
        assert_eq!(analysis.batch_size_scaled_raw_median[1], 1200.0);
    }

    #[test]
    fn chunks_include_a_trailing_check_chunk() {
        let analysis = analyse(&sample_round()).unwrap();
        assert_eq!(analysis.chunks.len(), 3);
        let check_chunk = analysis.chunks.last().unwrap();
        assert_eq!(check_chunk.min, 999);
        assert_eq!(check_chunk.max, 1002);
    }

    #[test]
    fn mismatched_batch_counts_are_measure_generic() {
        let mut samples = sample_round();
        samples.batches[0].push(1);
        assert!(matches!(analyse(&samples), Err(OptError::MeasureGeneric { .. })));
    }

    #[test]
    fn clamp_batch_size_is_monotone_in_the_ratio() {
        let a = clamp_batch_size(10_000, 100, 20_000.0);
        let b = clamp_batch_size(10_000, 100, 10_000.0);
        let c = clamp_batch_size(10_000, 100, 5_000.0);
        assert!(a <= b);
        assert!(b <= c);
    }

    #[test]
    fn clamp_batch_size_stays_within_bounds() {
        assert_eq!(clamp_batch_size(10_000, 100, 0.001), 10_000);
        assert_eq!(clamp_batch_size(1, 100, 1_000_000.0), 5);
    }

    #[test]
    fn ratio_is_at_least_one_when_candidate_is_not_faster() {
        assert!((ratio(100.0, 100.0, 120.0) - 1.0).abs() < 1e-9);
        assert!(ratio(100.0, 90.0, 120.0) > 1.0);
    }
}
