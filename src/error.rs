use std::path::PathBuf;

/// Stable process exit codes, one per [`OptError`] variant family.
///
/// These values are part of the external interface (spec §6) and must not
/// be renumbered once released; callers script against them.
pub const EXIT_OK: i32 = 0;
pub const EXIT_PARAMETER_PARSE_FAIL: i32 = 1;
pub const EXIT_MEASURE_INCORRECT: i32 = 2;
pub const EXIT_MEASURE_INVALID: i32 = 3;
pub const EXIT_MEASURE_GENERIC: i32 = 4;
pub const EXIT_PROOF_UNSUCCESSFUL: i32 = 5;
pub const EXIT_BAD_CONFIG: i32 = 6;

/// The full error taxonomy of spec §7.
///
/// Every variant is fatal to the run except where the optimizer loop
/// catches it itself (`Model::revert_last_mutation` is the only internal
/// recovery path; see `model::Model`). Construction sites are expected to
/// attach whatever artefacts the spec mandates *before* returning the
/// error, not after — by the time this type exists the corresponding
/// `.asm`/`.json` dumps must already be on disk.
#[derive(Debug, thiserror::Error)]
pub enum OptError {
    #[error("bad configuration: {0}")]
    BadConfig(String),

    #[error("bad internal state: {0}")]
    BadState(String),

    #[error("assembly contains an `undefined` marker: {path}")]
    AssembleUndefined { path: PathBuf },

    #[error("measurer reported a mismatch between candidates (evaluation {evaluation})")]
    MeasureIncorrect {
        evaluation: u64,
        a_path: PathBuf,
        b_path: PathBuf,
        model_dump_path: PathBuf,
    },

    #[error("candidate failed to assemble in the native harness (evaluation {evaluation})")]
    MeasureInvalid {
        evaluation: u64,
        a_path: PathBuf,
        b_path: PathBuf,
        model_dump_path: PathBuf,
    },

    #[error("measurement failed: {reason}")]
    MeasureGeneric {
        reason: String,
        a_path: PathBuf,
        b_path: PathBuf,
    },

    #[error("external prover exited unsuccessfully: `{command}`")]
    ProofUnsuccessful { command: String, status: i32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize model state: {0}")]
    Serde(#[from] serde_json::Error),
}

impl OptError {
    /// The process exit code mandated by spec §6 for this error's family.
    pub fn exit_code(&self) -> i32 {
        match self {
            OptError::BadConfig(_) => EXIT_PARAMETER_PARSE_FAIL,
            OptError::BadState(_) => EXIT_BAD_CONFIG,
            OptError::AssembleUndefined { .. } => EXIT_BAD_CONFIG,
            OptError::MeasureIncorrect { .. } => EXIT_MEASURE_INCORRECT,
            OptError::MeasureInvalid { .. } => EXIT_MEASURE_INVALID,
            OptError::MeasureGeneric { .. } => EXIT_MEASURE_GENERIC,
            OptError::ProofUnsuccessful { .. } => EXIT_PROOF_UNSUCCESSFUL,
            OptError::Io(_) => EXIT_MEASURE_GENERIC,
            OptError::Serde(_) => EXIT_BAD_CONFIG,
        }
    }
}

pub type Result<T> = std::result::Result<T, OptError>;
