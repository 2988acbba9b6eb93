use thiserror::Error;

/// Log-probability substituted for a sequence the model cannot produce when
/// a batch objective sums log-likelihoods over many sequences.
pub const PENALTY_LOGP: f64 = -500.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HmmError {
    /// The scaled forward mass fell to `f64::MIN_POSITIVE` or below.
    #[error("sequence has negligible probability: forward mass underflowed at t = {t}")]
    Underflow { t: usize },

    #[error("forward mass is not finite at t = {t}")]
    NonFinite { t: usize },

    #[error("no path exists: sequence is infeasible under the model")]
    NoPath,

    #[error("observation sequence is empty")]
    EmptySequence,

    #[error("sequence length {len} exceeds the configured maximum {max}")]
    SequenceTooLong { len: usize, max: usize },

    #[error("observation at t = {t} is not a finite value")]
    InvalidObservation { t: usize },

    #[error("symbol {symbol} at t = {t} is outside the alphabet of size {alphabet}")]
    SymbolOutOfRange { t: usize, symbol: usize, alphabet: usize },

    #[error("scale vector has length {actual}, sequence has length {expected}")]
    ScaleMismatch { expected: usize, actual: usize },

    #[error("scale factor at t = {t} is not positive; it must come from a successful forward pass")]
    InvalidScale { t: usize },

    #[error("transition class {class} selected at t = {t} is outside [0, {classes})")]
    InvalidTransitionClass { t: usize, class: usize, classes: usize },

    #[error("{model} model cannot decode a {sequence} sequence")]
    SequenceKind {
        model: &'static str,
        sequence: &'static str,
    },

    #[error("label sequence has length {actual}, sequence has length {expected}")]
    LabelMismatch { expected: usize, actual: usize },

    #[error("invalid state path: {0}")]
    InvalidPath(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("silent states form a cycle through state {state}")]
    SilentCycle { state: usize },

    #[error("cannot allocate a {rows} x {cols} scratch matrix")]
    Allocation { rows: usize, cols: usize },
}

impl HmmError {
    /// True for failures meaning "this sequence cannot be produced by the
    /// model", as opposed to misuse of the API.
    pub fn is_infeasible(&self) -> bool {
        matches!(self, HmmError::Underflow { .. } | HmmError::NoPath)
    }
}

pub type Result<T> = std::result::Result<T, HmmError>;
