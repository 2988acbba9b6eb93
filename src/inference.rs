//! Scaled forward-backward and Viterbi decoding.
//!
//! Every call allocates its own scratch (alpha, beta, psi, scale) and only
//! reads the model, so one model can serve any number of concurrent calls.

pub mod backward;
pub mod forward;
pub mod likelihood;
pub mod viterbi;

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{HmmError, Result, PENALTY_LOGP};
use crate::hmm::HiddenMarkovModel;
use crate::logging::{Logger, TracingLogger};

pub use forward::Forward;
pub use likelihood::{BatchLikelihood, Sequence};
pub use viterbi::ViterbiPath;

pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Longer sequences are rejected before any scratch is allocated.
    pub max_sequence_length: usize,
    /// Log-probability charged for an infeasible sequence in batch objectives.
    pub penalty_log_p: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH, penalty_log_p: PENALTY_LOGP }
    }
}

static TRACING: TracingLogger = TracingLogger;

/// Logger and limits for a family of inference calls.
#[derive(Clone, Copy)]
pub struct Inference<'l> {
    logger: &'l dyn Logger,
    config: InferenceConfig,
}

impl<'l> Inference<'l> {
    pub fn new(logger: &'l dyn Logger) -> Self {
        Self { logger, config: InferenceConfig::default() }
    }

    pub fn with_config(mut self, config: InferenceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn logger(&self) -> &'l dyn Logger {
        self.logger
    }

    fn check_sequence<M>(&self, model: &M, observations: &[M::Observation]) -> Result<()>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        if observations.is_empty() {
            return Err(HmmError::EmptySequence);
        }
        if observations.len() > self.config.max_sequence_length {
            return Err(HmmError::SequenceTooLong {
                len: observations.len(),
                max: self.config.max_sequence_length,
            });
        }
        model.check_observations(observations)
    }
}

impl Default for Inference<'static> {
    fn default() -> Self {
        Self::new(&TRACING)
    }
}

impl fmt::Debug for Inference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inference").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Transition class for transitions leaving position `t`, checked against
/// the model's class count.
fn class_at<M>(model: &M, observations: &[M::Observation], t: usize) -> Result<usize>
where
    M: HiddenMarkovModel + ?Sized,
{
    let classes = model.n_transition_classes();
    if classes == 1 {
        return Ok(0);
    }
    let class = model.transition_class(observations, t);
    if class < classes {
        Ok(class)
    } else {
        Err(HmmError::InvalidTransitionClass { t, class, classes })
    }
}

/// Zero-filled buffer whose allocation failure is reported instead of
/// aborting the process.
fn scratch<A: Clone>(rows: usize, cols: usize, fill: A) -> Result<Vec<A>> {
    let len = rows.checked_mul(cols).ok_or(HmmError::Allocation { rows, cols })?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| HmmError::Allocation { rows, cols })?;
    data.resize(len, fill);
    Ok(data)
}

fn into_matrix<A>(rows: usize, cols: usize, data: Vec<A>) -> Result<Array2<A>> {
    Array2::from_shape_vec((rows, cols), data).map_err(|_| HmmError::Allocation { rows, cols })
}

fn ln_or_neg_inf(p: f64) -> f64 {
    if p == 0.0 {
        f64::NEG_INFINITY
    } else {
        p.ln()
    }
}

pub fn forward<M>(model: &M, observations: &[M::Observation]) -> Result<Forward>
where
    M: HiddenMarkovModel + ?Sized,
{
    Inference::default().forward(model, observations)
}

pub fn logp<M>(model: &M, observations: &[M::Observation]) -> Result<f64>
where
    M: HiddenMarkovModel + ?Sized,
{
    Inference::default().logp(model, observations)
}

pub fn backward<M>(model: &M, observations: &[M::Observation], scale: &[f64]) -> Result<Array2<f64>>
where
    M: HiddenMarkovModel + ?Sized,
{
    Inference::default().backward(model, observations, scale)
}

pub fn posterior<M>(model: &M, observations: &[M::Observation]) -> Result<Array2<f64>>
where
    M: HiddenMarkovModel + ?Sized,
{
    Inference::default().posterior(model, observations)
}

pub fn viterbi<M>(model: &M, observations: &[M::Observation]) -> Result<ViterbiPath>
where
    M: HiddenMarkovModel + ?Sized,
{
    Inference::default().viterbi(model, observations)
}

pub fn path_log_p<M>(model: &M, observations: &[M::Observation], path: &[usize]) -> Result<f64>
where
    M: HiddenMarkovModel + ?Sized,
{
    Inference::default().path_log_p(model, observations, path)
}
