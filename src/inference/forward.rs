use ndarray::{Array1, Array2};
use serde::Serialize;

use super::{class_at, into_matrix, scratch, Inference};
use crate::error::{HmmError, Result};
use crate::hmm::topology::Topology;
use crate::hmm::HiddenMarkovModel;

/// Scaled forward variables: row `t` of `alpha` sums to one and `scale[t]`
/// is the factor it was divided by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forward {
    pub alpha: Array2<f64>,
    pub scale: Array1<f64>,
    pub log_p: f64,
}

/// Weight with which each state starts emitting at `t = 0`: its initial
/// probability plus the mass reaching it through silent states.
pub(crate) fn entry_probabilities(topology: &Topology) -> Vec<f64> {
    let mut entry: Vec<f64> = topology.states().iter().map(|s| s.pi).collect();
    for &s in topology.silent_order() {
        let mass = entry[s];
        if mass == 0.0 {
            continue;
        }
        for (target, probs) in topology.successors(s) {
            entry[target] += mass * probs[0];
        }
    }
    entry
}

/// Mass flowing into silent states after position `t` has been emitted.
fn silent_pass<M>(model: &M, observations: &[M::Observation], t: usize, row: &mut [f64]) -> Result<()>
where
    M: HiddenMarkovModel + ?Sized,
{
    let topology = model.topology();
    if !topology.has_silent_states() || t + 1 == observations.len() {
        return Ok(());
    }
    let class = class_at(model, observations, t)?;
    for &s in topology.silent_order() {
        let mass: f64 = topology.predecessors(s).map(|(i, probs)| row[i] * probs[class]).sum();
        row[s] = mass;
    }
    Ok(())
}

fn init_row<M>(model: &M, observations: &[M::Observation], entry: &[f64], row: &mut [f64]) -> Result<()>
where
    M: HiddenMarkovModel + ?Sized,
{
    let topology = model.topology();
    for (i, alpha) in row.iter_mut().enumerate() {
        *alpha = if topology.is_silent(i) || entry[i] == 0.0 {
            0.0
        } else {
            entry[i] * model.emission_probability(i, observations, 0)
        };
    }
    silent_pass(model, observations, 0, row)
}

fn step_row<M>(model: &M, observations: &[M::Observation], t: usize, prev: &[f64], row: &mut [f64]) -> Result<()>
where
    M: HiddenMarkovModel + ?Sized,
{
    let topology = model.topology();
    let class = class_at(model, observations, t - 1)?;
    for (j, alpha) in row.iter_mut().enumerate() {
        if topology.is_silent(j) {
            *alpha = 0.0;
            continue;
        }
        let mass: f64 = topology.predecessors(j).map(|(i, probs)| prev[i] * probs[class]).sum();
        // b_j(O_t) multiplies outside the sum
        *alpha = if mass == 0.0 { 0.0 } else { mass * model.emission_probability(j, observations, t) };
    }
    silent_pass(model, observations, t, row)
}

impl<'l> Inference<'l> {
    /// Divides `row` by its total mass and returns the log of that mass.
    fn rescale(&self, t: usize, row: &mut [f64]) -> Result<(f64, f64)> {
        let scale: f64 = row.iter().sum();
        let error = if !scale.is_finite() {
            Some(HmmError::NonFinite { t })
        } else if scale <= f64::MIN_POSITIVE {
            Some(HmmError::Underflow { t })
        } else {
            None
        };
        if let Some(error) = error {
            self.logger.debug(format_args!("forward: {}", error));
            return Err(error);
        }
        let c = 1.0 / scale;
        for alpha in row.iter_mut() {
            *alpha *= c;
        }
        Ok((scale, -c.ln()))
    }

    pub fn forward<M>(&self, model: &M, observations: &[M::Observation]) -> Result<Forward>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        self.check_sequence(model, observations)?;
        let len = observations.len();
        let n = model.topology().n_states();
        let entry = entry_probabilities(model.topology());

        let mut alpha = scratch(len, n, 0.0)?;
        let mut scale = scratch(1, len, 0.0)?;
        let mut log_p = 0.0;
        for t in 0..len {
            let (done, rest) = alpha.split_at_mut(t * n);
            let row = &mut rest[..n];
            if t == 0 {
                init_row(model, observations, &entry, row)?;
            } else {
                step_row(model, observations, t, &done[(t - 1) * n..], row)?;
            }
            let (c, log_c) = self.rescale(t, row)?;
            scale[t] = c;
            log_p += log_c;
        }

        Ok(Forward { alpha: into_matrix(len, n, alpha)?, scale: Array1::from(scale), log_p })
    }

    /// Log-likelihood only; keeps two rows of alpha instead of `T`.
    pub fn logp<M>(&self, model: &M, observations: &[M::Observation]) -> Result<f64>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        self.check_sequence(model, observations)?;
        let n = model.topology().n_states();
        let entry = entry_probabilities(model.topology());

        let mut prev = vec![0.0; n];
        let mut row = vec![0.0; n];
        let mut log_p = 0.0;
        for t in 0..observations.len() {
            if t == 0 {
                init_row(model, observations, &entry, &mut row)?;
            } else {
                step_row(model, observations, t, &prev, &mut row)?;
            }
            log_p += self.rescale(t, &mut row)?.1;
            std::mem::swap(&mut prev, &mut row);
        }
        Ok(log_p)
    }
}
