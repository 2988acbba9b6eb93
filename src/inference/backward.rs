use ndarray::Array2;

use super::forward::entry_probabilities;
use super::{class_at, into_matrix, scratch, Inference};
use crate::error::{HmmError, Result};
use crate::hmm::HiddenMarkovModel;

impl<'l> Inference<'l> {
    /// Scaled backward variables, using the scale factors of a successful
    /// forward pass over the same sequence.
    ///
    /// Row `t` of a silent state holds the probability of the remaining
    /// emissions given that the state is passed through between `t` and
    /// `t + 1`.
    pub fn backward<M>(&self, model: &M, observations: &[M::Observation], scale: &[f64]) -> Result<Array2<f64>>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        self.check_sequence(model, observations)?;
        let len = observations.len();
        if scale.len() != len {
            return Err(HmmError::ScaleMismatch { expected: len, actual: scale.len() });
        }
        if let Some(t) = scale.iter().position(|&c| !c.is_finite() || c <= f64::MIN_POSITIVE) {
            self.logger.warn(format_args!("backward: scale[{}] = {} is not a forward scale factor", t, scale[t]));
            return Err(HmmError::InvalidScale { t });
        }

        let topology = model.topology();
        let n = topology.n_states();
        let mut beta = scratch(len, n, 0.0)?;
        for (i, b) in beta[(len - 1) * n..].iter_mut().enumerate() {
            if !topology.is_silent(i) {
                *b = 1.0;
            }
        }

        let mut weighted = vec![0.0; n];
        for t in (0..len - 1).rev() {
            let (head, tail) = beta.split_at_mut((t + 1) * n);
            let row = &mut head[t * n..];
            let next = &tail[..n];

            let inv = 1.0 / scale[t + 1];
            for (j, w) in weighted.iter_mut().enumerate() {
                *w = if topology.is_silent(j) || next[j] == 0.0 {
                    0.0
                } else {
                    model.emission_probability(j, observations, t + 1) * next[j] * inv
                };
            }

            let class = class_at(model, observations, t)?;
            for &s in topology.silent_order().iter().rev() {
                let mass: f64 = topology
                    .successors(s)
                    .map(|(j, probs)| probs[class] * if topology.is_silent(j) { row[j] } else { weighted[j] })
                    .sum();
                row[s] = mass;
            }
            for i in 0..n {
                if topology.is_silent(i) {
                    continue;
                }
                let mass: f64 = topology
                    .successors(i)
                    .map(|(j, probs)| probs[class] * if topology.is_silent(j) { row[j] } else { weighted[j] })
                    .sum();
                row[i] = mass;
            }
        }

        into_matrix(len, n, beta)
    }

    /// Log-likelihood recovered from the backward variables; agrees with the
    /// forward `log_p` up to rounding.
    pub fn backward_termination<M>(
        &self,
        model: &M,
        observations: &[M::Observation],
        beta: &Array2<f64>,
        scale: &[f64],
    ) -> Result<f64>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        self.check_sequence(model, observations)?;
        let topology = model.topology();
        if scale.len() != observations.len() {
            return Err(HmmError::ScaleMismatch { expected: observations.len(), actual: scale.len() });
        }
        if beta.dim() != (observations.len(), topology.n_states()) {
            return Err(HmmError::ScaleMismatch { expected: observations.len(), actual: beta.nrows() });
        }

        let entry = entry_probabilities(topology);
        let sum: f64 = (0..topology.n_states())
            .filter(|&i| !topology.is_silent(i) && entry[i] > 0.0)
            .map(|i| entry[i] * model.emission_probability(i, observations, 0) * beta[[0, i]])
            .sum();
        if sum <= f64::MIN_POSITIVE {
            return Err(HmmError::Underflow { t: 0 });
        }
        Ok(sum.ln() + scale[1..].iter().map(|c| c.ln()).sum::<f64>())
    }

    /// State posteriors `P(q_t = i | O)`. Rows sum to one over emitting
    /// states; silent columns hold the probability of passing through the
    /// state right after `t`.
    pub fn posterior<M>(&self, model: &M, observations: &[M::Observation]) -> Result<Array2<f64>>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        let forward = self.forward(model, observations)?;
        let scale = forward.scale.to_vec();
        let beta = self.backward(model, observations, &scale)?;
        let topology = model.topology();

        let mut gamma = forward.alpha * &beta;
        for (t, mut row) in gamma.outer_iter_mut().enumerate() {
            let norm: f64 = row.iter().enumerate().filter(|&(i, _)| !topology.is_silent(i)).map(|(_, g)| g).sum();
            if norm <= 0.0 || !norm.is_finite() {
                return Err(HmmError::Underflow { t });
            }
            row /= norm;
        }
        Ok(gamma)
    }
}
