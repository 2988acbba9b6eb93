use ndarray::ArrayView1;
use ndarray_stats::QuantileExt;
use serde::Serialize;

use super::{class_at, into_matrix, ln_or_neg_inf, scratch, Inference};
use crate::error::{HmmError, Result};
use crate::hmm::HiddenMarkovModel;

/// Most likely state path. With silent states the path is longer than the
/// sequence: silent states appear between the emitting states they link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViterbiPath {
    pub states: Vec<usize>,
    pub log_p: f64,
}

/// Best finite `delta[i] + ln a_ij` over the predecessors of `j`, first
/// maximum in adjacency order.
fn best_predecessor<'a, I>(delta: &[f64], predecessors: I, class: usize) -> Option<(usize, f64)>
where
    I: Iterator<Item = (usize, &'a [f64])>,
{
    let mut best: Option<(usize, f64)> = None;
    for (i, probs) in predecessors {
        let value = delta[i] + ln_or_neg_inf(probs[class]);
        if !value.is_finite() {
            continue;
        }
        match best {
            Some((_, max)) if value <= max => {}
            _ => best = Some((i, value)),
        }
    }
    best
}

impl<'l> Inference<'l> {
    pub fn viterbi<M>(&self, model: &M, observations: &[M::Observation]) -> Result<ViterbiPath>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        self.check_sequence(model, observations)?;
        let topology = model.topology();
        let len = observations.len();
        let n = topology.n_states();

        let mut log_b = scratch(n, len, f64::NEG_INFINITY)?;
        for j in (0..n).filter(|&j| !topology.is_silent(j)) {
            for (t, b) in log_b[j * len..(j + 1) * len].iter_mut().enumerate() {
                *b = ln_or_neg_inf(model.emission_probability(j, observations, t));
            }
        }
        let log_b = into_matrix(n, len, log_b)?;

        // psi row 0 covers silent states visited before the first emission,
        // row t + 1 covers position t
        let mut psi: Vec<Option<usize>> = scratch(len + 1, n, None)?;

        let silent_predecessors = |j: usize| topology.predecessors(j).filter(move |&(i, _)| topology.is_silent(i));
        let mut entry: Vec<f64> = topology.states().iter().map(|s| ln_or_neg_inf(s.pi)).collect();
        for &s in topology.silent_order() {
            if let Some((i, value)) = best_predecessor(&entry, silent_predecessors(s), 0) {
                if value > entry[s] {
                    entry[s] = value;
                    psi[s] = Some(i);
                }
            }
        }

        let mut prev = vec![f64::NEG_INFINITY; n];
        let mut delta = vec![f64::NEG_INFINITY; n];
        for t in 0..len {
            let row = (t + 1) * n;
            if t == 0 {
                for j in (0..n).filter(|&j| !topology.is_silent(j)) {
                    let mut start = entry[j];
                    if let Some((i, value)) = best_predecessor(&entry, silent_predecessors(j), 0) {
                        if value > start {
                            start = value;
                            psi[row + j] = Some(i);
                        }
                    }
                    delta[j] = start + log_b[[j, 0]];
                }
            } else {
                let class = class_at(model, observations, t - 1)?;
                for j in 0..n {
                    delta[j] = f64::NEG_INFINITY;
                    if topology.is_silent(j) {
                        continue;
                    }
                    if let Some((i, value)) = best_predecessor(&prev, topology.predecessors(j), class) {
                        delta[j] = value + log_b[[j, t]];
                        psi[row + j] = Some(i);
                    }
                }
            }

            if t + 1 < len && topology.has_silent_states() {
                let class = class_at(model, observations, t)?;
                for &s in topology.silent_order() {
                    delta[s] = f64::NEG_INFINITY;
                    if let Some((i, value)) = best_predecessor(&delta, topology.predecessors(s), class) {
                        delta[s] = value;
                        psi[row + s] = Some(i);
                    }
                }
            }
            std::mem::swap(&mut prev, &mut delta);
        }

        let last = ArrayView1::from(&prev[..]);
        let best = last.argmax().map_err(|_| HmmError::NonFinite { t: len - 1 })?;
        let log_p = prev[best];
        if !log_p.is_finite() {
            self.logger.debug(format_args!("viterbi: no path of positive probability for {} observations", len));
            return Err(HmmError::NoPath);
        }

        let mut states = vec![best];
        let mut row = len;
        let mut state = best;
        while let Some(previous) = psi[row * n + state] {
            if !topology.is_silent(state) {
                row -= 1;
            }
            state = previous;
            states.push(state);
        }
        states.reverse();

        Ok(ViterbiPath { states, log_p })
    }

    /// Log-probability of emitting `observations` along `path`; `-inf` when
    /// the path uses an impossible transition or emission.
    pub fn path_log_p<M>(&self, model: &M, observations: &[M::Observation], path: &[usize]) -> Result<f64>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        self.check_sequence(model, observations)?;
        let topology = model.topology();
        if let Some(&state) = path.iter().find(|&&s| s >= topology.n_states()) {
            return Err(HmmError::InvalidPath(format!("state {} does not exist", state)));
        }
        let emitting = path.iter().filter(|&&s| !topology.is_silent(s)).count();
        if emitting != observations.len() {
            return Err(HmmError::InvalidPath(format!(
                "path emits {} observations, sequence has {}",
                emitting,
                observations.len()
            )));
        }
        match path.last() {
            Some(&last) if !topology.is_silent(last) => {}
            _ => return Err(HmmError::InvalidPath("path must end in an emitting state".into())),
        }

        let mut log_p = ln_or_neg_inf(topology.pi(path[0]));
        let mut emitted = 0;
        for (k, &state) in path.iter().enumerate() {
            if k > 0 {
                let class = if emitted == 0 { 0 } else { class_at(model, observations, emitted - 1)? };
                log_p += ln_or_neg_inf(model.transition_probability(path[k - 1], state, class));
            }
            if !topology.is_silent(state) {
                log_p += ln_or_neg_inf(model.emission_probability(state, observations, emitted));
                emitted += 1;
            }
        }
        Ok(log_p)
    }
}
