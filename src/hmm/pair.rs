//! Pair model scoring a fixed alignment of two symbol sequences.
//!
//! Each observation is one alignment column. Match states emit a symbol
//! from both sequences, insert states emit from one side against a gap.

use super::topology::{Topology, PROB_TOLERANCE};
use super::HiddenMarkovModel;
use crate::error::{HmmError, Result};

/// One alignment column; `None` is a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignedPair {
    pub x: Option<usize>,
    pub y: Option<usize>,
}

impl AlignedPair {
    pub fn matched(x: usize, y: usize) -> Self {
        Self { x: Some(x), y: Some(y) }
    }

    pub fn insert_x(x: usize) -> Self {
        Self { x: Some(x), y: None }
    }

    pub fn insert_y(y: usize) -> Self {
        Self { x: None, y: Some(y) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairEmission {
    /// Joint table, row-major over `(x, y)`.
    Match(Vec<f64>),
    InsertX(Vec<f64>),
    InsertY(Vec<f64>),
    /// Used for silent states.
    Silent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairModel {
    topology: Topology,
    alphabet_x: usize,
    alphabet_y: usize,
    emissions: Vec<PairEmission>,
}

impl PairModel {
    pub fn new(topology: Topology, alphabet_x: usize, alphabet_y: usize, emissions: Vec<PairEmission>) -> Result<Self> {
        let model = Self { topology, alphabet_x, alphabet_y, emissions };
        model.validate()?;
        Ok(model)
    }

    pub fn alphabet_sizes(&self) -> (usize, usize) {
        (self.alphabet_x, self.alphabet_y)
    }

    pub fn emission(&self, state: usize) -> &PairEmission {
        &self.emissions[state]
    }

    fn validate(&self) -> Result<()> {
        if self.emissions.len() != self.topology.n_states() {
            return Err(HmmError::InvalidModel(format!(
                "{} pair emissions for {} states",
                self.emissions.len(),
                self.topology.n_states()
            )));
        }
        for (state, emission) in self.emissions.iter().enumerate() {
            let (probs, len) = match emission {
                PairEmission::Match(p) => (p, self.alphabet_x * self.alphabet_y),
                PairEmission::InsertX(p) => (p, self.alphabet_x),
                PairEmission::InsertY(p) => (p, self.alphabet_y),
                PairEmission::Silent if self.topology.is_silent(state) => continue,
                PairEmission::Silent => {
                    return Err(HmmError::InvalidModel(format!("emitting state {} has no pair emission", state)))
                }
            };
            let sum: f64 = probs.iter().sum();
            if probs.len() != len
                || probs.iter().any(|p| !p.is_finite() || *p < 0.0)
                || (sum - 1.0).abs() > PROB_TOLERANCE
            {
                return Err(HmmError::InvalidModel(format!("invalid pair emission table for state {}", state)));
            }
        }
        Ok(())
    }
}

impl HiddenMarkovModel for PairModel {
    type Observation = AlignedPair;

    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn emission_probability(&self, state: usize, observations: &[AlignedPair], t: usize) -> f64 {
        let column = observations[t];
        match (&self.emissions[state], column.x, column.y) {
            (PairEmission::Match(p), Some(x), Some(y)) => p[x * self.alphabet_y + y],
            (PairEmission::InsertX(p), Some(x), None) => p[x],
            (PairEmission::InsertY(p), None, Some(y)) => p[y],
            _ => 0.0,
        }
    }

    fn check_observations(&self, observations: &[AlignedPair]) -> Result<()> {
        for (t, column) in observations.iter().enumerate() {
            let (alphabet, symbol) = match (column.x, column.y) {
                (Some(x), _) if x >= self.alphabet_x => (self.alphabet_x, x),
                (_, Some(y)) if y >= self.alphabet_y => (self.alphabet_y, y),
                (None, None) => return Err(HmmError::InvalidObservation { t }),
                _ => continue,
            };
            return Err(HmmError::SymbolOutOfRange { t, symbol, alphabet });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::topology::TopologyBuilder;

    fn model() -> PairModel {
        let mut builder = TopologyBuilder::new(1);
        let m = builder.add_state(1.0);
        let ix = builder.add_state(0.0);
        builder.add_transition(m, m, 0.8).add_transition(m, ix, 0.2).add_transition(ix, m, 1.0);
        let emissions = vec![
            PairEmission::Match(vec![0.4, 0.1, 0.1, 0.4]),
            PairEmission::InsertX(vec![0.5, 0.5]),
        ];
        PairModel::new(builder.build().unwrap(), 2, 2, emissions).unwrap()
    }

    #[test]
    fn emission_depends_on_column_shape() {
        let model = model();
        let columns = [AlignedPair::matched(0, 1), AlignedPair::insert_x(1), AlignedPair::insert_y(0)];
        assert_eq!(model.emission_probability(0, &columns, 0), 0.1);
        assert_eq!(model.emission_probability(1, &columns, 0), 0.0);
        assert_eq!(model.emission_probability(1, &columns, 1), 0.5);
        assert_eq!(model.emission_probability(0, &columns, 2), 0.0);
    }

    #[test]
    fn rejects_bad_columns() {
        let model = model();
        assert_eq!(
            model.check_observations(&[AlignedPair::matched(0, 2)]),
            Err(HmmError::SymbolOutOfRange { t: 0, symbol: 2, alphabet: 2 })
        );
        assert_eq!(
            model.check_observations(&[AlignedPair { x: None, y: None }]),
            Err(HmmError::InvalidObservation { t: 0 })
        );
    }
}
