use super::topology::Topology;
use super::HiddenMarkovModel;
use crate::error::{HmmError, Result};

/// Restricts a model to states whose label agrees with a per-position label
/// sequence. Unlabeled states are unrestricted.
#[derive(Debug)]
pub struct Labeled<'a, M: ?Sized> {
    model: &'a M,
    labels: &'a [usize],
}

impl<'a, M: HiddenMarkovModel + ?Sized> Labeled<'a, M> {
    pub fn new(model: &'a M, labels: &'a [usize]) -> Self {
        Self { model, labels }
    }
}

impl<'a, M: HiddenMarkovModel + ?Sized> HiddenMarkovModel for Labeled<'a, M> {
    type Observation = M::Observation;

    fn topology(&self) -> &Topology {
        self.model.topology()
    }

    fn emission_probability(&self, state: usize, observations: &[M::Observation], t: usize) -> f64 {
        match self.model.topology().state(state).label {
            Some(label) if label != self.labels[t] => 0.0,
            _ => self.model.emission_probability(state, observations, t),
        }
    }

    fn transition_class(&self, observations: &[M::Observation], t: usize) -> usize {
        self.model.transition_class(observations, t)
    }

    fn check_observations(&self, observations: &[M::Observation]) -> Result<()> {
        if self.labels.len() != observations.len() {
            return Err(HmmError::LabelMismatch { expected: observations.len(), actual: self.labels.len() });
        }
        self.model.check_observations(observations)
    }
}
