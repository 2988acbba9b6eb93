use serde::{Deserialize, Serialize};

use super::density::Density;
use super::topology::{Topology, PROB_TOLERANCE};
use super::HiddenMarkovModel;
use crate::error::{HmmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixtureComponent {
    pub density: Density,
    pub weight: f64,
    /// Excluded from re-estimation. Inference ignores it.
    pub fixed: bool,
}

impl MixtureComponent {
    pub fn new(density: Density, weight: f64) -> Self {
        Self { density, weight, fixed: false }
    }
}

/// Model whose states emit real values from a mixture of densities.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousModel {
    topology: Topology,
    max_components: usize,
    mixtures: Vec<Vec<MixtureComponent>>,
}

impl ContinuousModel {
    pub fn new(topology: Topology, max_components: usize, mixtures: Vec<Vec<MixtureComponent>>) -> Result<Self> {
        let model = Self { topology, max_components, mixtures };
        model.validate()?;
        Ok(model)
    }

    pub fn max_components(&self) -> usize {
        self.max_components
    }

    /// # Panics
    ///
    /// If `state` is not a state of the topology.
    pub fn mixture(&self, state: usize) -> &[MixtureComponent] {
        &self.mixtures[state]
    }

    /// Weighted density of a single mixture component. Panics on an unknown
    /// state or component.
    pub fn component_density(&self, state: usize, component: usize, x: f64) -> f64 {
        let c = &self.mixtures[state][component];
        c.weight * c.density.pdf(x)
    }

    fn validate(&self) -> Result<()> {
        if self.mixtures.len() != self.topology.n_states() {
            return Err(HmmError::InvalidModel(format!(
                "{} mixtures for {} states",
                self.mixtures.len(),
                self.topology.n_states()
            )));
        }
        for (state, mixture) in self.mixtures.iter().enumerate() {
            if self.topology.is_silent(state) {
                continue;
            }
            if mixture.is_empty() || mixture.len() > self.max_components {
                return Err(HmmError::InvalidModel(format!(
                    "state {} has {} mixture components, expected 1..={}",
                    state,
                    mixture.len(),
                    self.max_components
                )));
            }
            let mut total = 0.0;
            for component in mixture {
                component.density.validate()?;
                if !(0.0..=1.0).contains(&component.weight) {
                    return Err(HmmError::InvalidModel(format!(
                        "state {} has mixture weight {}",
                        state, component.weight
                    )));
                }
                total += component.weight;
            }
            if (total - 1.0).abs() > PROB_TOLERANCE {
                return Err(HmmError::InvalidModel(format!(
                    "mixture weights of state {} sum to {}",
                    state, total
                )));
            }
        }
        Ok(())
    }
}

impl HiddenMarkovModel for ContinuousModel {
    type Observation = f64;

    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn emission_probability(&self, state: usize, observations: &[f64], t: usize) -> f64 {
        let x = observations[t];
        self.mixtures[state].iter().map(|c| c.weight * c.density.pdf(x)).sum()
    }

    fn check_observations(&self, observations: &[f64]) -> Result<()> {
        match observations.iter().position(|x| !x.is_finite()) {
            Some(t) => Err(HmmError::InvalidObservation { t }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::topology::TopologyBuilder;
    use approx::assert_relative_eq;

    fn one_state(mixture: Vec<MixtureComponent>) -> Result<ContinuousModel> {
        let mut builder = TopologyBuilder::new(1);
        let s = builder.add_state(1.0);
        builder.add_transition(s, s, 1.0);
        ContinuousModel::new(builder.build().unwrap(), 2, vec![mixture])
    }

    #[test]
    fn mixture_density_is_weighted_sum() {
        let a = Density::Normal { mean: 0.0, variance: 1.0 };
        let b = Density::Uniform { min: 0.0, max: 2.0 };
        let model = one_state(vec![MixtureComponent::new(a, 0.3), MixtureComponent::new(b, 0.7)]).unwrap();
        let expected = 0.3 * a.pdf(1.0) + 0.7 * 0.5;
        assert_relative_eq!(model.emission_probability(0, &[1.0], 0), expected, epsilon = 1e-12);
        assert_relative_eq!(
            model.component_density(0, 0, 1.0) + model.component_density(0, 1, 1.0),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn truncated_component_outside_support_contributes_nothing() {
        let d = Density::NormalTruncatedLeft { mean: 0.0, variance: 1.0, bound: 0.0 };
        let model = one_state(vec![MixtureComponent::new(d, 1.0)]).unwrap();
        assert_eq!(model.emission_probability(0, &[-0.5], 0), 0.0);
    }

    #[test]
    fn invalid_mixtures_are_rejected() {
        let d = Density::Normal { mean: 0.0, variance: 1.0 };
        assert!(one_state(vec![MixtureComponent::new(d, 0.5)]).is_err());
        assert!(one_state(vec![]).is_err());
        assert!(one_state(vec![MixtureComponent::new(d, 0.4); 3]).is_err());
        let degenerate = Density::Normal { mean: 0.0, variance: -1.0 };
        assert!(one_state(vec![MixtureComponent::new(degenerate, 1.0)]).is_err());
    }

    #[test]
    fn non_finite_observations_are_rejected() {
        let d = Density::Normal { mean: 0.0, variance: 1.0 };
        let model = one_state(vec![MixtureComponent::new(d, 1.0)]).unwrap();
        assert_eq!(model.check_observations(&[0.0, f64::NAN]), Err(HmmError::InvalidObservation { t: 1 }));
    }
}
