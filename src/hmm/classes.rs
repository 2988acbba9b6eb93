//! Transition-class selection for switching (non-homogeneous) models.

use std::fmt;
use std::sync::Arc;

use super::topology::Topology;
use super::HiddenMarkovModel;
use crate::error::Result;

/// Chooses the transition matrix used when leaving position `t`.
///
/// Forward, backward and Viterbi each call the selector on their own, so it
/// must be a pure function of its arguments.
pub trait ClassSelector<O>: Send + Sync {
    fn class_of(&self, topology: &Topology, observations: &[O], t: usize) -> usize;
}

impl<O, F> ClassSelector<O> for F
where
    F: Fn(&Topology, &[O], usize) -> usize + Send + Sync,
{
    fn class_of(&self, topology: &Topology, observations: &[O], t: usize) -> usize {
        self(topology, observations, t)
    }
}

/// A model whose active transition class is picked per position by a
/// [`ClassSelector`].
pub struct Switching<M: HiddenMarkovModel> {
    model: M,
    selector: Arc<dyn ClassSelector<M::Observation>>,
}

impl<M: HiddenMarkovModel> Switching<M> {
    pub fn new<S>(model: M, selector: S) -> Self
    where
        S: ClassSelector<M::Observation> + 'static,
    {
        Self { model, selector: Arc::new(selector) }
    }

    pub fn inner(&self) -> &M {
        &self.model
    }
}

impl<M: HiddenMarkovModel + Clone> Clone for Switching<M> {
    fn clone(&self) -> Self {
        Self { model: self.model.clone(), selector: Arc::clone(&self.selector) }
    }
}

impl<M: HiddenMarkovModel + fmt::Debug> fmt::Debug for Switching<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Switching").field("model", &self.model).finish_non_exhaustive()
    }
}

impl<M: HiddenMarkovModel> HiddenMarkovModel for Switching<M> {
    type Observation = M::Observation;

    fn topology(&self) -> &Topology {
        self.model.topology()
    }

    fn emission_probability(&self, state: usize, observations: &[M::Observation], t: usize) -> f64 {
        self.model.emission_probability(state, observations, t)
    }

    fn transition_class(&self, observations: &[M::Observation], t: usize) -> usize {
        self.selector.class_of(self.model.topology(), observations, t)
    }

    fn check_observations(&self, observations: &[M::Observation]) -> Result<()> {
        self.model.check_observations(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::discrete::{DiscreteEmission, DiscreteModel};
    use crate::hmm::topology::TopologyBuilder;

    #[test]
    fn selector_sees_the_sequence() {
        let mut builder = TopologyBuilder::new(2);
        let s = builder.add_state(1.0);
        builder.add_transition(s, s, 1.0);
        let model = DiscreteModel::new(builder.build().unwrap(), 2, vec![DiscreteEmission::new(vec![0.5, 0.5])])
            .unwrap();
        let switching = Switching::new(model, |_: &Topology, obs: &[usize], t: usize| obs[t]);
        assert_eq!(switching.transition_class(&[0, 1, 0], 1), 1);
        assert_eq!(switching.transition_class(&[0, 1, 0], 2), 0);
        assert_eq!(switching.n_transition_classes(), 2);
    }
}
