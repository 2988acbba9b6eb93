//! Model variants and the capability interface the inference engines are
//! written against.

pub mod classes;
pub mod continuous;
pub mod density;
pub mod discrete;
pub mod labeled;
pub mod pair;
pub mod topology;

use ndarray::Array2;

use crate::error::{HmmError, Result};
use crate::inference::{Forward, Inference, ViterbiPath};

use classes::Switching;
use continuous::ContinuousModel;
use discrete::DiscreteModel;
use pair::{AlignedPair, PairModel};
use topology::Topology;

/// What Forward, Backward and Viterbi need from a model.
pub trait HiddenMarkovModel {
    type Observation;

    fn topology(&self) -> &Topology;

    /// Probability (or density) that `state` emits `observations[t]`. Earlier
    /// observations are available as history.
    fn emission_probability(&self, state: usize, observations: &[Self::Observation], t: usize) -> f64;

    /// Transition class used when leaving position `t`.
    fn transition_class(&self, _observations: &[Self::Observation], _t: usize) -> usize {
        0
    }

    fn check_observations(&self, _observations: &[Self::Observation]) -> Result<()> {
        Ok(())
    }

    fn n_transition_classes(&self) -> usize {
        self.topology().n_classes()
    }

    fn transition_probability(&self, from: usize, to: usize, class: usize) -> f64 {
        self.topology().transition_probability(from, to, class)
    }
}

/// Borrowed observation sequence of any supported kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observations<'a> {
    Symbols(&'a [usize]),
    Values(&'a [f64]),
    Pairs(&'a [AlignedPair]),
}

impl<'a> Observations<'a> {
    pub fn len(&self) -> usize {
        match self {
            Observations::Symbols(o) => o.len(),
            Observations::Values(o) => o.len(),
            Observations::Pairs(o) => o.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Observations::Symbols(_) => "symbol",
            Observations::Values(_) => "real-valued",
            Observations::Pairs(_) => "aligned pair",
        }
    }
}

impl<'a> From<&'a [usize]> for Observations<'a> {
    fn from(o: &'a [usize]) -> Self {
        Observations::Symbols(o)
    }
}

impl<'a> From<&'a [f64]> for Observations<'a> {
    fn from(o: &'a [f64]) -> Self {
        Observations::Values(o)
    }
}

impl<'a> From<&'a [AlignedPair]> for Observations<'a> {
    fn from(o: &'a [AlignedPair]) -> Self {
        Observations::Pairs(o)
    }
}

/// Closed set of model variants.
#[derive(Debug, Clone)]
pub enum Model {
    Discrete(DiscreteModel),
    DiscreteWithClasses(Switching<DiscreteModel>),
    Continuous(ContinuousModel),
    ContinuousWithClasses(Switching<ContinuousModel>),
    Pair(PairModel),
}

macro_rules! dispatch {
    ($model:expr, $observations:expr, |$m:ident, $o:ident| $body:expr) => {
        match ($model, $observations) {
            (Model::Discrete($m), Observations::Symbols($o)) => $body,
            (Model::DiscreteWithClasses($m), Observations::Symbols($o)) => $body,
            (Model::Continuous($m), Observations::Values($o)) => $body,
            (Model::ContinuousWithClasses($m), Observations::Values($o)) => $body,
            (Model::Pair($m), Observations::Pairs($o)) => $body,
            (model, observations) => Err(HmmError::SequenceKind { model: model.kind(), sequence: observations.kind() }),
        }
    };
}

impl Model {
    pub fn kind(&self) -> &'static str {
        match self {
            Model::Discrete(_) => "discrete",
            Model::DiscreteWithClasses(_) => "switching discrete",
            Model::Continuous(_) => "continuous",
            Model::ContinuousWithClasses(_) => "switching continuous",
            Model::Pair(_) => "pair",
        }
    }

    pub fn topology(&self) -> &Topology {
        match self {
            Model::Discrete(m) => m.topology(),
            Model::DiscreteWithClasses(m) => m.topology(),
            Model::Continuous(m) => m.topology(),
            Model::ContinuousWithClasses(m) => m.topology(),
            Model::Pair(m) => m.topology(),
        }
    }

    pub fn n_states(&self) -> usize {
        self.topology().n_states()
    }

    pub fn n_transition_classes(&self) -> usize {
        self.topology().n_classes()
    }

    pub fn transition_probability(&self, from: usize, to: usize, class: usize) -> f64 {
        self.topology().transition_probability(from, to, class)
    }

    pub fn emission_probability(&self, state: usize, observations: Observations<'_>, t: usize) -> Result<f64> {
        if state >= self.n_states() {
            return Err(HmmError::InvalidPath(format!("state {} does not exist", state)));
        }
        if t >= observations.len() {
            return Err(HmmError::InvalidObservation { t });
        }
        let silent = self.topology().is_silent(state);
        dispatch!(self, observations, |m, o| {
            m.check_observations(o)?;
            Ok(if silent { 0.0 } else { m.emission_probability(state, o, t) })
        })
    }

    pub fn forward(&self, inference: &Inference<'_>, observations: Observations<'_>) -> Result<Forward> {
        dispatch!(self, observations, |m, o| inference.forward(m, o))
    }

    pub fn logp(&self, inference: &Inference<'_>, observations: Observations<'_>) -> Result<f64> {
        dispatch!(self, observations, |m, o| inference.logp(m, o))
    }

    pub fn backward(
        &self,
        inference: &Inference<'_>,
        observations: Observations<'_>,
        scale: &[f64],
    ) -> Result<Array2<f64>> {
        dispatch!(self, observations, |m, o| inference.backward(m, o, scale))
    }

    pub fn posterior(&self, inference: &Inference<'_>, observations: Observations<'_>) -> Result<Array2<f64>> {
        dispatch!(self, observations, |m, o| inference.posterior(m, o))
    }

    pub fn viterbi(&self, inference: &Inference<'_>, observations: Observations<'_>) -> Result<ViterbiPath> {
        dispatch!(self, observations, |m, o| inference.viterbi(m, o))
    }

    pub fn path_log_p(&self, inference: &Inference<'_>, observations: Observations<'_>, path: &[usize]) -> Result<f64> {
        dispatch!(self, observations, |m, o| inference.path_log_p(m, o, path))
    }
}

impl From<DiscreteModel> for Model {
    fn from(m: DiscreteModel) -> Self {
        Model::Discrete(m)
    }
}

impl From<ContinuousModel> for Model {
    fn from(m: ContinuousModel) -> Self {
        Model::Continuous(m)
    }
}

impl From<PairModel> for Model {
    fn from(m: PairModel) -> Self {
        Model::Pair(m)
    }
}

impl From<Switching<DiscreteModel>> for Model {
    fn from(m: Switching<DiscreteModel>) -> Self {
        Model::DiscreteWithClasses(m)
    }
}

impl From<Switching<ContinuousModel>> for Model {
    fn from(m: Switching<ContinuousModel>) -> Self {
        Model::ContinuousWithClasses(m)
    }
}
