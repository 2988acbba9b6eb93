//! Discrete (symbolic) emissions: plain, higher order, tied and mixed with
//! background distributions.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::topology::{Topology, TopologyBuilder, PROB_TOLERANCE};
use super::HiddenMarkovModel;
use crate::error::{HmmError, Result};

/// What a state of order `k` emits at positions `t < k`, where fewer than
/// `k` symbols of history exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryPolicy {
    /// The state cannot emit until its full history exists.
    Zero,
    /// Missing history is filled with the given symbol.
    Pad(usize),
    /// Uniform average over every completion of the missing history.
    Marginal,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        HistoryPolicy::Zero
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundMix {
    pub id: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub order: usize,
    pub probs: Vec<f64>,
}

/// Emission table of one state, indexed by `(history..., symbol)` with the
/// oldest history symbol as the most significant base-M digit.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteEmission {
    pub probs: Vec<f64>,
    pub order: usize,
    pub tied_to: Option<usize>,
    pub background: Option<BackgroundMix>,
}

impl DiscreteEmission {
    pub fn new(probs: Vec<f64>) -> Self {
        Self::higher_order(0, probs)
    }

    pub fn higher_order(order: usize, probs: Vec<f64>) -> Self {
        Self { probs, order, tied_to: None, background: None }
    }

    /// Placeholder for silent states and for states that only borrow their
    /// tie-group leader's table.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn tied_to(mut self, leader: usize) -> Self {
        self.tied_to = Some(leader);
        self
    }

    pub fn with_background(mut self, id: usize, weight: f64) -> Self {
        self.background = Some(BackgroundMix { id, weight });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteModel {
    topology: Topology,
    alphabet_size: usize,
    emissions: Vec<DiscreteEmission>,
    backgrounds: Vec<Background>,
    history: HistoryPolicy,
}

impl DiscreteModel {
    pub fn new(topology: Topology, alphabet_size: usize, emissions: Vec<DiscreteEmission>) -> Result<Self> {
        Self::with_backgrounds(topology, alphabet_size, emissions, Vec::new())
    }

    pub fn with_backgrounds(
        topology: Topology,
        alphabet_size: usize,
        emissions: Vec<DiscreteEmission>,
        backgrounds: Vec<Background>,
    ) -> Result<Self> {
        let model = Self { topology, alphabet_size, emissions, backgrounds, history: HistoryPolicy::default() };
        model.validate()?;
        Ok(model)
    }

    pub fn with_history_policy(mut self, history: HistoryPolicy) -> Result<Self> {
        if let HistoryPolicy::Pad(symbol) = history {
            if symbol >= self.alphabet_size {
                return Err(HmmError::InvalidModel(format!(
                    "padding symbol {} is outside the alphabet of size {}",
                    symbol, self.alphabet_size
                )));
            }
        }
        self.history = history;
        Ok(self)
    }

    /// Homogeneous first-order model from dense matrices; zero entries of
    /// `a` produce no edge.
    pub fn from_dense(pi: &Array1<f64>, a: &Array2<f64>, b: &Array2<f64>) -> Result<Self> {
        let nstates = pi.len();
        if a.dim() != (nstates, nstates) || b.nrows() != nstates {
            return Err(HmmError::InvalidModel(format!(
                "inconsistent shapes: pi {}, A {:?}, b {:?}",
                nstates,
                a.dim(),
                b.dim()
            )));
        }
        let mut builder = TopologyBuilder::new(1);
        for &p in pi {
            builder.add_state(p);
        }
        for ((from, to), &p) in a.indexed_iter() {
            if p != 0.0 {
                builder.add_transition(from, to, p);
            }
        }
        let emissions = b.outer_iter().map(|row| DiscreteEmission::new(row.to_vec())).collect();
        Self::new(builder.build()?, b.ncols(), emissions)
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    /// # Panics
    ///
    /// If `state` is not a state of the topology.
    pub fn emission(&self, state: usize) -> &DiscreteEmission {
        &self.emissions[state]
    }

    pub fn backgrounds(&self) -> &[Background] {
        &self.backgrounds
    }

    pub fn history_policy(&self) -> HistoryPolicy {
        self.history
    }

    pub fn max_order(&self) -> usize {
        self.emissions.iter().map(|e| e.order).max().unwrap_or(0)
    }

    fn table_len(&self, order: usize) -> Result<usize> {
        (order as u32)
            .checked_add(1)
            .and_then(|exp| self.alphabet_size.checked_pow(exp))
            .ok_or_else(|| HmmError::InvalidModel(format!("emission order {} is too large", order)))
    }

    fn check_table(&self, what: &str, probs: &[f64], order: usize) -> Result<()> {
        let len = self.table_len(order)?;
        if probs.len() != len {
            return Err(HmmError::InvalidModel(format!(
                "{} has {} emission entries, expected {}",
                what,
                probs.len(),
                len
            )));
        }
        for (history, row) in probs.chunks(self.alphabet_size).enumerate() {
            if row.iter().any(|p| !p.is_finite() || *p < 0.0 || *p > 1.0) {
                return Err(HmmError::InvalidModel(format!("{} has an invalid emission probability", what)));
            }
            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > PROB_TOLERANCE {
                return Err(HmmError::InvalidModel(format!(
                    "{} emissions for history {} sum to {}",
                    what, history, sum
                )));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.alphabet_size == 0 {
            return Err(HmmError::InvalidModel("alphabet is empty".into()));
        }
        let nstates = self.topology.n_states();
        if self.emissions.len() != nstates {
            return Err(HmmError::InvalidModel(format!(
                "{} emission tables for {} states",
                self.emissions.len(),
                nstates
            )));
        }
        for (i, background) in self.backgrounds.iter().enumerate() {
            self.check_table(&format!("background {}", i), &background.probs, background.order)?;
        }

        for (state, emission) in self.emissions.iter().enumerate() {
            if self.topology.is_silent(state) {
                continue;
            }
            let table = match emission.tied_to {
                Some(leader) => {
                    let leader_emission = self.emissions.get(leader).ok_or_else(|| {
                        HmmError::InvalidModel(format!("state {} is tied to unknown state {}", state, leader))
                    })?;
                    if leader_emission.tied_to.map_or(false, |l| l != leader) || self.topology.is_silent(leader) {
                        return Err(HmmError::InvalidModel(format!(
                            "state {} is not tied to a tie-group leader",
                            state
                        )));
                    }
                    leader_emission
                }
                None => emission,
            };
            // a leader (untied or tied to itself) owns the table followers read
            let leads = emission.tied_to.map_or(true, |leader| leader == state);
            if leads || !emission.probs.is_empty() {
                self.check_table(&format!("state {}", state), &emission.probs, emission.order)?;
            }

            if let Some(mix) = emission.background {
                let background = self.backgrounds.get(mix.id).ok_or_else(|| {
                    HmmError::InvalidModel(format!("state {} uses unknown background {}", state, mix.id))
                })?;
                if background.order != table.order {
                    return Err(HmmError::InvalidModel(format!(
                        "background {} has order {}, state {} has order {}",
                        mix.id, background.order, state, table.order
                    )));
                }
                if !(0.0..=1.0).contains(&mix.weight) {
                    return Err(HmmError::InvalidModel(format!(
                        "background weight {} of state {}",
                        mix.weight, state
                    )));
                }
            }
        }
        Ok(())
    }

    fn table_probability(&self, probs: &[f64], order: usize, observations: &[usize], t: usize) -> f64 {
        let m = self.alphabet_size;
        let symbol = observations[t];
        let available = t.min(order);
        let missing = order - available;

        let known = observations[t - available..t].iter().fold(0, |idx, &h| idx * m + h);
        if missing == 0 {
            return probs[known * m + symbol];
        }

        let span = m.pow(available as u32);
        let lookup = |prefix: usize| probs[(prefix * span + known) * m + symbol];
        match self.history {
            HistoryPolicy::Zero => 0.0,
            HistoryPolicy::Pad(pad) => lookup((0..missing).fold(0, |idx, _| idx * m + pad)),
            HistoryPolicy::Marginal => {
                let completions = m.pow(missing as u32);
                (0..completions).map(lookup).sum::<f64>() / completions as f64
            }
        }
    }
}

impl HiddenMarkovModel for DiscreteModel {
    type Observation = usize;

    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn emission_probability(&self, state: usize, observations: &[usize], t: usize) -> f64 {
        let own = &self.emissions[state];
        let table = own.tied_to.map_or(own, |leader| &self.emissions[leader]);
        let p = self.table_probability(&table.probs, table.order, observations, t);
        match own.background {
            None => p,
            Some(mix) => {
                let background = &self.backgrounds[mix.id];
                let q = self.table_probability(&background.probs, background.order, observations, t);
                (1.0 - mix.weight) * p + mix.weight * q
            }
        }
    }

    fn check_observations(&self, observations: &[usize]) -> Result<()> {
        match observations.iter().position(|&o| o >= self.alphabet_size) {
            Some(t) => Err(HmmError::SymbolOutOfRange {
                t,
                symbol: observations[t],
                alphabet: self.alphabet_size,
            }),
            None => Ok(()),
        }
    }
}
