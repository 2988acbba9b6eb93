//! Sparse state graph shared by every model variant.
//!
//! Transitions are owned by their source state. Each state also keeps a list
//! of incoming edges, but those are `(source, slot)` references into the
//! source's outgoing list, never copies of the probabilities.

use crate::error::{HmmError, Result};

/// Absolute tolerance used when checking that probabilities sum to one.
pub const PROB_TOLERANCE: f64 = 1e-6;

/// Outgoing edge with one probability per transition class.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub target: usize,
    pub probs: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InEdge {
    source: usize,
    slot: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub pi: f64,
    /// Excluded from re-estimation. Inference ignores it.
    pub fix: bool,
    pub silent: bool,
    pub label: Option<usize>,
    out_edges: Vec<Transition>,
    in_edges: Vec<InEdge>,
}

impl State {
    fn new(pi: f64, silent: bool) -> Self {
        Self { pi, fix: false, silent, label: None, out_edges: Vec::new(), in_edges: Vec::new() }
    }

    pub fn out_degree(&self) -> usize {
        self.out_edges.len()
    }

    pub fn in_degree(&self) -> usize {
        self.in_edges.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    states: Vec<State>,
    n_classes: usize,
    prior: Option<f64>,
    silent_order: Vec<usize>,
}

impl Topology {
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn prior(&self) -> Option<f64> {
        self.prior
    }

    /// # Panics
    ///
    /// If `state >= n_states()`, as do `pi` and `is_silent`. Use `get` for a
    /// checked lookup.
    pub fn state(&self, state: usize) -> &State {
        &self.states[state]
    }

    pub fn get(&self, state: usize) -> Option<&State> {
        self.states.get(state)
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn pi(&self, state: usize) -> f64 {
        self.states[state].pi
    }

    pub fn is_silent(&self, state: usize) -> bool {
        self.states[state].silent
    }

    pub fn has_silent_states(&self) -> bool {
        !self.silent_order.is_empty()
    }

    /// Silent states ordered so that every silent predecessor of a silent
    /// state comes before it.
    pub fn silent_order(&self) -> &[usize] {
        &self.silent_order
    }

    /// `(target, per-class probabilities)` in adjacency order.
    pub fn successors(&self, state: usize) -> impl Iterator<Item = (usize, &[f64])> + '_ {
        self.states[state].out_edges.iter().map(|edge| (edge.target, edge.probs.as_slice()))
    }

    /// `(source, per-class probabilities)` in adjacency order.
    pub fn predecessors(&self, state: usize) -> impl Iterator<Item = (usize, &[f64])> + '_ {
        self.states[state].in_edges.iter().map(move |edge| {
            let probs = &self.states[edge.source].out_edges[edge.slot].probs;
            (edge.source, probs.as_slice())
        })
    }

    pub fn transition_probability(&self, from: usize, to: usize, class: usize) -> f64 {
        self.states[from]
            .out_edges
            .iter()
            .find(|edge| edge.target == to)
            .and_then(|edge| edge.probs.get(class).copied())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    n_classes: usize,
    prior: Option<f64>,
    states: Vec<State>,
    errors: Vec<String>,
}

impl TopologyBuilder {
    pub fn new(n_classes: usize) -> Self {
        Self { n_classes, prior: None, states: Vec::new(), errors: Vec::new() }
    }

    pub fn prior(&mut self, prior: f64) -> &mut Self {
        self.prior = Some(prior);
        self
    }

    pub fn add_state(&mut self, pi: f64) -> usize {
        self.states.push(State::new(pi, false));
        self.states.len() - 1
    }

    pub fn add_silent_state(&mut self, pi: f64) -> usize {
        self.states.push(State::new(pi, true));
        self.states.len() - 1
    }

    pub fn set_fix(&mut self, state: usize, fix: bool) -> &mut Self {
        match self.states.get_mut(state) {
            Some(s) => s.fix = fix,
            None => self.errors.push(format!("fix flag set on unknown state {}", state)),
        }
        self
    }

    pub fn set_label(&mut self, state: usize, label: usize) -> &mut Self {
        match self.states.get_mut(state) {
            Some(s) => s.label = Some(label),
            None => self.errors.push(format!("label set on unknown state {}", state)),
        }
        self
    }

    /// Edge with the same probability in every transition class.
    pub fn add_transition(&mut self, from: usize, to: usize, prob: f64) -> &mut Self {
        let probs = vec![prob; self.n_classes];
        self.add_class_transition(from, to, probs)
    }

    pub fn add_class_transition(&mut self, from: usize, to: usize, probs: Vec<f64>) -> &mut Self {
        if to >= self.states.len() {
            self.errors.push(format!("transition {} -> {} targets an unknown state", from, to));
            return self;
        }
        match self.states.get_mut(from) {
            Some(s) => {
                if s.out_edges.iter().any(|edge| edge.target == to) {
                    self.errors.push(format!("duplicate transition {} -> {}", from, to));
                } else {
                    s.out_edges.push(Transition { target: to, probs });
                }
            }
            None => self.errors.push(format!("transition {} -> {} leaves an unknown state", from, to)),
        }
        self
    }

    pub fn build(mut self) -> Result<Topology> {
        if let Some(error) = self.errors.first() {
            return Err(HmmError::InvalidModel(error.clone()));
        }
        if self.n_classes == 0 {
            return Err(HmmError::InvalidModel("at least one transition class is required".into()));
        }
        if self.states.is_empty() {
            return Err(HmmError::InvalidModel("model has no states".into()));
        }
        self.check_probabilities()?;

        for source in 0..self.states.len() {
            for slot in 0..self.states[source].out_edges.len() {
                let target = self.states[source].out_edges[slot].target;
                self.states[target].in_edges.push(InEdge { source, slot });
            }
        }

        let silent_order = silent_order(&self.states)?;
        Ok(Topology { states: self.states, n_classes: self.n_classes, prior: self.prior, silent_order })
    }

    fn check_probabilities(&self) -> Result<()> {
        let valid = |p: f64| p.is_finite() && (0.0..=1.0).contains(&p);

        let mut pi_sum = 0.0;
        for (i, state) in self.states.iter().enumerate() {
            if !valid(state.pi) {
                return Err(HmmError::InvalidModel(format!("pi of state {} is {}", i, state.pi)));
            }
            pi_sum += state.pi;

            let mut sums = vec![0.0; self.n_classes];
            for edge in &state.out_edges {
                if edge.probs.len() != self.n_classes {
                    return Err(HmmError::InvalidModel(format!(
                        "transition {} -> {} has {} class probabilities, expected {}",
                        i,
                        edge.target,
                        edge.probs.len(),
                        self.n_classes
                    )));
                }
                for (class, &p) in edge.probs.iter().enumerate() {
                    if !valid(p) {
                        return Err(HmmError::InvalidModel(format!(
                            "transition {} -> {} has probability {} in class {}",
                            i, edge.target, p, class
                        )));
                    }
                    sums[class] += p;
                }
            }
            for (class, &sum) in sums.iter().enumerate() {
                // A state without outgoing mass ends every path through it.
                if sum.abs() > PROB_TOLERANCE && (sum - 1.0).abs() > PROB_TOLERANCE {
                    return Err(HmmError::InvalidModel(format!(
                        "out-transitions of state {} sum to {} in class {}",
                        i, sum, class
                    )));
                }
            }
        }
        if (pi_sum - 1.0).abs() > PROB_TOLERANCE {
            return Err(HmmError::InvalidModel(format!("initial probabilities sum to {}", pi_sum)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Depth-first topological sort of the silent subgraph, driven by an
/// explicit stack of `(state, next edge slot)` frames.
fn silent_order(states: &[State]) -> Result<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; states.len()];
    let mut finished = Vec::new();

    for root in (0..states.len()).filter(|&s| states[s].silent) {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::Active;
        let mut stack = vec![(root, 0usize)];

        while let Some(frame) = stack.last_mut() {
            let (state, slot) = *frame;
            let edges = &states[state].out_edges;
            if slot < edges.len() {
                frame.1 += 1;
                let edge = &edges[slot];
                if !states[edge.target].silent || edge.probs.iter().all(|&p| p == 0.0) {
                    continue;
                }
                match marks[edge.target] {
                    Mark::Unvisited => {
                        marks[edge.target] = Mark::Active;
                        stack.push((edge.target, 0));
                    }
                    Mark::Active => return Err(HmmError::SilentCycle { state: edge.target }),
                    Mark::Done => {}
                }
            } else {
                marks[state] = Mark::Done;
                finished.push(state);
                stack.pop();
            }
        }
    }

    finished.reverse();
    Ok(finished)
}
