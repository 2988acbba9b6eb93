//! Log-likelihood of a batch of weighted sequences.

use serde::Serialize;

use super::Inference;
use crate::error::Result;
use crate::hmm::HiddenMarkovModel;

/// An observation sequence with the weight it carries in batch objectives.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence<O> {
    pub observations: Vec<O>,
    pub weight: f64,
}

impl<O> Sequence<O> {
    pub fn new(observations: Vec<O>) -> Self {
        Self { observations, weight: 1.0 }
    }

    pub fn weighted(observations: Vec<O>, weight: f64) -> Self {
        Self { observations, weight }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchLikelihood {
    /// Σ weight · log_p, with the penalty standing in for infeasible sequences.
    pub log_p: f64,
    /// Sequences whose likelihood could be computed.
    pub evaluated: usize,
    /// Indices of the infeasible sequences.
    pub failed: Vec<usize>,
    /// Unweighted log-likelihood of each sequence, `None` where infeasible.
    pub individual: Vec<Option<f64>>,
}

impl<'l> Inference<'l> {
    /// Sums weighted log-likelihoods. Infeasible sequences contribute
    /// `weight * penalty_log_p`; any other error aborts the batch.
    pub fn likelihood<M>(&self, model: &M, sequences: &[Sequence<M::Observation>]) -> Result<BatchLikelihood>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        let mut batch = BatchLikelihood {
            log_p: 0.0,
            evaluated: 0,
            failed: Vec::new(),
            individual: Vec::with_capacity(sequences.len()),
        };
        for (i, result) in self.individual_likelihoods(model, sequences).into_iter().enumerate() {
            let weight = sequences[i].weight;
            match result {
                Ok(log_p) => {
                    batch.log_p += weight * log_p;
                    batch.evaluated += 1;
                    batch.individual.push(Some(log_p));
                }
                Err(e) if e.is_infeasible() => {
                    self.logger.warn(format_args!(
                        "sequence {} cannot be generated ({}), using penalty {}",
                        i, e, self.config.penalty_log_p
                    ));
                    batch.log_p += weight * self.config.penalty_log_p;
                    batch.failed.push(i);
                    batch.individual.push(None);
                }
                Err(e) => return Err(e),
            }
        }
        self.logger.info(format_args!(
            "log-likelihood {} over {} sequences ({} infeasible)",
            batch.log_p,
            sequences.len(),
            batch.failed.len()
        ));
        Ok(batch)
    }

    /// Unweighted log-likelihood of each sequence.
    pub fn individual_likelihoods<M>(&self, model: &M, sequences: &[Sequence<M::Observation>]) -> Vec<Result<f64>>
    where
        M: HiddenMarkovModel + ?Sized,
    {
        sequences.iter().map(|s| self.logp(model, &s.observations)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HmmError, PENALTY_LOGP};
    use crate::hmm::discrete::{DiscreteEmission, DiscreteModel};
    use crate::hmm::topology::TopologyBuilder;
    use crate::logging::MemoryLogger;
    use approx::assert_relative_eq;
    use tracing::Level;

    fn sticky() -> DiscreteModel {
        let mut builder = TopologyBuilder::new(1);
        let s = builder.add_state(1.0);
        builder.add_transition(s, s, 1.0);
        DiscreteModel::new(builder.build().unwrap(), 2, vec![DiscreteEmission::new(vec![0.5, 0.5])]).unwrap()
    }

    #[test]
    fn weights_and_penalties() {
        let mut model = sticky();
        let sequences =
            vec![Sequence::new(vec![0, 1]), Sequence::weighted(vec![1, 1, 1], 2.0), Sequence::new(vec![])];
        let logger = MemoryLogger::new(Level::INFO);
        let inference = Inference::new(&logger);
        assert_eq!(inference.likelihood(&model, &sequences), Err(HmmError::EmptySequence));

        let sequences = &sequences[..2];
        let batch = inference.likelihood(&model, sequences).unwrap();
        assert_relative_eq!(batch.log_p, 8.0 * 0.5f64.ln(), epsilon = 1e-12);
        assert_eq!(batch.evaluated, 2);
        assert_eq!(batch.individual.len(), 2);
        assert_relative_eq!(batch.individual[1].unwrap(), 3.0 * 0.5f64.ln(), epsilon = 1e-12);

        let mut builder = TopologyBuilder::new(1);
        let s = builder.add_state(1.0);
        builder.add_transition(s, s, 1.0);
        model = DiscreteModel::new(builder.build().unwrap(), 2, vec![DiscreteEmission::new(vec![1.0, 0.0])]).unwrap();
        let batch = inference.likelihood(&model, sequences).unwrap();
        assert_eq!(batch.failed, vec![0, 1]);
        assert_eq!(batch.evaluated, 0);
        assert_relative_eq!(batch.log_p, 3.0 * PENALTY_LOGP);
        assert!(logger.records().iter().any(|(level, _)| *level == Level::WARN));
    }

    #[test]
    fn one_pass_reports_each_sequence_once() {
        let mut builder = TopologyBuilder::new(1);
        let s = builder.add_state(1.0);
        builder.add_transition(s, s, 1.0);
        let emissions = vec![DiscreteEmission::new(vec![1.0, 0.0])];
        let model = DiscreteModel::new(builder.build().unwrap(), 2, emissions).unwrap();
        let sequences = vec![Sequence::new(vec![0, 0]), Sequence::new(vec![0, 1]), Sequence::new(vec![1])];
        let logger = MemoryLogger::new(Level::WARN);
        let inference = Inference::new(&logger);

        let batch = inference.likelihood(&model, &sequences).unwrap();
        assert_eq!(batch.individual, vec![Some(0.0), None, None]);
        assert_eq!(batch.failed, vec![1, 2]);
        let warnings = logger.records().iter().filter(|(level, _)| *level == Level::WARN).count();
        assert_eq!(warnings, 2);
    }
}
