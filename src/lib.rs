//! Scaled forward-backward and Viterbi decoding over sparse hidden Markov
//! models.
//!
//! Models are built with [`TopologyBuilder`] and one of the emission
//! variants, then handed to an [`Inference`] context (or the free functions,
//! which log through `tracing`):
//!
//! ```
//! use sparse_hmm::{DiscreteEmission, DiscreteModel, TopologyBuilder};
//!
//! let mut builder = TopologyBuilder::new(1);
//! let s0 = builder.add_state(1.0);
//! let s1 = builder.add_state(0.0);
//! builder.add_transition(s0, s0, 0.5).add_transition(s0, s1, 0.5).add_transition(s1, s1, 1.0);
//! let emissions = vec![DiscreteEmission::new(vec![0.9, 0.1]), DiscreteEmission::new(vec![0.2, 0.8])];
//! let model = DiscreteModel::new(builder.build()?, 2, emissions)?;
//!
//! let path = sparse_hmm::viterbi(&model, &[0, 0, 1])?;
//! assert_eq!(path.states, vec![0, 0, 1]);
//! assert!(sparse_hmm::logp(&model, &[0, 0, 1])? >= path.log_p);
//! # Ok::<(), sparse_hmm::HmmError>(())
//! ```

pub mod error;
pub mod hmm;
pub mod inference;
pub mod logging;

pub use error::{HmmError, Result, PENALTY_LOGP};
pub use hmm::classes::{ClassSelector, Switching};
pub use hmm::continuous::{ContinuousModel, MixtureComponent};
pub use hmm::density::Density;
pub use hmm::discrete::{Background, DiscreteEmission, DiscreteModel, HistoryPolicy};
pub use hmm::labeled::Labeled;
pub use hmm::pair::{AlignedPair, PairEmission, PairModel};
pub use hmm::topology::{Topology, TopologyBuilder};
pub use hmm::{HiddenMarkovModel, Model, Observations};
pub use inference::{
    backward, forward, logp, path_log_p, posterior, viterbi, BatchLikelihood, Forward, Inference, InferenceConfig,
    Sequence, ViterbiPath,
};
pub use logging::{Logger, MemoryLogger, NullLogger, TracingLogger};
