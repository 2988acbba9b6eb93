use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sparse_hmm::{
    AlignedPair, ContinuousModel, Density, DiscreteEmission, DiscreteModel, HmmError, Inference, Labeled,
    MixtureComponent, Model, NullLogger, Observations, PairEmission, PairModel, Switching, Topology,
    TopologyBuilder,
};

fn left_right() -> DiscreteModel {
    let mut builder = TopologyBuilder::new(1);
    let s0 = builder.add_state(1.0);
    let s1 = builder.add_state(0.0);
    builder.add_transition(s0, s0, 0.5).add_transition(s0, s1, 0.5).add_transition(s1, s1, 1.0);
    let emissions = vec![DiscreteEmission::new(vec![0.9, 0.1]), DiscreteEmission::new(vec![0.2, 0.8])];
    DiscreteModel::new(builder.build().unwrap(), 2, emissions).unwrap()
}

fn normalise(weights: &mut [f64]) {
    let sum: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
}

fn random_row(rng: &mut StdRng, len: usize) -> Vec<f64> {
    let mut row: Vec<f64> = (0..len).map(|_| rng.gen::<f64>() + 0.01).collect();
    normalise(&mut row);
    row
}

#[test]
fn left_right_decoding() {
    let model = left_right();
    let inference = Inference::new(&NullLogger);
    let sequence = [0, 0, 1];
    let path = inference.viterbi(&model, &sequence).unwrap();
    assert_eq!(path.states, vec![0, 0, 1]);
    assert_relative_eq!(path.log_p, (1.0f64 * 0.9 * 0.5 * 0.9 * 0.5 * 0.8).ln(), epsilon = 1e-12);
    assert!(inference.logp(&model, &sequence).unwrap() >= path.log_p);
}

#[test]
fn zero_transition_on_every_path_fails_both_engines() {
    let mut builder = TopologyBuilder::new(1);
    let a = builder.add_state(1.0);
    let b = builder.add_state(0.0);
    builder.add_transition(a, a, 1.0).add_transition(b, b, 1.0);
    let emissions = vec![DiscreteEmission::new(vec![1.0, 0.0]), DiscreteEmission::new(vec![0.0, 1.0])];
    let model = DiscreteModel::new(builder.build().unwrap(), 2, emissions).unwrap();
    let inference = Inference::new(&NullLogger);

    let forward = inference.forward(&model, &[0, 1]).unwrap_err();
    assert_eq!(forward, HmmError::Underflow { t: 1 });
    assert!(forward.is_infeasible());
    assert_eq!(inference.viterbi(&model, &[0, 1]), Err(HmmError::NoPath));
}

#[test]
fn long_sequences_stay_finite() {
    let mut rng = StdRng::seed_from_u64(7);
    let n = 4;
    let m = 5;
    let pi = Array1::from(random_row(&mut rng, n));
    let a = Array2::from_shape_vec((n, n), (0..n).flat_map(|_| random_row(&mut rng, n)).collect()).unwrap();
    // symbol 4 is rare in every state
    let mut b = Array2::zeros((n, m));
    for mut row in b.outer_iter_mut() {
        let mut weights = random_row(&mut rng, m - 1);
        weights.iter_mut().for_each(|w| *w *= 1.0 - 1e-4);
        weights.push(1e-4);
        row.assign(&Array1::from(weights));
    }
    let model = DiscreteModel::from_dense(&pi, &a, &b).unwrap();
    let sequence: Vec<usize> = (0..100_000).map(|_| rng.gen_range(0..m)).collect();

    let inference = Inference::new(&NullLogger);
    let forward = inference.forward(&model, &sequence).unwrap();
    assert!(forward.log_p.is_finite() && forward.log_p < 0.0);
    assert!(forward.alpha.iter().all(|x| x.is_finite()));
    assert!(forward.scale.iter().all(|&c| c > 0.0 && c.is_finite()));
    assert_eq!(inference.logp(&model, &sequence).unwrap(), forward.log_p);

    let path = inference.viterbi(&model, &sequence).unwrap();
    assert_eq!(path.states.len(), sequence.len());
    assert!(path.log_p.is_finite() && path.log_p <= forward.log_p);
}

#[test]
fn subnormal_emission_is_reported_as_underflow() {
    let mut builder = TopologyBuilder::new(1);
    let s = builder.add_state(1.0);
    builder.add_transition(s, s, 1.0);
    let model =
        DiscreteModel::new(builder.build().unwrap(), 2, vec![DiscreteEmission::new(vec![1.0, 1e-310])]).unwrap();
    let mut sequence = vec![0; 100_000];
    sequence[50_000] = 1;
    let inference = Inference::new(&NullLogger);
    assert_eq!(inference.forward(&model, &sequence), Err(HmmError::Underflow { t: 50_000 }));
    assert_eq!(inference.logp(&model, &sequence), Err(HmmError::Underflow { t: 50_000 }));
}

#[test]
fn switching_classes_follow_the_selector() {
    let mut builder = TopologyBuilder::new(2);
    let a = builder.add_state(1.0);
    let b = builder.add_state(0.0);
    builder.add_class_transition(a, a, vec![1.0, 0.0]).add_class_transition(a, b, vec![0.0, 1.0]);
    builder.add_class_transition(b, b, vec![1.0, 0.0]).add_class_transition(b, a, vec![0.0, 1.0]);
    let emissions = vec![DiscreteEmission::new(vec![0.5, 0.5]), DiscreteEmission::new(vec![0.5, 0.5])];
    let topology = builder.build().unwrap();
    let discrete = DiscreteModel::new(topology, 2, emissions).unwrap();

    let switching = Switching::new(discrete.clone(), |_: &Topology, obs: &[usize], t: usize| obs[t]);
    let model = Model::from(switching);
    let inference = Inference::new(&NullLogger);
    let sequence = [0usize, 1, 0, 0];
    let observations = Observations::from(&sequence[..]);

    let path = model.viterbi(&inference, observations).unwrap();
    assert_eq!(path.states, vec![a, a, b, b]);
    assert_relative_eq!(path.log_p, 4.0 * 0.5f64.ln(), epsilon = 1e-12);
    assert_relative_eq!(model.logp(&inference, observations).unwrap(), path.log_p, epsilon = 1e-12);

    let forward = model.forward(&inference, observations).unwrap();
    let beta = model.backward(&inference, observations, forward.scale.as_slice().unwrap()).unwrap();
    assert_relative_eq!(beta[[0, a]] * forward.alpha[[0, a]], 1.0, epsilon = 1e-12);

    let broken = Switching::new(discrete, |_: &Topology, _: &[usize], _: usize| 5usize);
    assert_eq!(
        Inference::new(&NullLogger).forward(&broken, &sequence),
        Err(HmmError::InvalidTransitionClass { t: 0, class: 5, classes: 2 })
    );
}

#[test]
fn labels_pin_the_path() {
    let mut builder = TopologyBuilder::new(1);
    let x = builder.add_state(0.5);
    let y = builder.add_state(0.5);
    for &(from, to) in &[(x, x), (x, y), (y, x), (y, y)] {
        builder.add_transition(from, to, 0.5);
    }
    builder.set_label(x, 0).set_label(y, 1);
    let emissions = vec![DiscreteEmission::new(vec![0.5, 0.5]), DiscreteEmission::new(vec![0.5, 0.5])];
    let model = DiscreteModel::new(builder.build().unwrap(), 2, emissions).unwrap();

    let labels = [1, 0, 0, 1];
    let labeled = Labeled::new(&model, &labels);
    let inference = Inference::new(&NullLogger);
    let sequence = [0, 1, 1, 0];
    let path = inference.viterbi(&labeled, &sequence).unwrap();
    assert_eq!(path.states, vec![y, x, x, y]);
    assert_relative_eq!(path.log_p, 8.0 * 0.5f64.ln(), epsilon = 1e-12);
    assert_relative_eq!(inference.logp(&labeled, &sequence).unwrap(), path.log_p, epsilon = 1e-12);
}

#[test]
fn pair_alignment_scoring() {
    let mut builder = TopologyBuilder::new(1);
    let matched = builder.add_state(1.0);
    let gap_y = builder.add_state(0.0);
    let gap_x = builder.add_state(0.0);
    builder
        .add_transition(matched, matched, 0.8)
        .add_transition(matched, gap_y, 0.1)
        .add_transition(matched, gap_x, 0.1);
    builder.add_transition(gap_y, matched, 1.0).add_transition(gap_x, matched, 1.0);
    let emissions = vec![
        PairEmission::Match(vec![0.4, 0.1, 0.1, 0.4]),
        PairEmission::InsertX(vec![0.5, 0.5]),
        PairEmission::InsertY(vec![0.5, 0.5]),
    ];
    let model = Model::from(PairModel::new(builder.build().unwrap(), 2, 2, emissions).unwrap());
    let columns = [
        AlignedPair::matched(0, 0),
        AlignedPair::insert_x(1),
        AlignedPair::matched(1, 1),
        AlignedPair::insert_y(0),
    ];
    let inference = Inference::new(&NullLogger);
    let observations = Observations::from(&columns[..]);
    let path = model.viterbi(&inference, observations).unwrap();
    assert_eq!(path.states, vec![matched, gap_y, matched, gap_x]);
    let expected = (0.4f64 * 0.1 * 0.5 * 0.4 * 0.1 * 0.5).ln();
    assert_relative_eq!(path.log_p, expected, epsilon = 1e-12);
    assert_relative_eq!(model.logp(&inference, observations).unwrap(), expected, epsilon = 1e-12);
}

#[test]
fn continuous_mixture_decoding() {
    let mut builder = TopologyBuilder::new(1);
    let low = builder.add_state(1.0);
    let high = builder.add_state(0.0);
    builder.add_transition(low, low, 0.8).add_transition(low, high, 0.2).add_transition(high, high, 1.0);
    let mixtures = vec![
        vec![
            MixtureComponent::new(Density::Normal { mean: 0.0, variance: 1.0 }, 0.7),
            MixtureComponent::new(Density::Uniform { min: -1.0, max: 1.0 }, 0.3),
        ],
        vec![MixtureComponent::new(Density::NormalTruncatedLeft { mean: 3.0, variance: 1.0, bound: 2.0 }, 1.0)],
    ];
    let model = ContinuousModel::new(builder.build().unwrap(), 2, mixtures).unwrap();
    let values = [0.1, -0.2, 3.1, 2.9];
    let inference = Inference::new(&NullLogger);
    let path = inference.viterbi(&model, &values).unwrap();
    assert_eq!(path.states, vec![low, low, high, high]);
    assert!(path.log_p <= inference.logp(&model, &values).unwrap());

    let gamma = inference.posterior(&model, &values).unwrap();
    assert_relative_eq!(gamma[[1, high]], 0.0);
    assert!(gamma[[3, high]] > 0.99);

    assert_eq!(inference.logp(&model, &[0.0, f64::NAN]), Err(HmmError::InvalidObservation { t: 1 }));
}

/// A silent hub between emitting states behaves like the dense model whose
/// transitions add the hub detour to the direct edges.
#[test]
fn silent_hub_matches_its_dense_expansion() {
    let mut rng = StdRng::seed_from_u64(11);
    let k = 3;
    let m = 3;

    let mut builder = TopologyBuilder::new(1);
    let begin = builder.add_silent_state(1.0);
    let emitting: Vec<usize> = (0..k).map(|_| builder.add_state(0.0)).collect();
    let hub = builder.add_silent_state(0.0);

    let entry = random_row(&mut rng, k);
    let detour = random_row(&mut rng, k);
    let mut dense_a = Array2::zeros((k, k));
    for (i, &from) in emitting.iter().enumerate() {
        let out = random_row(&mut rng, k + 1);
        for (j, &to) in emitting.iter().enumerate() {
            builder.add_transition(from, to, out[j]);
            dense_a[[i, j]] = out[j] + out[k] * detour[j];
        }
        builder.add_transition(from, hub, out[k]);
    }
    for (j, &to) in emitting.iter().enumerate() {
        builder.add_transition(begin, to, entry[j]);
        builder.add_transition(hub, to, detour[j]);
    }

    let b: Vec<Vec<f64>> = (0..k).map(|_| random_row(&mut rng, m)).collect();
    let mut emissions = vec![DiscreteEmission::empty()];
    emissions.extend(b.iter().cloned().map(DiscreteEmission::new));
    emissions.push(DiscreteEmission::empty());
    let sparse = DiscreteModel::new(builder.build().unwrap(), m, emissions).unwrap();

    let dense_b = Array2::from_shape_vec((k, m), b.concat()).unwrap();
    let dense = DiscreteModel::from_dense(&Array1::from(entry), &dense_a, &dense_b).unwrap();

    let inference = Inference::new(&NullLogger);
    let sequence: Vec<usize> = (0..40).map(|_| rng.gen_range(0..m)).collect();
    let forward = inference.forward(&sparse, &sequence).unwrap();
    assert_relative_eq!(forward.log_p, inference.logp(&dense, &sequence).unwrap(), epsilon = 1e-9);

    let scale = forward.scale.to_vec();
    let beta = inference.backward(&sparse, &sequence, &scale).unwrap();
    for t in 0..sequence.len() {
        let total: f64 = emitting.iter().map(|&i| forward.alpha[[t, i]] * beta[[t, i]]).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    }
    let gamma = inference.posterior(&sparse, &sequence).unwrap();
    let dense_gamma = inference.posterior(&dense, &sequence).unwrap();
    for t in 0..sequence.len() {
        for (j, &state) in emitting.iter().enumerate() {
            assert_relative_eq!(gamma[[t, state]], dense_gamma[[t, j]], epsilon = 1e-9);
        }
    }

    let path = inference.viterbi(&sparse, &sequence).unwrap();
    assert_eq!(path.states[0], begin);
    assert_eq!(path.states.iter().filter(|&&s| s != begin && s != hub).count(), sequence.len());
    assert_relative_eq!(
        inference.path_log_p(&sparse, &sequence, &path.states).unwrap(),
        path.log_p,
        epsilon = 1e-9
    );
    assert!(path.log_p <= forward.log_p);
}

#[test]
fn concurrent_decoding_shares_one_model() {
    let model = Arc::new(Model::from(left_right()));
    let sequence: Arc<Vec<usize>> = Arc::new((0..500).map(|t| (t / 7) % 2).collect());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let model = Arc::clone(&model);
            let sequence = Arc::clone(&sequence);
            thread::spawn(move || {
                let inference = Inference::new(&NullLogger);
                let observations = Observations::Symbols(sequence.as_slice());
                (model.viterbi(&inference, observations), model.logp(&inference, observations))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }
}
