use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::time::Instant;

mod utils;

use sparse_hmm::{DiscreteModel, HiddenMarkovModel, Inference, Sequence, TracingLogger};
use utils::{Config, Method};

#[derive(Serialize)]
struct Report {
    method: &'static str,
    sequences: usize,
    failed: Vec<usize>,
    total_log_p: Option<f64>,
    elapsed_ms: u128,
}

fn viterbi(
    model: &DiscreteModel,
    inference: &Inference<'_>,
    sequences: &[Vec<usize>],
    config: &Config,
) -> Result<Vec<usize>> {
    let mut failed = Vec::new();
    let mut paths = Vec::with_capacity(sequences.len());
    for (i, sequence) in sequences.iter().enumerate() {
        match inference.viterbi(model, sequence) {
            Ok(path) => paths.push(Some(path)),
            Err(e) if e.is_infeasible() => {
                tracing::warn!("sequence {}: {}", i, e);
                failed.push(i);
                paths.push(None);
            }
            Err(e) => return Err(e).with_context(|| format!("sequence {}", i)),
        }
    }
    utils::write_paths(config.output_path(), &paths)?;
    Ok(failed)
}

fn logp(
    model: &DiscreteModel,
    inference: &Inference<'_>,
    sequences: &[Vec<usize>],
    config: &Config,
) -> Result<(f64, Vec<usize>)> {
    let batch: Vec<Sequence<usize>> = sequences.iter().cloned().map(Sequence::new).collect();
    let total = inference.likelihood(model, &batch)?;
    utils::write_log_likelihoods(config.output_path(), &total.individual)?;
    Ok((total.log_p, total.failed))
}

fn posterior(
    model: &DiscreteModel,
    inference: &Inference<'_>,
    sequences: &[Vec<usize>],
    config: &Config,
) -> Result<Vec<usize>> {
    let mut failed = Vec::new();
    let mut outputs = Vec::with_capacity(sequences.len());
    for (i, sequence) in sequences.iter().enumerate() {
        match inference.posterior(model, sequence) {
            Ok(gamma) => outputs.push(Some(gamma)),
            Err(e) if e.is_infeasible() => {
                tracing::warn!("sequence {}: {}", i, e);
                failed.push(i);
                outputs.push(None);
            }
            Err(e) => return Err(e).with_context(|| format!("sequence {}", i)),
        }
    }
    utils::write_posteriors(config.output_path(), &outputs)?;
    Ok(failed)
}

fn main() -> Result<()> {
    let matches = Command::new("Sparse HMM")
        .version("0.1")
        .author("Alexandre Dubray <alexandre.dubray@uclouvain.be>")
        .about("Scaled forward-backward and Viterbi decoding for sparse HMMs")
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("configuration file")
            .value_parser(value_parser!(PathBuf))
            .required(true))
        .arg(Arg::new("verbose")
            .short('v')
            .help("more logging, repeat for more")
            .action(ArgAction::Count))
        .arg(Arg::new("json")
            .long("json")
            .help("print a JSON summary on stdout")
            .action(ArgAction::SetTrue))
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config_path = matches.get_one::<PathBuf>("config").context("no config file provided")?;
    let config = Config::from_config_file(config_path)?;
    let model = config.load_model()?;
    let sequences = config.get_sequences()?;
    tracing::info!("{} states, {} sequences", model.topology().n_states(), sequences.len());

    let logger = TracingLogger;
    let inference = Inference::new(&logger).with_config(config.inference_config());

    let start = Instant::now();
    let (method, total_log_p, failed) = match config.method {
        Method::Viterbi => ("viterbi", None, viterbi(&model, &inference, &sequences, &config)?),
        Method::LogP => {
            let (total, failed) = logp(&model, &inference, &sequences, &config)?;
            ("logp", Some(total), failed)
        }
        Method::Posterior => ("posterior", None, posterior(&model, &inference, &sequences, &config)?),
    };
    let elapsed_ms = start.elapsed().as_millis();

    if matches.get_flag("json") {
        let report = Report { method, sequences: sequences.len(), failed, total_log_p, elapsed_ms };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} on {} sequences ({} infeasible) in {} ms", method, sequences.len(), failed.len(), elapsed_ms);
    }
    Ok(())
}
