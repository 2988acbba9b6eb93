use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use ndarray::{Array1, Array2};
use ndarray_csv::Array2Reader;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use sparse_hmm::{DiscreteModel, InferenceConfig, ViterbiPath};

pub fn read_matrix(path: &Path, nrows: usize, ncols: usize) -> Result<Array2<f64>> {
    let file = File::open(path).with_context(|| format!("cannot open matrix {}", path.display()))?;
    let mut reader = ReaderBuilder::new().has_headers(false).from_reader(file);
    reader
        .deserialize_array2((nrows, ncols))
        .with_context(|| format!("cannot read a {}x{} matrix from {}", nrows, ncols, path.display()))
}

/// One sequence of space-separated symbols per line; blank lines are skipped.
pub fn load_sequences(path: &Path) -> Result<Vec<Vec<usize>>> {
    let file = File::open(path).with_context(|| format!("cannot open sequences {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut ret = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sequence = line
            .split_whitespace()
            .map(|x| x.parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("{}:{}: not a symbol sequence", path.display(), number + 1))?;
        ret.push(sequence);
    }
    Ok(ret)
}

fn array_to_str<T: ToString>(a: &[T]) -> String {
    a.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(" ")
}

pub fn write_paths(path: &Path, outputs: &[Option<ViterbiPath>]) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    for output in outputs {
        match output {
            Some(p) => writeln!(file, "{} {}", p.log_p, array_to_str(&p.states))?,
            None => writeln!(file, "-inf")?,
        }
    }
    Ok(())
}

pub fn write_log_likelihoods(path: &Path, outputs: &[Option<f64>]) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    for output in outputs {
        match output {
            Some(log_p) => writeln!(file, "{}", log_p)?,
            None => writeln!(file, "-inf")?,
        }
    }
    Ok(())
}

/// One row per position, sequences separated by an empty line.
pub fn write_posteriors(path: &Path, outputs: &[Option<Array2<f64>>]) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    for output in outputs {
        if let Some(gamma) = output {
            for row in gamma.outer_iter() {
                writeln!(file, "{}", array_to_str(&row.to_vec()))?;
            }
        }
        writeln!(file)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Viterbi,
    LogP,
    Posterior,
}

#[derive(Debug)]
pub struct Config {
    pub method: Method,
    hmm_path: PathBuf,
    input_path: PathBuf,
    output_path: PathBuf,
    pub nstates: usize,
    pub nobs: usize,
    max_len: Option<usize>,
}

impl Config {
    fn new() -> Self {
        Self {
            method: Method::Viterbi,
            hmm_path: PathBuf::from("."),
            input_path: PathBuf::from("sequences"),
            output_path: PathBuf::from("output"),
            nstates: 0,
            nobs: 0,
            max_len: None,
        }
    }

    pub fn from_config_file(filename: &Path) -> Result<Self> {
        let file = File::open(filename).with_context(|| format!("cannot open config file {}", filename.display()))?;
        Self::parse(BufReader::new(file))
    }

    fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut instance = Config::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let splits: Vec<&str> = line.splitn(2, '=').collect();
            if splits.len() != 2 {
                bail!("wrong line in config file: {:?}", line);
            }
            let option = splits[0].trim();
            let value = splits[1].trim();
            match option {
                "method" => {
                    instance.method = match value {
                        "viterbi" => Method::Viterbi,
                        "logp" => Method::LogP,
                        "posterior" => Method::Posterior,
                        _ => bail!("unknown method {:?}", value),
                    }
                }
                "hmm_path" => instance.hmm_path = PathBuf::from(value),
                "input_path" => instance.input_path = PathBuf::from(value),
                "output_path" => instance.output_path = PathBuf::from(value),
                "nstates" => instance.nstates = value.parse().context("nstates")?,
                "nobs" => instance.nobs = value.parse().context("nobs")?,
                "max_len" => instance.max_len = Some(value.parse().context("max_len")?),
                _ => bail!("unknown option in config file: {:?}", option),
            };
        }
        if instance.nstates == 0 || instance.nobs == 0 {
            bail!("nstates and nobs must be set");
        }
        Ok(instance)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn inference_config(&self) -> InferenceConfig {
        let mut config = InferenceConfig::default();
        if let Some(max_len) = self.max_len {
            config.max_sequence_length = max_len;
        }
        config
    }

    /// Reads `A`, `b` and `pi` from `hmm_path`.
    pub fn load_model(&self) -> Result<DiscreteModel> {
        let a = read_matrix(&self.hmm_path.join("A"), self.nstates, self.nstates)?;
        let b = read_matrix(&self.hmm_path.join("b"), self.nstates, self.nobs)?;
        let pi: Array1<f64> = read_matrix(&self.hmm_path.join("pi"), 1, self.nstates)?.row(0).to_owned();
        DiscreteModel::from_dense(&pi, &a, &b).context("invalid model")
    }

    pub fn get_sequences(&self) -> Result<Vec<Vec<usize>>> {
        load_sequences(&self.input_path)
    }
}
