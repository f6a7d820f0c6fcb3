use std::{
    num::NonZeroUsize,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::Parser;
use engine::WordModel;

use crate::TrialPlan;

pub const DEFAULT_CORPUS_PATH: &str = "data/lexitron_mod.txt";
pub const DEFAULT_TRIALS: usize = 100;
pub const DEFAULT_LOCALE: &str = "th-TH";

/// Measures a word segmenter against shuffled reference tokens.
#[derive(Debug, Clone, Parser)]
#[command(name = "segeval")]
#[command(about = "Monte Carlo accuracy and latency evaluation of a word segmenter")]
pub struct Args {
    /// Reference corpus, one token per line (UTF-8).
    #[arg(long, env = "SEGEVAL_CORPUS", default_value = DEFAULT_CORPUS_PATH)]
    pub corpus: PathBuf,

    /// Number of shuffled trials to run.
    #[arg(short = 'n', long, env = "SEGEVAL_TRIALS", default_value_t = DEFAULT_TRIALS, value_parser = parse_positive_usize)]
    pub trials: usize,

    /// Locale handed to the segmenter (`th-TH` and `th_TH` are both accepted).
    #[arg(long, env = "SEGEVAL_LOCALE", default_value = DEFAULT_LOCALE)]
    pub locale: String,

    /// Segmenter model: auto, dictionary or lstm.
    #[arg(long, env = "SEGEVAL_MODEL", default_value = "auto", value_parser = parse_model)]
    pub model: WordModel,

    /// Seed for the token shuffles. Defaults to the wall clock.
    #[arg(long, env = "SEGEVAL_SEED")]
    pub seed: Option<u64>,

    /// Worker threads, each with its own segmenter. Defaults to available cores.
    #[arg(long, env = "SEGEVAL_WORKERS", value_parser = parse_positive_usize)]
    pub workers: Option<usize>,

    /// Confidence level for margins of error; repeat for several.
    #[arg(long = "confidence", value_parser = parse_confidence, default_values = ["0.95", "0.99"])]
    pub confidence_levels: Vec<f64>,

    /// Also write the aggregate report as JSON to this path.
    #[arg(long, env = "SEGEVAL_REPORT_OUT")]
    pub report_out: Option<PathBuf>,

    /// Print every trial and enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    pub corpus_path: PathBuf,
    pub trials: usize,
    pub locale: String,
    pub model: WordModel,
    pub seed: u64,
    pub workers: usize,
    pub confidence_levels: Vec<f64>,
    pub report_out: Option<PathBuf>,
    pub verbose: bool,
}

impl Args {
    pub fn into_config(self) -> EvalConfig {
        let workers = self
            .workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .min(self.trials);
        let mut confidence_levels = self.confidence_levels;
        confidence_levels.sort_by(|a, b| a.total_cmp(b));
        confidence_levels.dedup();

        EvalConfig {
            corpus_path: self.corpus,
            trials: self.trials,
            locale: self.locale,
            model: self.model,
            seed: self.seed.unwrap_or_else(clock_seed),
            workers,
            confidence_levels,
            report_out: self.report_out,
            verbose: self.verbose,
        }
    }
}

impl EvalConfig {
    pub fn plan(&self) -> TrialPlan {
        TrialPlan {
            trials: self.trials,
            workers: self.workers,
            seed: self.seed,
        }
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_nanos() as u64)
        .unwrap_or(0)
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let value = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid value '{raw}'"))?;
    if value == 0 {
        return Err("must be > 0".to_string());
    }
    Ok(value)
}

fn parse_model(raw: &str) -> Result<WordModel, String> {
    WordModel::from_arg(raw)
        .ok_or_else(|| format!("unknown model '{raw}' (valid: auto, dictionary, lstm)"))
}

fn parse_confidence(raw: &str) -> Result<f64, String> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid confidence '{raw}'"))?;
    if !(value > 0.0 && value < 1.0) {
        return Err(format!("confidence must be in (0, 1), got {value}"));
    }
    Ok(value)
}
