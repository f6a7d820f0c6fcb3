use std::{fmt, path::Path};

use corpus::Corpus;
use serde::Serialize;
use stats::{Margin, MetricSummary};

use crate::{Aggregate, EvalConfig, EvalError, TrialOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub corpus_path: String,
    pub corpus_bytes: u64,
    pub token_count: usize,
    pub text_bytes: usize,
    pub locale: String,
    pub model: &'static str,
    pub seed: u64,
    pub workers: usize,
    pub trials: usize,
    pub scored_trials: usize,
    pub degenerate_trials: usize,
    pub failed_trials: usize,
    pub f1: Option<MetricSummary>,
    pub latency_ms: Option<MetricSummary>,
}

impl EvaluationReport {
    pub fn new(config: &EvalConfig, corpus: &Corpus, aggregate: &Aggregate) -> Self {
        Self {
            corpus_path: config.corpus_path.display().to_string(),
            corpus_bytes: corpus.source_bytes(),
            token_count: corpus.len(),
            text_bytes: corpus.text_len(),
            locale: config.locale.clone(),
            model: config.model.as_str(),
            seed: config.seed,
            workers: config.workers,
            trials: config.trials,
            scored_trials: aggregate.scored,
            degenerate_trials: aggregate.degenerate,
            failed_trials: aggregate.failed,
            f1: aggregate.f1.summarize(&config.confidence_levels),
            latency_ms: aggregate.latency_ms.summarize(&config.confidence_levels),
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Trials requested: {}", self.trials)?;
        writeln!(f, "Trials scored: {}", self.scored_trials)?;
        writeln!(f, "Trials with undefined F1: {}", self.degenerate_trials)?;
        writeln!(f, "Trials skipped (engine error): {}", self.failed_trials)?;

        match &self.f1 {
            Some(f1) => {
                writeln!(f, "Average F1 score: {:.6}", f1.mean)?;
                writeln!(f, "F1 variance: {:.6}", f1.variance)?;
                writeln!(f, "Best F1 score: {:.6}", f1.max)?;
                writeln!(f, "Worst F1 score: {:.6}", f1.min)?;
                for margin in &f1.margins {
                    writeln!(
                        f,
                        "Margin of error at {} for F1: {}",
                        format_confidence(margin.confidence),
                        format_margin(margin)
                    )?;
                }
            }
            None => writeln!(f, "F1 score: n/a (no trial produced a defined F1)")?,
        }

        match &self.latency_ms {
            Some(latency) => {
                writeln!(f, "Mean tokenization time (ms): {:.4}", latency.mean)?;
                writeln!(f, "Tokenization time variance (ms^2): {:.4}", latency.variance)?;
                for margin in &latency.margins {
                    writeln!(
                        f,
                        "Margin of error at {} for tokenization time (ms): {}",
                        format_confidence(margin.confidence),
                        format_margin(margin)
                    )?;
                }
            }
            None => writeln!(f, "Tokenization time: n/a (no trial completed)")?,
        }
        Ok(())
    }
}

fn format_confidence(confidence: f64) -> String {
    let pct = confidence * 100.0;
    if (pct - pct.round()).abs() < 1e-9 {
        format!("{pct:.0}%")
    } else {
        let text = format!("{pct:.3}");
        format!("{}%", text.trim_end_matches('0'))
    }
}

fn format_margin(margin: &Margin) -> String {
    margin
        .margin
        .map(|value| format!("{value:.6}"))
        .unwrap_or_else(|| "n/a (needs at least two trials)".to_string())
}

pub fn print_corpus_summary(config: &EvalConfig, corpus: &Corpus) {
    println!("Corpus: {}", config.corpus_path.display());
    println!("Dictionary file size in bytes: {}", corpus.source_bytes());
    println!("Total tokens in dictionary: {}", corpus.len());
    println!("Total concatenated text bytes: {}", corpus.text_len());
    println!(
        "Segmenter: locale={}, model={}",
        config.locale,
        config.model.as_str()
    );
    println!(
        "Trials: {}, workers: {}, seed: {}",
        config.trials, config.workers, config.seed
    );
}

pub fn print_trial(outcome: &TrialOutcome) {
    match outcome {
        TrialOutcome::Scored(record) => println!(
            "Trial {}: tokenization {:.4} ms, tp={}, predicted={}, expected={}, F1 {}",
            record.trial,
            record.latency_ms,
            record.counts.true_positive,
            record.counts.predicted_boundaries(),
            record.counts.expected_positive,
            record.f1
        ),
        TrialOutcome::Failed { trial, error } => println!("Trial {trial}: skipped ({error})"),
    }
}

pub fn write_report_json(path: &Path, report: &EvaluationReport) -> Result<(), EvalError> {
    let write_err = |source| EvalError::ReportWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut body = serde_json::to_string_pretty(report)
        .map_err(|err| write_err(std::io::Error::other(err)))?;
    body.push('\n');
    std::fs::write(path, body).map_err(write_err)
}
