use std::time::Instant;

use clap::{Parser, ValueEnum};
use corpus::Corpus;
use engine::{EngineError, IcuWordEngine, SegmentationEngine, WordModel};
use evaluator::{TrialOutcome, TrialPlan, run_evaluation};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stats::RunningStats;

const SYLLABLES: &[&str] = &[
    "กา", "ขี", "คุ", "งู", "จะ", "ฉิ", "ชา", "ซอ", "ดี", "ตา", "ทอง", "นำ", "บิน", "ปลา", "มา",
    "ยัง", "รัก", "ลม", "วัน", "สวน", "หา", "อยู่",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    Icu,
    Synthetic,
}

impl EngineKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Icu => "icu",
            Self::Synthetic => "synthetic",
        }
    }
}

/// Throughput of the trial orchestrator as the worker count grows.
#[derive(Debug, Clone, Parser)]
#[command(name = "segmentation-bench")]
struct Config {
    /// Segmenter under load.
    #[arg(long, value_enum, default_value_t = EngineKind::Synthetic)]
    engine: EngineKind,

    /// ICU model when `--engine icu`: auto, dictionary or lstm.
    #[arg(long, default_value = "auto", value_parser = parse_model)]
    model: WordModel,

    /// Tokens in the generated corpus.
    #[arg(long, default_value_t = 5_000, value_parser = parse_positive_usize)]
    tokens: usize,

    /// Trials per worker-count run.
    #[arg(long, default_value_t = 64, value_parser = parse_positive_usize)]
    trials: usize,

    /// Comma-separated worker counts to measure.
    #[arg(long = "workers", value_delimiter = ',', default_values_t = [1, 2, 4, 8], value_parser = parse_positive_usize)]
    worker_counts: Vec<usize>,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Debug, Clone)]
struct ScalingRow {
    workers: usize,
    elapsed_seconds: f64,
    latency: RunningStats,
    latencies_ms: Vec<f64>,
    f1: RunningStats,
    skipped: usize,
}

/// Breaks after every `width` characters. Cheap stand-in that keeps the
/// harness cost visible without a real segmenter behind it.
struct SyntheticEngine {
    width: usize,
    breaks: Vec<usize>,
    cursor: usize,
}

impl SyntheticEngine {
    fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            breaks: Vec::new(),
            cursor: 0,
        }
    }
}

impl SegmentationEngine for SyntheticEngine {
    fn set_text(&mut self, text: &str) -> Result<(), EngineError> {
        self.cursor = 0;
        self.breaks.clear();
        let mut chars = 0usize;
        for (offset, _) in text.char_indices().skip(1) {
            chars += 1;
            if chars % self.width == 0 {
                self.breaks.push(offset);
            }
        }
        if !text.is_empty() {
            self.breaks.push(text.len());
        }
        Ok(())
    }

    fn next_boundary(&mut self) -> Option<usize> {
        let boundary = self.breaks.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(boundary)
    }
}

fn main() {
    let config = Config::parse();
    if let Err(err) = run(&config) {
        eprintln!("segmentation-bench failed: {err}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), String> {
    let corpus = synthetic_corpus(config.tokens, config.seed);
    let mut rows = Vec::with_capacity(config.worker_counts.len());
    for &workers in &config.worker_counts {
        rows.push(measure(config, &corpus, workers)?);
    }

    let mut overall = RunningStats::new();
    for row in &rows {
        overall.merge(&row.latency);
    }

    println!("Segmentation worker scaling benchmark");
    println!("engine: {}", config.engine.as_str());
    if config.engine == EngineKind::Icu {
        println!("model: {}", config.model.as_str());
    }
    println!("tokens: {}", corpus.len());
    println!("text_bytes: {}", corpus.text_len());
    println!("trials_per_run: {}", config.trials);
    println!("seed: {}", config.seed);

    let baseline = rows
        .first()
        .map(|row| row.elapsed_seconds)
        .unwrap_or(0.0)
        .max(0.0001);
    for row in &rows {
        let trials_per_sec = config.trials as f64 / row.elapsed_seconds.max(0.0001);
        println!(
            "workers={} elapsed_seconds={:.4} throughput_trials_per_s={:.2} speedup={:.2} \
             latency_avg_ms={:.4} latency_p50_ms={:.4} latency_p95_ms={:.4} latency_p99_ms={:.4} \
             f1_mean={} skipped={}",
            row.workers,
            row.elapsed_seconds,
            trials_per_sec,
            baseline / row.elapsed_seconds.max(0.0001),
            row.latency.mean().unwrap_or(0.0),
            percentile(&row.latencies_ms, 0.50),
            percentile(&row.latencies_ms, 0.95),
            percentile(&row.latencies_ms, 0.99),
            row.f1
                .mean()
                .map(|mean| format!("{mean:.6}"))
                .unwrap_or_else(|| "n/a".to_string()),
            row.skipped,
        );
    }
    println!(
        "latency_all_runs_avg_ms: {:.4}",
        overall.mean().unwrap_or(0.0)
    );
    println!(
        "latency_all_runs_stddev_ms: {:.4}",
        overall.sample_variance().sqrt()
    );

    // Every run replays the same shuffles, so accuracy must not move with the
    // worker count.
    let reference = rows.first().and_then(|row| row.f1.mean());
    for row in &rows {
        let drift = match (reference, row.f1.mean()) {
            (Some(a), Some(b)) => (a - b).abs() > 1e-9,
            (None, None) => false,
            _ => true,
        };
        if drift {
            return Err(format!(
                "mean F1 with {} workers differs from the single run",
                row.workers
            ));
        }
    }
    Ok(())
}

fn measure(config: &Config, corpus: &Corpus, workers: usize) -> Result<ScalingRow, String> {
    let plan = TrialPlan {
        trials: config.trials,
        workers,
        seed: config.seed,
    };
    let mut latencies_ms = Vec::with_capacity(config.trials);
    let mut on_outcome = |outcome: &TrialOutcome| {
        if let TrialOutcome::Scored(record) = outcome {
            latencies_ms.push(record.latency_ms);
        }
    };

    let started_at = Instant::now();
    let aggregate = match config.engine {
        EngineKind::Icu => run_evaluation(
            corpus,
            &plan,
            || IcuWordEngine::new("th-TH", config.model),
            &mut on_outcome,
        ),
        EngineKind::Synthetic => {
            run_evaluation(corpus, &plan, || Ok(SyntheticEngine::new(3)), &mut on_outcome)
        }
    }
    .map_err(|err| err.to_string())?;
    let elapsed_seconds = started_at.elapsed().as_secs_f64();

    latencies_ms.sort_by(|a, b| a.total_cmp(b));
    Ok(ScalingRow {
        workers,
        elapsed_seconds,
        latency: aggregate.latency_ms,
        latencies_ms,
        f1: aggregate.f1,
        skipped: aggregate.failed,
    })
}

fn synthetic_corpus(tokens: usize, seed: u64) -> Corpus {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Corpus::from_tokens((0..tokens).map(|_| {
        let syllables = rng.gen_range(1..=3);
        (0..syllables)
            .map(|_| SYLLABLES[rng.gen_range(0..SYLLABLES.len())])
            .collect::<String>()
    }))
}

fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (((sorted.len() - 1) as f64) * quantile).round() as usize;
    sorted[idx]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_engine_breaks_on_character_boundaries() {
        let mut engine = SyntheticEngine::new(2);
        engine.set_text("กขคa").unwrap();
        let breaks: Vec<usize> = engine.boundaries().collect();
        assert_eq!(breaks, vec![6, 10]);
    }

    #[test]
    fn synthetic_corpus_is_seeded() {
        let a = synthetic_corpus(50, 7);
        let b = synthetic_corpus(50, 7);
        assert_eq!(a.text(), b.text());
        assert_eq!(a.len(), 50);
    }

    fn parse(args: &[&str]) -> Result<Config, clap::Error> {
        Config::try_parse_from(std::iter::once("segmentation-bench").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_cover_a_doubling_worker_sweep() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.engine, EngineKind::Synthetic);
        assert_eq!(config.model, WordModel::Auto);
        assert_eq!(config.worker_counts, vec![1, 2, 4, 8]);
        assert_eq!(config.trials, 64);
    }

    #[test]
    fn parses_worker_lists_and_rejects_bad_values() {
        let config = parse(&["--engine", "icu", "--model", "lstm", "--workers", "1,3,6"]).unwrap();
        assert_eq!(config.engine, EngineKind::Icu);
        assert_eq!(config.model, WordModel::Lstm);
        assert_eq!(config.worker_counts, vec![1, 3, 6]);

        assert!(parse(&["--workers", "2,0"]).is_err());
        assert!(parse(&["--trials", "0"]).is_err());
        assert!(parse(&["--engine", "regex"]).is_err());
        assert!(parse(&["--model", "rules"]).is_err());
    }

    #[test]
    fn percentile_picks_nearest_rank() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.5), 3.0);
        assert_eq!(percentile(&sorted, 0.99), 5.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }
}
