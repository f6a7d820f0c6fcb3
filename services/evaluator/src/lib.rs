pub mod config;
pub mod report;

use std::{collections::BTreeMap, io, path::PathBuf, sync::mpsc, time::Instant};

use corpus::{Corpus, CorpusError, ExpectedSegmentation};
use engine::{EngineError, SegmentationEngine};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scoring::{F1Score, TrialCounts, reconcile};
use stats::RunningStats;
use thiserror::Error;
use tracing::{debug, warn};

pub use config::{Args, EvalConfig};
pub use report::{EvaluationReport, print_corpus_summary, print_trial, write_report_json};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("segmentation engine construction failed: {0}")]
    Engine(#[source] EngineError),
    #[error("unable to write report '{}': {source}", .path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no trial produced a defined F1 score ({degenerate} undefined, {failed} failed)")]
    NoScoredTrials { degenerate: usize, failed: usize },
}

// ---------------------------------------------------------------------------
// Single trial
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPlan {
    pub trials: usize,
    pub workers: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub trial: usize,
    pub counts: TrialCounts,
    pub f1: F1Score,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Scored(TrialRecord),
    Failed { trial: usize, error: EngineError },
}

impl TrialOutcome {
    pub fn trial(&self) -> usize {
        match self {
            Self::Scored(record) => record.trial,
            Self::Failed { trial, .. } => *trial,
        }
    }
}

/// Shuffle source for one trial. Every trial gets its own ChaCha stream of the
/// run seed, so a trial's order does not depend on which worker ran it.
pub fn trial_rng(seed: u64, trial: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(trial as u64);
    rng
}

/// Shuffles the corpus, presents the text to the engine and scores the
/// boundaries it reports. Only `set_text` is timed.
pub fn run_trial<E>(
    engine: &mut E,
    corpus: &Corpus,
    trial: usize,
    seed: u64,
) -> Result<TrialRecord, EngineError>
where
    E: SegmentationEngine + ?Sized,
{
    let expected = ExpectedSegmentation::shuffled(corpus, &mut trial_rng(seed, trial));

    let started = Instant::now();
    engine.set_text(expected.text())?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    let counts = reconcile(expected.spans(), engine.boundaries());
    Ok(TrialRecord {
        trial,
        counts,
        f1: counts.f1(),
        latency_ms,
    })
}

fn execute<E: SegmentationEngine>(
    engine: &mut E,
    corpus: &Corpus,
    trial: usize,
    seed: u64,
) -> TrialOutcome {
    match run_trial(engine, corpus, trial, seed) {
        Ok(record) => TrialOutcome::Scored(record),
        Err(error) => TrialOutcome::Failed { trial, error },
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub f1: RunningStats,
    pub latency_ms: RunningStats,
    pub scored: usize,
    pub degenerate: usize,
    pub failed: usize,
}

impl Aggregate {
    pub fn record(&mut self, outcome: &TrialOutcome) {
        match outcome {
            TrialOutcome::Scored(record) => {
                self.latency_ms.push(record.latency_ms);
                match record.f1 {
                    F1Score::Defined(value) => {
                        self.f1.push(value);
                        self.scored += 1;
                    }
                    F1Score::Undefined(reason) => {
                        self.degenerate += 1;
                        warn!(
                            trial = record.trial,
                            reason = reason.as_str(),
                            "F1 undefined, excluded from aggregate"
                        );
                    }
                }
            }
            TrialOutcome::Failed { trial, error } => {
                self.failed += 1;
                warn!(trial = *trial, %error, "engine rejected trial text, trial skipped");
            }
        }
    }

    pub fn trials_seen(&self) -> usize {
        self.scored + self.degenerate + self.failed
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

enum WorkerMessage {
    Outcome(TrialOutcome),
    EngineFailed(EngineError),
}

/// Runs every trial of `plan` and folds the outcomes, in trial order, into one
/// [`Aggregate`].
///
/// Each worker thread builds its own engine with `make_engine`; engines are
/// never shared between threads. Outcomes travel back over a channel and only
/// the calling thread touches the aggregate. `on_outcome` sees every outcome
/// in trial order just before it is folded.
pub fn run_evaluation<E, F, O>(
    corpus: &Corpus,
    plan: &TrialPlan,
    make_engine: F,
    mut on_outcome: O,
) -> Result<Aggregate, EvalError>
where
    E: SegmentationEngine,
    F: Fn() -> Result<E, EngineError> + Sync,
    O: FnMut(&TrialOutcome),
{
    let mut aggregate = Aggregate::default();
    if plan.trials == 0 {
        return Ok(aggregate);
    }
    let workers = plan.workers.clamp(1, plan.trials);

    if workers == 1 {
        let mut engine = make_engine().map_err(EvalError::Engine)?;
        for trial in 0..plan.trials {
            let outcome = execute(&mut engine, corpus, trial, plan.seed);
            on_outcome(&outcome);
            aggregate.record(&outcome);
        }
        return Ok(aggregate);
    }

    let (tx, rx) = mpsc::channel::<WorkerMessage>();
    std::thread::scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let make_engine = &make_engine;
            scope.spawn(move || {
                let mut engine = match make_engine() {
                    Ok(engine) => engine,
                    Err(err) => {
                        let _ = tx.send(WorkerMessage::EngineFailed(err));
                        return;
                    }
                };
                debug!(worker, "worker engine ready");
                for trial in (worker..plan.trials).step_by(workers) {
                    let outcome = execute(&mut engine, corpus, trial, plan.seed);
                    if tx.send(WorkerMessage::Outcome(outcome)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(tx);

        // Dropping `rx` on an early return makes the remaining workers stop.
        let mut pending = BTreeMap::new();
        let mut next_trial = 0usize;
        for message in rx {
            match message {
                WorkerMessage::EngineFailed(err) => return Err(EvalError::Engine(err)),
                WorkerMessage::Outcome(outcome) => {
                    pending.insert(outcome.trial(), outcome);
                    while let Some(outcome) = pending.remove(&next_trial) {
                        on_outcome(&outcome);
                        aggregate.record(&outcome);
                        next_trial += 1;
                    }
                }
            }
        }
        Ok(())
    })?;

    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use engine::ScriptedEngine;

    use super::*;

    fn uniform_corpus() -> Corpus {
        Corpus::from_tokens(["aa", "bb", "cc", "dd"])
    }

    #[test]
    fn trial_rng_streams_differ_per_trial_and_repeat_per_seed() {
        let corpus = Corpus::from_tokens((0..32).map(|i| format!("w{i}")));
        let first = ExpectedSegmentation::shuffled(&corpus, &mut trial_rng(5, 0));
        let again = ExpectedSegmentation::shuffled(&corpus, &mut trial_rng(5, 0));
        let second = ExpectedSegmentation::shuffled(&corpus, &mut trial_rng(5, 1));
        assert_eq!(first, again);
        assert_ne!(first.text(), second.text());
    }

    #[test]
    fn run_trial_scores_a_perfect_engine() {
        let mut engine = ScriptedEngine::new([2, 4, 6, 8]);
        let record = run_trial(&mut engine, &uniform_corpus(), 3, 1).unwrap();
        assert_eq!(record.trial, 3);
        assert_eq!(record.counts.true_positive, 4);
        assert_eq!(record.f1, F1Score::Defined(1.0));
        assert!(record.latency_ms >= 0.0);
    }

    #[test]
    fn aggregate_separates_scored_degenerate_and_failed_trials() {
        let corpus = uniform_corpus();
        let mut aggregate = Aggregate::default();

        let mut perfect = ScriptedEngine::new([2, 4, 6, 8]);
        aggregate.record(&execute(&mut perfect, &corpus, 0, 1));

        let mut lumped = ScriptedEngine::new([8]);
        aggregate.record(&execute(&mut lumped, &corpus, 1, 1));

        let mut failing = ScriptedEngine::new([8]).rejecting_calls([0]);
        aggregate.record(&execute(&mut failing, &corpus, 2, 1));

        assert_eq!(aggregate.scored, 1);
        assert_eq!(aggregate.degenerate, 1);
        assert_eq!(aggregate.failed, 1);
        assert_eq!(aggregate.trials_seen(), 3);
        assert_eq!(aggregate.f1.count(), 1);
        assert_eq!(aggregate.latency_ms.count(), 2);
    }

    #[test]
    fn zero_trials_produce_an_empty_aggregate() {
        let plan = TrialPlan {
            trials: 0,
            workers: 4,
            seed: 0,
        };
        let aggregate = run_evaluation(
            &uniform_corpus(),
            &plan,
            || Ok(ScriptedEngine::new([8])),
            |_| {},
        )
        .unwrap();
        assert_eq!(aggregate, Aggregate::default());
    }
}
