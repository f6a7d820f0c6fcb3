use std::process::ExitCode;

use clap::Parser;
use corpus::Corpus;
use engine::IcuWordEngine;
use evaluator::{
    Args, EvalConfig, EvalError, EvaluationReport, print_corpus_summary, print_trial,
    run_evaluation, write_report_json,
};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() -> ExitCode {
    let config = Args::parse().into_config();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if config.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("segeval: tracing subscriber already installed");
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "evaluation failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &EvalConfig) -> Result<(), EvalError> {
    let corpus = Corpus::load(&config.corpus_path)?;
    print_corpus_summary(config, &corpus);

    // Surface a bad locale or missing model data before any worker starts.
    let probe = IcuWordEngine::new(&config.locale, config.model).map_err(EvalError::Engine)?;
    info!(
        locale = %probe.locale(),
        model = probe.model().as_str(),
        trials = config.trials,
        workers = config.workers,
        seed = config.seed,
        "starting evaluation"
    );
    drop(probe);

    let aggregate = run_evaluation(
        &corpus,
        &config.plan(),
        || IcuWordEngine::new(&config.locale, config.model),
        |outcome| {
            if config.verbose {
                print_trial(outcome);
            }
        },
    )?;

    let report = EvaluationReport::new(config, &corpus, &aggregate);
    println!();
    print!("{report}");

    if let Some(path) = &config.report_out {
        write_report_json(path, &report)?;
        info!(path = %path.display(), "report written");
    }

    if aggregate.scored == 0 {
        return Err(EvalError::NoScoredTrials {
            degenerate: aggregate.degenerate,
            failed: aggregate.failed,
        });
    }
    Ok(())
}
