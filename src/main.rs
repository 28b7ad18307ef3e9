//! RecoveryForge: loan recovery scoring CLI
//!
//! Trains the segmentation and risk models on a labelled CSV, scores a batch
//! of borrowers and optionally asks the LLM for explanations and the daily
//! recovery report.

use anyhow::{Context, Result};
use clap::Parser;
use recoveryforge::llm::{self, PredictionContext};
use recoveryforge::pipeline::TrainingSummary;
use recoveryforge::{
    high_risk_cases, load_records, strategy_distribution, telemetry, Args, BorrowerRecord,
    OpenRouterClient, RecoveryPipeline, ScoredBorrower,
};
use std::time::Instant;

/// Features passed to the explanation prompt.
const EXPLANATION_FEATURES: usize = 5;

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init(args.verbose)?;

    if args.verbose {
        println!("RecoveryForge - Loan Recovery Scoring");
        println!("=====================================\n");
    }

    let config = args.pipeline_config()?;
    let start_time = Instant::now();

    // Step 1: Load training data
    if args.verbose {
        println!("Step 1: Loading training data");
        println!("  Input file: {}", args.input);
    }
    let training = load_records(&args.input)?;
    println!("✓ Data loaded: {} borrowers", training.len());

    // Step 2: Train models
    if args.verbose {
        println!("\nStep 2: Training segmentation and risk models");
        println!("  Trees: {}", config.risk.n_estimators);
        println!("  Holdout ratio: {}", config.holdout_ratio);
        println!("  K-Means max iterations: {}", config.segmentation.max_iters);
    }
    let train_start = Instant::now();
    let (pipeline, summary) = RecoveryPipeline::train(&training, config)?;
    println!("✓ Models trained on {} prepared rows", summary.prepared_rows);
    if args.verbose {
        println!("  Training time: {:.2}s", train_start.elapsed().as_secs_f64());
        println!("  Features: {}", pipeline.schema().n_features());
    }
    print_training_summary(&summary);

    // Step 3: Score borrowers
    let score_path = args.score_path();
    let to_score = if args.score.is_some() {
        if args.verbose {
            println!("\nStep 3: Scoring borrowers from {}", score_path);
        }
        load_records(score_path)?
    } else {
        training
    };
    let outcome = pipeline.score(&to_score)?;
    println!("\n✓ Scored {} borrowers", outcome.scored.len());
    if outcome.dropped.total() > 0 {
        println!("  Dropped during preparation: {}", outcome.dropped);
    }

    println!("\n=== Strategy Distribution ===");
    for (strategy, count) in strategy_distribution(&outcome.scored) {
        println!("{}: {}", strategy, count);
    }

    let cases = high_risk_cases(&outcome.scored, pipeline.threshold());
    println!("\n=== High-Risk Borrowers (score > {}) ===", pipeline.threshold());
    println!("Total: {}", cases.len());
    for case in cases.iter().take(10) {
        println!(
            "  {} | score {:.2} | {} | {}",
            case.borrower_id, case.risk_score, case.segment, case.strategy
        );
    }

    if args.report || args.explain.is_some() {
        let client = OpenRouterClient::from_env()?;

        if let Some(borrower_id) = &args.explain {
            run_explanation(&client, &pipeline, &to_score, &outcome.scored, borrower_id)?;
        }

        if args.report {
            println!("\n=== Daily Recovery Report ===");
            let report = recoveryforge::generate_recovery_report(&client, &cases);
            println!("{}", report);
        }
    }

    println!("\n=== Pipeline Complete ===");
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

fn print_training_summary(summary: &TrainingSummary) {
    if summary.dropped.total() > 0 {
        println!("  Dropped during preparation: {}", summary.dropped);
    }

    println!("\n=== Segment Statistics ===");
    for (segment, &size) in recoveryforge::Segment::ordered()
        .iter()
        .zip(summary.cluster_sizes.iter())
    {
        let percentage = size as f64 / summary.prepared_rows as f64 * 100.0;
        println!(
            "Segment {} ({}): {} borrowers ({:.1}%)",
            segment.cluster_id(),
            segment,
            size,
            percentage
        );
    }
    println!("\nSilhouette score (sample): {:.3}", summary.silhouette);
    println!("Within-cluster sum of squares: {:.2}", summary.inertia);

    println!("\n=== Risk Model Evaluation ===");
    match &summary.evaluation {
        Some(evaluation) => println!(
            "Trained on {} rows, evaluated on {} held-out rows\n{}",
            summary.train_rows, summary.holdout_rows, evaluation
        ),
        None => println!("Too few rows to hold out; evaluation skipped"),
    }
}

fn run_explanation(
    client: &OpenRouterClient,
    pipeline: &RecoveryPipeline,
    records: &[BorrowerRecord],
    scored: &[ScoredBorrower],
    borrower_id: &str,
) -> Result<()> {
    let target = scored
        .iter()
        .find(|b| b.borrower_id == borrower_id)
        .with_context(|| format!("borrower {} was not scored", borrower_id))?;
    let record = records
        .get(target.source_index)
        .with_context(|| format!("no source record for borrower {}", borrower_id))?;

    let context = PredictionContext {
        borrower: record,
        risk_score: target.risk_score,
        strategy: target.strategy.as_str(),
        segment: target.segment.label(),
    };
    let importances = pipeline.top_features(EXPLANATION_FEATURES);

    println!("\n=== Explanation for {} ===", borrower_id);
    println!("{}", llm::explain_prediction(client, context, &importances));
    println!("\n=== Suggested Recovery Actions ===");
    println!("{}", llm::suggest_recovery_actions(client, context));

    Ok(())
}
