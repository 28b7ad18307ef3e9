//! Integration tests for RecoveryForge

use chrono::TimeZone;
use recoveryforge::llm::{ChatRequest, LlmOutcome};
use recoveryforge::pipeline::PipelineConfig;
use recoveryforge::report::generate_recovery_report_at;
use recoveryforge::risk::RiskModelParams;
use recoveryforge::{
    assign_recovery_strategy, high_risk_cases, load_records, ChatClient, RecoveryPipeline,
    RecoveryStrategy, ScoredBorrower, Segment,
};
use std::cell::Cell;
use std::io::Write;
use tempfile::NamedTempFile;

const HEADER: &str = "Borrower_ID,Age,Gender,Employment_Type,Monthly_Income,Num_Dependents,\
Loan_ID,Loan_Amount,Loan_Tenure,Interest_Rate,Loan_Type,Collateral_Value,\
Outstanding_Loan_Amount,Monthly_EMI,Payment_History,Num_Missed_Payments,Days_Past_Due,\
Recovery_Status,Collection_Attempts,Collection_Method,Legal_Action_Taken";

fn clean_row(i: usize) -> String {
    format!(
        "BRW_{i},34,Female,Salaried,{income},1,LN_{i},{loan},48,8.5,Home,150000,40000,1800,\
On-Time,0,0,Fully Recovered,1,Calls,No",
        income = 9000 + i * 50,
        loan = 60000 + i * 500,
    )
}

fn delinquent_row(i: usize) -> String {
    format!(
        "BRW_{i},51,Male,Self-Employed,{income},4,LN_{i},{loan},120,14.0,Personal,0,280000,2600,\
Missed,{missed},{dpd},Written Off,9,Legal Notice,Yes",
        income = 2100 + i * 10,
        loan = 320000 + i * 700,
        missed = 6 + i % 4,
        dpd = 150 + i,
    )
}

/// Training CSV with alternating clean and delinquent borrowers plus a few
/// rows that preparation must drop.
fn create_training_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for i in 0..30 {
        let row = if i % 2 == 0 {
            clean_row(i)
        } else {
            delinquent_row(i)
        };
        writeln!(file, "{}", row).unwrap();
    }

    // Non-numeric income
    writeln!(file, "{}", clean_row(100).replace(",14000,", ",n/a,")).unwrap();
    // Empty cell
    writeln!(file, "{}", clean_row(101).replace("Female", "")).unwrap();
    // Unknown static category
    writeln!(file, "{}", clean_row(102).replace("On-Time", "Sometimes")).unwrap();

    file
}

fn config() -> PipelineConfig {
    PipelineConfig {
        risk: RiskModelParams {
            n_estimators: 25,
            ..RiskModelParams::default()
        },
        ..PipelineConfig::default()
    }
}

#[test]
fn test_end_to_end_pipeline() {
    let file = create_training_csv();
    let records = load_records(file.path()).unwrap();
    assert_eq!(records.len(), 33);

    let (pipeline, summary) = RecoveryPipeline::train(&records, config()).unwrap();

    assert_eq!(summary.prepared_rows, 30);
    assert_eq!(summary.dropped.missing_value, 1);
    assert_eq!(summary.dropped.invalid_number, 1);
    assert_eq!(summary.dropped.unknown_category, 1);
    assert_eq!(summary.dropped.total(), 3);
    assert_eq!(summary.train_rows, 24);
    assert_eq!(summary.holdout_rows, 6);
    assert_eq!(summary.cluster_sizes.len(), Segment::COUNT);
    assert_eq!(summary.cluster_sizes.iter().sum::<usize>(), 30);
    assert!(summary.inertia.is_finite() && summary.inertia >= 0.0);

    let evaluation = summary.evaluation.expect("holdout evaluation");
    assert_eq!(evaluation.confusion.total(), 6);
    assert!((0.0..=1.0).contains(&evaluation.accuracy));

    let outcome = pipeline.score(&records).unwrap();
    assert_eq!(outcome.scored.len(), 30);
    assert_eq!(outcome.dropped.total(), 3);

    for scored in &outcome.scored {
        assert!((0.0..=1.0).contains(&scored.risk_score));
        assert_eq!(scored.strategy.as_str(), assign_recovery_strategy(scored.risk_score));
        assert!(scored.borrower_id.starts_with("BRW_"));
    }

    let first_delinquent = outcome
        .scored
        .iter()
        .find(|s| s.borrower_id == "BRW_1")
        .unwrap();
    assert!(first_delinquent.risk_score > 0.5);
    assert!((first_delinquent.emi_to_income_ratio - 2600.0 / 2110.0).abs() < 1e-6);

    let first_clean = outcome
        .scored
        .iter()
        .find(|s| s.borrower_id == "BRW_0")
        .unwrap();
    assert!(first_clean.risk_score < 0.5);
}

#[test]
fn test_scoring_file_without_targets() {
    let training = create_training_csv();
    let records = load_records(training.path()).unwrap();
    let (pipeline, _) = RecoveryPipeline::train(&records, config()).unwrap();

    let mut fresh = NamedTempFile::new().unwrap();
    let header_without_status = HEADER.replace("Recovery_Status,", "");
    writeln!(fresh, "{}", header_without_status).unwrap();
    writeln!(fresh, "{}", clean_row(200).replace("Fully Recovered,", "")).unwrap();
    writeln!(fresh, "{}", delinquent_row(201).replace("Written Off,", "")).unwrap();

    let new_records = load_records(fresh.path()).unwrap();
    let outcome = pipeline.score(&new_records).unwrap();

    assert_eq!(outcome.scored.len(), 2);
    assert!(outcome.scored[1].risk_score > outcome.scored[0].risk_score);
}

#[test]
fn test_truncated_row_is_dropped_not_fatal() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for i in 0..20 {
        let row = if i % 2 == 0 {
            clean_row(i)
        } else {
            delinquent_row(i)
        };
        writeln!(file, "{}", row).unwrap();
    }
    let truncated: Vec<String> = clean_row(300).split(',').take(10).map(str::to_string).collect();
    writeln!(file, "{}", truncated.join(",")).unwrap();

    let records = load_records(file.path()).unwrap();
    assert_eq!(records.len(), 21);

    let (_, summary) = RecoveryPipeline::train(&records, config()).unwrap();
    assert_eq!(summary.prepared_rows, 20);
    assert_eq!(summary.dropped.missing_value, 1);
    assert_eq!(summary.dropped.total(), 1);
}

#[test]
fn test_training_rejects_missing_column() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Borrower_ID,Monthly_Income").unwrap();
    writeln!(file, "B1,5000").unwrap();

    let records = load_records(file.path()).unwrap();
    assert!(RecoveryPipeline::train(&records, config()).is_err());
}

struct CountingClient {
    calls: Cell<usize>,
}

impl ChatClient for CountingClient {
    fn complete(&self, _request: &ChatRequest) -> LlmOutcome {
        self.calls.set(self.calls.get() + 1);
        LlmOutcome::Generated("Focus on the legal-action cases first.".to_string())
    }
}

#[test]
fn test_high_risk_selection_and_report() {
    let scores = [0.95, 0.2, 0.81, 0.5, 0.66, 0.49, 0.77, 0.91, 0.1, 0.58];
    let scored: Vec<ScoredBorrower> = scores
        .iter()
        .enumerate()
        .map(|(i, &score)| ScoredBorrower {
            source_index: i,
            borrower_id: format!("B{}", i),
            risk_score: score,
            segment: Segment::BehavioralRisk,
            strategy: RecoveryStrategy::from_score(score),
            monthly_income: 4000.0,
            loan_amount: 90000.0,
            num_missed_payments: 2.0,
            emi_to_income_ratio: 0.5,
        })
        .collect();

    let cases = high_risk_cases(&scored, 0.5);
    assert_eq!(cases.len(), 6);
    assert_eq!(cases[0].borrower_id, "B0");

    let client = CountingClient { calls: Cell::new(0) };
    let report = generate_recovery_report_at(
        &client,
        &cases,
        recoveryforge::report::ist().with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap(),
    );

    assert!(report.summary.contains("Total High-Risk Borrowers Identified Today: 6"));
    assert_eq!(report.summary.matches("Borrower ID:").count(), 5);
    assert!(report.to_string().ends_with("Focus on the legal-action cases first."));
    assert_eq!(client.calls.get(), 1);
}

#[test]
fn test_segment_and_strategy_labels() {
    assert_eq!(
        Segment::from_cluster(1).map(|s| s.label()),
        Some("High Loan Burden, Critical Risk")
    );
    assert_eq!(
        assign_recovery_strategy(0.75),
        "Settlement offers & repayment plans"
    );
    assert_eq!(
        assign_recovery_strategy(0.7501),
        "Immediate legal notices & aggressive recovery attempts"
    );
    assert_eq!(assign_recovery_strategy(0.4999), "Automated reminders & monitoring");
}
