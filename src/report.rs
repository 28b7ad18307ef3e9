//! Daily recovery report: a fixed-format case summary followed by an LLM
//! narrative.

use crate::llm::{ChatClient, ChatMessage, ChatRequest, LlmOutcome};
use crate::pipeline::ScoredBorrower;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::fmt;

/// Cases listed individually in a report.
pub const MAX_REPORT_CASES: usize = 5;
pub const REPORT_MAX_TOKENS: u32 = 1000;
pub const NO_HIGH_RISK_MESSAGE: &str = "No high-risk borrowers identified for today's report.";

const REPORT_INSTRUCTIONS: &str = "Please generate a comprehensive daily recovery report. \
Include an overview, common characteristics of these high-risk borrowers, and general \
recommendations for the recovery team. Keep it actionable and concise.";

/// India Standard Time (UTC+05:30, no daylight saving).
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or_else(|| Utc.fix())
}

/// Header and key-case listing for a set of high-risk borrowers.
pub fn case_summary(cases: &[ScoredBorrower], generated_at: DateTime<FixedOffset>) -> String {
    let mut lines = vec![
        format!(
            "Daily Loan Recovery Report - {}\n",
            generated_at.format("%Y-%m-%d %H:%M:%S IST")
        ),
        format!("Total High-Risk Borrowers Identified Today: {}\n", cases.len()),
        "Key Cases for Immediate Review:\n".to_string(),
    ];

    for (i, case) in cases.iter().take(MAX_REPORT_CASES).enumerate() {
        lines.push(format!("Case {}: Borrower ID: {}", i + 1, case.borrower_id));
        lines.push(format!("  Risk Score: {:.2}", case.risk_score));
        lines.push(format!("  Segment: {}", case.segment.label()));
        lines.push(format!("  Assigned Strategy: {}", case.strategy.as_str()));
        lines.push(format!(
            "  Key Features: Monthly Income: {}, Loan Amount: {}, Missed Payments: {}, EMI Ratio: {:.2}",
            case.monthly_income, case.loan_amount, case.num_missed_payments, case.emi_to_income_ratio
        ));
        lines.push("-".repeat(30));
    }

    lines.join("\n")
}

pub fn report_request(summary: &str) -> ChatRequest {
    ChatRequest::new(vec![
        ChatMessage::system("You are an AI assistant generating daily loan recovery reports."),
        ChatMessage::user(format!("{}\n\n{}", summary, REPORT_INSTRUCTIONS)),
    ])
    .max_tokens(REPORT_MAX_TOKENS)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    pub summary: String,
    /// `None` when there was nothing to report and no LLM call was made.
    pub narrative: Option<LlmOutcome>,
}

impl fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)?;
        if let Some(narrative) = &self.narrative {
            write!(f, "\n\n{}", narrative.text_or_sentinel())?;
        }
        Ok(())
    }
}

/// Build the report for `cases` stamped with the current IST time.
pub fn generate_recovery_report(client: &dyn ChatClient, cases: &[ScoredBorrower]) -> RecoveryReport {
    generate_recovery_report_at(client, cases, Utc::now().with_timezone(&ist()))
}

pub fn generate_recovery_report_at(
    client: &dyn ChatClient,
    cases: &[ScoredBorrower],
    generated_at: DateTime<FixedOffset>,
) -> RecoveryReport {
    if cases.is_empty() {
        return RecoveryReport {
            summary: NO_HIGH_RISK_MESSAGE.to_string(),
            narrative: None,
        };
    }

    let summary = case_summary(cases, generated_at);
    let narrative = client.complete(&report_request(&summary));
    tracing::info!(
        cases = cases.len(),
        listed = cases.len().min(MAX_REPORT_CASES),
        generated = narrative.is_generated(),
        "recovery report built"
    );

    RecoveryReport {
        summary,
        narrative: Some(narrative),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::StubClient;
    use crate::llm::{FailureKind, HTTP_ERROR_SENTINEL};
    use crate::schema::Segment;
    use crate::strategy::RecoveryStrategy;
    use chrono::TimeZone;

    fn case(id: &str, score: f64) -> ScoredBorrower {
        ScoredBorrower {
            source_index: 0,
            borrower_id: id.to_string(),
            risk_score: score,
            segment: Segment::HighLoanBurden,
            strategy: RecoveryStrategy::from_score(score),
            monthly_income: 5000.0,
            loan_amount: 100000.0,
            num_missed_payments: 3.0,
            emi_to_income_ratio: 0.4,
        }
    }

    fn fixed_time() -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_summary_format() {
        let summary = case_summary(&[case("B1", 0.876)], fixed_time());

        assert!(summary.starts_with("Daily Loan Recovery Report - 2024-03-15 09:30:00 IST\n"));
        assert!(summary.contains("Total High-Risk Borrowers Identified Today: 1\n"));
        assert!(summary.contains("Case 1: Borrower ID: B1"));
        assert!(summary.contains("  Risk Score: 0.88"));
        assert!(summary.contains("  Segment: High Loan Burden, Critical Risk"));
        assert!(summary.contains(
            "  Assigned Strategy: Immediate legal notices & aggressive recovery attempts"
        ));
        assert!(summary.contains(
            "Monthly Income: 5000, Loan Amount: 100000, Missed Payments: 3, EMI Ratio: 0.40"
        ));
        assert!(summary.ends_with(&"-".repeat(30)));
    }

    #[test]
    fn test_report_lists_at_most_five_cases() {
        let cases: Vec<_> = (0..8).map(|i| case(&format!("B{}", i), 0.9)).collect();
        let stub = StubClient::replying("narrative");
        let report = generate_recovery_report_at(&stub, &cases, fixed_time());

        assert!(report.summary.contains("Total High-Risk Borrowers Identified Today: 8"));
        assert!(report.summary.contains("Case 5: Borrower ID: B4"));
        assert!(!report.summary.contains("Case 6"));
        assert_eq!(report.summary.matches("Case ").count(), 5);
        assert!(report.to_string().ends_with("\n\nnarrative"));

        let requests = stub.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, REPORT_MAX_TOKENS);
        assert!(requests[0].messages[1].content.contains(REPORT_INSTRUCTIONS));
    }

    #[test]
    fn test_empty_report_skips_llm() {
        let stub = StubClient::replying("unused");
        let report = generate_recovery_report_at(&stub, &[], fixed_time());

        assert_eq!(report.summary, NO_HIGH_RISK_MESSAGE);
        assert_eq!(report.narrative, None);
        assert!(stub.requests.borrow().is_empty());
    }

    #[test]
    fn test_failed_narrative_renders_sentinel() {
        let stub = StubClient {
            reply: LlmOutcome::Failed {
                kind: FailureKind::Http { status: 502 },
                reason: "bad gateway".to_string(),
            },
            requests: Default::default(),
        };
        let report = generate_recovery_report_at(&stub, &[case("B1", 0.8)], fixed_time());
        assert!(report.to_string().ends_with(HTTP_ERROR_SENTINEL));
    }
}
