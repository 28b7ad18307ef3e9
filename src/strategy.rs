//! Risk score to recovery strategy mapping

use std::fmt;

/// Recovery action, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecoveryStrategy {
    AutomatedReminders,
    SettlementOffers,
    LegalAction,
}

impl RecoveryStrategy {
    /// Upper bound (inclusive) of the settlement band.
    pub const LEGAL_ABOVE: f64 = 0.75;
    /// Lower bound (inclusive) of the settlement band.
    pub const SETTLEMENT_FROM: f64 = 0.50;

    pub const fn ordered() -> [Self; 3] {
        [
            Self::AutomatedReminders,
            Self::SettlementOffers,
            Self::LegalAction,
        ]
    }

    /// Both 0.50 and 0.75 fall in the settlement band.
    pub fn from_score(score: f64) -> Self {
        if score > Self::LEGAL_ABOVE {
            Self::LegalAction
        } else if score >= Self::SETTLEMENT_FROM {
            Self::SettlementOffers
        } else {
            Self::AutomatedReminders
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LegalAction => "Immediate legal notices & aggressive recovery attempts",
            Self::SettlementOffers => "Settlement offers & repayment plans",
            Self::AutomatedReminders => "Automated reminders & monitoring",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience wrapper returning the strategy text for a score.
pub fn assign_recovery_strategy(score: f64) -> &'static str {
    RecoveryStrategy::from_score(score).as_str()
}
