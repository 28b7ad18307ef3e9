//! Fixed column names and static lookup tables shared by every stage.

use std::fmt;

/// Added to monthly income before dividing so zero incomes stay finite.
pub const EPSILON: f64 = 1e-6;

pub const MONTHLY_INCOME: &str = "Monthly_Income";
pub const LOAN_AMOUNT: &str = "Loan_Amount";
pub const MONTHLY_EMI: &str = "Monthly_EMI";
pub const COLLATERAL_VALUE: &str = "Collateral_Value";
pub const NUM_MISSED_PAYMENTS: &str = "Num_Missed_Payments";

pub const GENDER: &str = "Gender";
pub const PAYMENT_HISTORY: &str = "Payment_History";
pub const LEGAL_ACTION_TAKEN: &str = "Legal_Action_Taken";
pub const LOAN_TYPE: &str = "Loan_Type";
pub const EMPLOYMENT_TYPE: &str = "Employment_Type";
pub const COLLECTION_METHOD: &str = "Collection_Method";
pub const RECOVERY_STATUS: &str = "Recovery_Status";

pub const BORROWER_ID: &str = "Borrower_ID";
pub const LOAN_ID: &str = "Loan_ID";

pub const LOAN_TO_INCOME_RATIO: &str = "Loan_to_income_ratio";
pub const EMI_TO_INCOME_RATIO: &str = "EMI_to_income_ratio";
pub const HAS_COLLATERAL: &str = "Has_Collateral";

/// Columns coerced to numbers; a record failing any of them is dropped.
pub const NUMERIC_COLUMNS: [&str; 12] = [
    MONTHLY_INCOME,
    LOAN_AMOUNT,
    "Outstanding_Loan_Amount",
    MONTHLY_EMI,
    COLLATERAL_VALUE,
    "Age",
    "Num_Dependents",
    "Loan_Tenure",
    "Interest_Rate",
    NUM_MISSED_PAYMENTS,
    "Days_Past_Due",
    "Collection_Attempts",
];

/// Columns one-hot encoded against a vocabulary frozen at training time.
pub const ONE_HOT_COLUMNS: [&str; 2] = [EMPLOYMENT_TYPE, COLLECTION_METHOD];

/// Columns that identify a loan but carry no signal.
pub const IDENTIFIER_COLUMNS: [&str; 2] = [LOAN_ID, BORROWER_ID];

pub const DERIVED_COLUMNS: [&str; 3] = [LOAN_TO_INCOME_RATIO, EMI_TO_INCOME_RATIO, HAS_COLLATERAL];

/// A categorical column mapped to small integer codes through a fixed table.
pub trait CategoryCode: Sized + Copy + 'static {
    const COLUMN: &'static str;

    fn ordered() -> &'static [Self];

    fn label(self) -> &'static str;

    fn code(self) -> u8;

    fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ordered()
            .iter()
            .copied()
            .find(|candidate| candidate.label() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
}

impl CategoryCode for Gender {
    const COLUMN: &'static str = GENDER;

    fn ordered() -> &'static [Self] {
        &[Self::Male, Self::Female]
    }

    fn label(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }

    fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentHistory {
    OnTime,
    Delayed,
    Missed,
}

impl CategoryCode for PaymentHistory {
    const COLUMN: &'static str = PAYMENT_HISTORY;

    fn ordered() -> &'static [Self] {
        &[Self::OnTime, Self::Delayed, Self::Missed]
    }

    fn label(self) -> &'static str {
        match self {
            Self::OnTime => "On-Time",
            Self::Delayed => "Delayed",
            Self::Missed => "Missed",
        }
    }

    fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegalAction {
    No,
    Yes,
}

impl CategoryCode for LegalAction {
    const COLUMN: &'static str = LEGAL_ACTION_TAKEN;

    fn ordered() -> &'static [Self] {
        &[Self::No, Self::Yes]
    }

    fn label(self) -> &'static str {
        match self {
            Self::No => "No",
            Self::Yes => "Yes",
        }
    }

    fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoanType {
    Home,
    Auto,
    Personal,
    Business,
}

impl CategoryCode for LoanType {
    const COLUMN: &'static str = LOAN_TYPE;

    fn ordered() -> &'static [Self] {
        &[Self::Home, Self::Auto, Self::Personal, Self::Business]
    }

    fn label(self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::Auto => "Auto",
            Self::Personal => "Personal",
            Self::Business => "Business",
        }
    }

    fn code(self) -> u8 {
        self as u8
    }
}

/// Training target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryStatus {
    FullyRecovered,
    PartiallyRecovered,
    WrittenOff,
}

impl RecoveryStatus {
    /// Anything short of full recovery counts as a positive for the risk model.
    pub fn needs_recovery(self) -> bool {
        !matches!(self, Self::FullyRecovered)
    }
}

impl CategoryCode for RecoveryStatus {
    const COLUMN: &'static str = RECOVERY_STATUS;

    fn ordered() -> &'static [Self] {
        &[Self::FullyRecovered, Self::PartiallyRecovered, Self::WrittenOff]
    }

    fn label(self) -> &'static str {
        match self {
            Self::FullyRecovered => "Fully Recovered",
            Self::PartiallyRecovered => "Partially Recovered",
            Self::WrittenOff => "Written Off",
        }
    }

    fn code(self) -> u8 {
        self as u8
    }
}

/// Names of the static categorical columns in feature order.
pub const STATIC_CATEGORY_COLUMNS: [&str; 4] = [GENDER, PAYMENT_HISTORY, LEGAL_ACTION_TAKEN, LOAN_TYPE];

/// Behavioral segment produced by the 4-cluster model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    StableLowRisk,
    HighLoanBurden,
    BehavioralRisk,
    ManagedRisk,
}

impl Segment {
    pub const COUNT: usize = 4;

    pub const fn ordered() -> [Self; 4] {
        [
            Self::StableLowRisk,
            Self::HighLoanBurden,
            Self::BehavioralRisk,
            Self::ManagedRisk,
        ]
    }

    pub fn from_cluster(id: usize) -> Option<Self> {
        Self::ordered().get(id).copied()
    }

    pub const fn cluster_id(self) -> usize {
        self as usize
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::StableLowRisk => "Stable Income, Manageable Loan, Low Risk",
            Self::HighLoanBurden => "High Loan Burden, Critical Risk",
            Self::BehavioralRisk => "High Missed Payments, Behavioral Risk",
            Self::ManagedRisk => "High Income, Large Loan, Managed Risk",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
