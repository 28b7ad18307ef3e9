//! Feature preparation: numeric coercion, categorical encoding, derived ratios
//! and standard scaling.
//!
//! The one-hot vocabulary is frozen from the training batch into an
//! [`EncodingSchema`] so every later batch produces the same columns. A record
//! that cannot be turned into a complete feature vector is dropped and counted
//! in the batch's [`DropReport`]; the rest of the batch carries on.

use crate::data::BorrowerRecord;
use crate::error::PipelineError;
use crate::schema::{
    self, CategoryCode, Gender, LegalAction, LoanType, PaymentHistory, RecoveryStatus,
};
use linfa::traits::{Fit, Transformer};
use linfa::Dataset;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2};
use std::collections::BTreeSet;
use std::fmt;

/// Why a record was left out of a prepared batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// A field was present but empty, or a required column was absent.
    MissingValue { column: String },
    /// A numeric field could not be coerced to a finite number.
    InvalidNumber { column: String },
    /// A static categorical field held a value outside its lookup table.
    UnknownCategory { column: String },
    /// A one-hot field held a category the schema never saw in training.
    UnseenCategory { column: String, value: String },
}

/// Per-reason counts of dropped records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropReport {
    pub missing_value: usize,
    pub invalid_number: usize,
    pub unknown_category: usize,
    pub unseen_category: usize,
}

impl DropReport {
    fn record(&mut self, reason: &DropReason) {
        match reason {
            DropReason::MissingValue { .. } => self.missing_value += 1,
            DropReason::InvalidNumber { .. } => self.invalid_number += 1,
            DropReason::UnknownCategory { .. } => self.unknown_category += 1,
            DropReason::UnseenCategory { .. } => self.unseen_category += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_value + self.invalid_number + self.unknown_category + self.unseen_category
    }
}

impl fmt::Display for DropReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dropped (missing: {}, invalid number: {}, unknown category: {}, unseen category: {})",
            self.total(),
            self.missing_value,
            self.invalid_number,
            self.unknown_category,
            self.unseen_category
        )
    }
}

/// Frozen category list for one one-hot column. The first (sorted) category is
/// the baseline and gets no column of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneHotVocabulary {
    pub column: String,
    pub categories: Vec<String>,
}

impl OneHotVocabulary {
    fn encoded_categories(&self) -> &[String] {
        self.categories.get(1..).unwrap_or(&[])
    }

    fn encode(&self, value: &str, out: &mut Vec<f64>) -> Result<(), DropReason> {
        if !self.categories.iter().any(|c| c == value) {
            return Err(DropReason::UnseenCategory {
                column: self.column.clone(),
                value: value.to_string(),
            });
        }
        out.extend(
            self.encoded_categories()
                .iter()
                .map(|c| if c == value { 1.0 } else { 0.0 }),
        );
        Ok(())
    }
}

/// The complete feature layout, fixed at training time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingSchema {
    vocabularies: Vec<OneHotVocabulary>,
    feature_names: Vec<String>,
}

impl EncodingSchema {
    /// Freeze the one-hot vocabulary from a training batch.
    ///
    /// Only records that preparation would keep contribute categories, so the
    /// vocabulary matches the rows that are actually trained on. One-hot
    /// columns absent from the whole batch are left out of the schema.
    pub fn fit(records: &[BorrowerRecord]) -> crate::Result<Self> {
        require_columns(records)?;

        let columns: Vec<&str> = schema::ONE_HOT_COLUMNS
            .into_iter()
            .filter(|column| {
                let present = records.iter().any(|r| r.contains(column));
                if !present {
                    tracing::debug!(column, "one-hot column absent from training batch");
                }
                present
            })
            .collect();

        let kept: Vec<&BorrowerRecord> = records
            .iter()
            .filter(|r| check_record(r).is_ok() && check_target(r).is_ok())
            .filter(|r| columns.iter().all(|column| r.contains(column)))
            .collect();

        let vocabularies = columns
            .iter()
            .map(|&column| {
                let categories: BTreeSet<String> = kept
                    .iter()
                    .filter_map(|r| r.get(column))
                    .map(str::to_string)
                    .collect();
                OneHotVocabulary {
                    column: column.to_string(),
                    categories: categories.into_iter().collect(),
                }
            })
            .collect();

        Ok(Self::from_vocabularies(vocabularies))
    }

    /// Build a schema from an explicit vocabulary, e.g. one restored from config.
    pub fn from_vocabularies(vocabularies: Vec<OneHotVocabulary>) -> Self {
        let mut feature_names: Vec<String> = schema::NUMERIC_COLUMNS
            .iter()
            .chain(schema::STATIC_CATEGORY_COLUMNS.iter())
            .map(|c| c.to_string())
            .collect();
        for vocabulary in &vocabularies {
            feature_names.extend(
                vocabulary
                    .encoded_categories()
                    .iter()
                    .map(|category| format!("{}_{}", vocabulary.column, category)),
            );
        }
        feature_names.extend(schema::DERIVED_COLUMNS.iter().map(|c| c.to_string()));

        Self {
            vocabularies,
            feature_names,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    pub fn vocabularies(&self) -> &[OneHotVocabulary] {
        &self.vocabularies
    }

    /// Turn a batch of raw records into feature vectors, dropping any record
    /// that cannot be fully encoded.
    pub fn prepare(&self, records: &[BorrowerRecord]) -> crate::Result<PreparedBatch> {
        require_columns(records)?;

        let mut rows = Vec::with_capacity(records.len());
        let mut dropped = DropReport::default();

        for (index, record) in records.iter().enumerate() {
            match self.prepare_record(record) {
                Ok((features, target)) => rows.push(PreparedRecord {
                    source_index: index,
                    borrower_id: record
                        .borrower_id()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("row-{}", index + 1)),
                    features,
                    target,
                }),
                Err(reason) => {
                    tracing::trace!(row = index + 1, ?reason, "dropping borrower record");
                    dropped.record(&reason);
                }
            }
        }

        if dropped.total() > 0 {
            tracing::debug!(kept = rows.len(), %dropped, "feature preparation dropped records");
        }

        Ok(PreparedBatch {
            feature_names: self.feature_names.clone(),
            rows,
            dropped,
        })
    }

    fn prepare_record(
        &self,
        record: &BorrowerRecord,
    ) -> Result<(Vec<f64>, Option<RecoveryStatus>), DropReason> {
        let numeric = check_record(record)?;
        let mut features = Vec::with_capacity(self.n_features());
        features.extend_from_slice(&numeric.values);
        features.extend(numeric.codes.iter().map(|&c| f64::from(c)));

        for vocabulary in &self.vocabularies {
            let value = required(record, &vocabulary.column)?;
            vocabulary.encode(value, &mut features)?;
        }

        let income = numeric.get(schema::MONTHLY_INCOME);
        features.push(numeric.get(schema::LOAN_AMOUNT) / (income + schema::EPSILON));
        features.push(numeric.get(schema::MONTHLY_EMI) / (income + schema::EPSILON));
        features.push(if numeric.get(schema::COLLATERAL_VALUE) > 0.0 {
            1.0
        } else {
            0.0
        });

        let target = check_target(record)?;
        Ok((features, target))
    }
}

/// Numeric fields and static category codes of a record that passed checks.
struct CheckedRecord {
    values: [f64; 12],
    codes: [u8; 4],
}

impl CheckedRecord {
    fn get(&self, column: &str) -> f64 {
        schema::NUMERIC_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.values[i])
            .unwrap_or(0.0)
    }
}

fn check_record(record: &BorrowerRecord) -> Result<CheckedRecord, DropReason> {
    // Any empty cell counts as missing, identifiers included.
    if let Some(column) = record
        .sorted_fields()
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(column, _)| column)
    {
        return Err(DropReason::MissingValue {
            column: column.to_string(),
        });
    }

    let mut values = [0.0; 12];
    for (slot, column) in values.iter_mut().zip(schema::NUMERIC_COLUMNS) {
        *slot = coerce_numeric(required(record, column)?).ok_or_else(|| {
            DropReason::InvalidNumber {
                column: column.to_string(),
            }
        })?;
    }

    let codes = [
        encode_static::<Gender>(record)?,
        encode_static::<PaymentHistory>(record)?,
        encode_static::<LegalAction>(record)?,
        encode_static::<LoanType>(record)?,
    ];

    Ok(CheckedRecord { values, codes })
}

/// The target is optional at scoring time, but a value outside the status
/// table drops the record.
fn check_target(record: &BorrowerRecord) -> Result<Option<RecoveryStatus>, DropReason> {
    record
        .get(schema::RECOVERY_STATUS)
        .map(|value| {
            RecoveryStatus::parse(value).ok_or_else(|| DropReason::UnknownCategory {
                column: schema::RECOVERY_STATUS.to_string(),
            })
        })
        .transpose()
}

fn required<'a>(record: &'a BorrowerRecord, column: &str) -> Result<&'a str, DropReason> {
    record.get(column).ok_or_else(|| DropReason::MissingValue {
        column: column.to_string(),
    })
}

fn encode_static<C: CategoryCode>(record: &BorrowerRecord) -> Result<u8, DropReason> {
    let value = required(record, C::COLUMN)?;
    C::parse(value)
        .map(C::code)
        .ok_or_else(|| DropReason::UnknownCategory {
            column: C::COLUMN.to_string(),
        })
}

/// Parse a cell as a finite number. `NaN` and infinities count as missing.
pub fn coerce_numeric(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// A batch-level check: a column no record carries is a schema problem rather
/// than a per-record one.
fn require_columns(records: &[BorrowerRecord]) -> crate::Result<()> {
    if records.is_empty() {
        return Err(PipelineError::EmptyDataset.into());
    }
    for column in schema::NUMERIC_COLUMNS
        .iter()
        .chain(schema::STATIC_CATEGORY_COLUMNS.iter())
    {
        if !records.iter().any(|r| r.contains(column)) {
            return Err(PipelineError::MissingColumn(column.to_string()).into());
        }
    }
    Ok(())
}

/// A record that survived preparation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    /// Position of the source record in the input batch.
    pub source_index: usize,
    pub borrower_id: String,
    pub features: Vec<f64>,
    pub target: Option<RecoveryStatus>,
}

/// Output of [`EncodingSchema::prepare`].
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub feature_names: Vec<String>,
    pub rows: Vec<PreparedRecord>,
    pub dropped: DropReport,
}

impl PreparedBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Feature vectors as an (n_rows, n_features) matrix.
    pub fn matrix(&self) -> crate::Result<Array2<f64>> {
        let n_features = self.feature_names.len();
        let data: Vec<f64> = self
            .rows
            .iter()
            .flat_map(|row| row.features.iter().copied())
            .collect();
        Ok(Array2::from_shape_vec((self.rows.len(), n_features), data)?)
    }

    /// Binary "needs recovery" labels, or `None` if any row lacks a target.
    pub fn binary_targets(&self) -> Option<Array1<usize>> {
        self.rows
            .iter()
            .map(|row| row.target.map(|t| usize::from(t.needs_recovery())))
            .collect::<Option<Vec<_>>>()
            .map(Array1::from)
    }

    pub fn value(&self, row: usize, feature: &str) -> Option<f64> {
        let column = self.feature_names.iter().position(|n| n == feature)?;
        self.rows.get(row).and_then(|r| r.features.get(column)).copied()
    }
}

/// Per-column standardisation fitted on training features.
///
/// Wraps linfa's standard [`LinearScaler`]; a constant column keeps a unit
/// scale, so it maps to zero instead of NaN.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    scaler: LinearScaler<f64>,
    n_features: usize,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> crate::Result<Self> {
        let dataset = Dataset::new(features.clone(), Array1::<usize>::zeros(features.nrows()));
        let scaler = LinearScaler::standard().fit(&dataset)?;
        Ok(Self {
            scaler,
            n_features: features.ncols(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn transform(&self, features: &Array2<f64>) -> crate::Result<Array2<f64>> {
        if features.ncols() != self.n_features {
            return Err(PipelineError::SchemaMismatch {
                expected: self.n_features,
                found: features.ncols(),
            }
            .into());
        }
        Ok(self.scaler.transform(features.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn borrower(id: &str) -> BorrowerRecord {
        BorrowerRecord::new()
            .with("Borrower_ID", id)
            .with("Loan_ID", format!("L-{}", id))
            .with("Age", 35)
            .with("Gender", "Male")
            .with("Employment_Type", "Salaried")
            .with("Monthly_Income", 5000)
            .with("Num_Dependents", 2)
            .with("Loan_Amount", 100000)
            .with("Loan_Tenure", 60)
            .with("Interest_Rate", 9.5)
            .with("Loan_Type", "Home")
            .with("Collateral_Value", 150000)
            .with("Outstanding_Loan_Amount", 80000)
            .with("Monthly_EMI", 2000)
            .with("Payment_History", "On-Time")
            .with("Num_Missed_Payments", 0)
            .with("Days_Past_Due", 0)
            .with("Collection_Attempts", 1)
            .with("Collection_Method", "Calls")
            .with("Legal_Action_Taken", "No")
            .with("Recovery_Status", "Fully Recovered")
    }

    fn sample_batch() -> Vec<BorrowerRecord> {
        vec![
            borrower("B1"),
            borrower("B2")
                .with("Employment_Type", "Self-Employed")
                .with("Collection_Method", "Legal Notice"),
            borrower("B3").with("Monthly_Income", "n/a"),
            borrower("B4").with("Gender", "Unknown"),
            borrower("B5").with("Collateral_Value", ""),
            borrower("B6")
                .with("Employment_Type", "Business Owner")
                .with("Recovery_Status", "Written Off"),
        ]
    }

    #[test]
    fn test_derived_ratios() {
        let encoding = EncodingSchema::fit(&[borrower("B1")]).unwrap();
        let batch = encoding.prepare(&[borrower("B1")]).unwrap();

        let lti = batch.value(0, schema::LOAN_TO_INCOME_RATIO).unwrap();
        let eti = batch.value(0, schema::EMI_TO_INCOME_RATIO).unwrap();
        assert!((lti - 20.0).abs() < 1e-6);
        assert!((eti - 0.4).abs() < 1e-6);
        assert_eq!(batch.value(0, schema::HAS_COLLATERAL), Some(1.0));
    }

    #[test]
    fn test_zero_income_stays_finite() {
        let record = borrower("B1").with("Monthly_Income", 0).with("Collateral_Value", 0);
        let encoding = EncodingSchema::fit(&[record.clone()]).unwrap();
        let batch = encoding.prepare(&[record]).unwrap();

        assert!(batch.value(0, schema::LOAN_TO_INCOME_RATIO).unwrap().is_finite());
        assert_eq!(batch.value(0, schema::HAS_COLLATERAL), Some(0.0));
    }

    #[test]
    fn test_invalid_records_are_dropped_and_counted() {
        let records = sample_batch();
        let encoding = EncodingSchema::fit(&records).unwrap();
        let batch = encoding.prepare(&records).unwrap();

        let ids: Vec<_> = batch.rows.iter().map(|r| r.borrower_id.as_str()).collect();
        assert_eq!(ids, vec!["B1", "B2", "B6"]);
        assert_eq!(batch.dropped.invalid_number, 1);
        assert_eq!(batch.dropped.unknown_category, 1);
        assert_eq!(batch.dropped.missing_value, 1);
        assert_eq!(batch.dropped.total(), 3);
    }

    #[test]
    fn test_every_output_value_is_finite() {
        let records = sample_batch();
        let encoding = EncodingSchema::fit(&records).unwrap();
        let batch = encoding.prepare(&records).unwrap();
        let matrix = batch.matrix().unwrap();

        assert_eq!(matrix.ncols(), encoding.n_features());
        assert!(matrix.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_one_hot_drops_first_category() {
        let records = sample_batch();
        let encoding = EncodingSchema::fit(&records).unwrap();

        // Employment: Business Owner (baseline), Salaried, Self-Employed
        // Collection: Calls (baseline), Legal Notice
        let one_hot: Vec<_> = encoding
            .feature_names()
            .iter()
            .filter(|n| n.starts_with("Employment_Type_") || n.starts_with("Collection_Method_"))
            .cloned()
            .collect();
        assert_eq!(
            one_hot,
            vec![
                "Employment_Type_Salaried",
                "Employment_Type_Self-Employed",
                "Collection_Method_Legal Notice",
            ]
        );
        assert_eq!(encoding.n_features(), 12 + 4 + 3 + 3);

        let batch = encoding.prepare(&records).unwrap();
        assert_eq!(batch.value(2, "Employment_Type_Salaried"), Some(0.0));
        assert_eq!(batch.value(2, "Employment_Type_Self-Employed"), Some(0.0));
        assert_eq!(batch.value(1, "Employment_Type_Self-Employed"), Some(1.0));
    }

    #[test]
    fn test_unseen_category_is_flagged_not_misaligned() {
        let encoding = EncodingSchema::fit(&sample_batch()).unwrap();
        let inference = vec![borrower("N1"), borrower("N2").with("Employment_Type", "Freelancer")];
        let batch = encoding.prepare(&inference).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.dropped.unseen_category, 1);
        assert_eq!(batch.rows[0].features.len(), encoding.n_features());
    }

    #[test]
    fn test_preparation_is_idempotent_on_clean_records() {
        let records = sample_batch();
        let encoding = EncodingSchema::fit(&records).unwrap();
        let first = encoding.prepare(&records).unwrap();

        let survivors: Vec<_> = first
            .rows
            .iter()
            .map(|r| records[r.source_index].clone())
            .collect();
        let second = encoding.prepare(&survivors).unwrap();

        assert_eq!(second.dropped.total(), 0);
        let first_features: Vec<_> = first.rows.iter().map(|r| &r.features).collect();
        let second_features: Vec<_> = second.rows.iter().map(|r| &r.features).collect();
        assert_eq!(first_features, second_features);
    }

    #[test]
    fn test_targets_are_binary_needs_recovery() {
        let records = sample_batch();
        let encoding = EncodingSchema::fit(&records).unwrap();
        let batch = encoding.prepare(&records).unwrap();

        let targets = batch.binary_targets().unwrap();
        assert_eq!(targets.to_vec(), vec![0, 0, 1]);
    }

    #[test]
    fn test_unknown_target_drops_record() {
        let records = vec![borrower("B1"), borrower("B2").with("Recovery_Status", "Pending")];
        let encoding = EncodingSchema::fit(&records).unwrap();
        let batch = encoding.prepare(&records).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.dropped.unknown_category, 1);
    }

    #[test]
    fn test_vocabulary_ignores_rows_dropped_for_their_target() {
        let records = vec![
            borrower("B1"),
            borrower("B2")
                .with("Employment_Type", "Contractor")
                .with("Recovery_Status", "Pending"),
        ];
        let encoding = EncodingSchema::fit(&records).unwrap();

        assert_eq!(encoding.vocabularies()[0].categories, vec!["Salaried"]);
        assert_eq!(encoding.feature_index("Employment_Type_Contractor"), None);
    }

    #[test]
    fn test_short_row_is_dropped_as_missing() {
        let records = vec![borrower("B1"), borrower("B2").without("Loan_Type")];
        let encoding = EncodingSchema::fit(&records).unwrap();
        let batch = encoding.prepare(&records).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.dropped.missing_value, 1);
    }

    #[test]
    fn test_missing_column_is_a_schema_error() {
        let records: Vec<_> = (0..3)
            .map(|i| borrower(&format!("B{}", i)).without("Age"))
            .collect();
        let err = EncodingSchema::fit(&records).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::MissingColumn("Age".to_string()))
        );
    }

    #[test]
    fn test_coerce_numeric_rejects_non_finite() {
        assert_eq!(coerce_numeric(" 42.5 "), Some(42.5));
        assert_eq!(coerce_numeric("NaN"), None);
        assert_eq!(coerce_numeric("inf"), None);
        assert_eq!(coerce_numeric("12,000"), None);
    }

    #[test]
    fn test_standard_scaler_handles_constant_columns() {
        let features =
            Array2::from_shape_vec((3, 2), vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0]).unwrap();
        let scaler = StandardScaler::fit(&features).unwrap();
        let scaled = scaler.transform(&features).unwrap();

        assert!(scaled[[0, 0]] < 0.0 && scaled[[2, 0]] > 0.0);
        assert!(scaled[[1, 0]].abs() < 1e-12);
        assert!((scaled[[0, 0]] + scaled[[2, 0]]).abs() < 1e-12);
        assert!(scaled.column(1).iter().all(|v| *v == 0.0));

        let wrong = Array2::<f64>::zeros((1, 3));
        let err = scaler.transform(&wrong).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::SchemaMismatch {
                expected: 2,
                found: 3
            })
        );
    }
}
