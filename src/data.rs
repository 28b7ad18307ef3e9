//! Borrower CSV loading

use crate::schema::{BORROWER_ID, LOAN_ID};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// One loan account's raw attributes, keyed by trimmed column name.
///
/// Records are never edited after loading; feature preparation reads them and
/// produces new values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorrowerRecord {
    fields: HashMap<String, String>,
}

impl BorrowerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for tests and synthetic data.
    pub fn with(mut self, column: &str, value: impl ToString) -> Self {
        self.fields
            .insert(column.trim().to_string(), value.to_string().trim().to_string());
        self
    }

    pub fn without(mut self, column: &str) -> Self {
        self.fields.remove(column);
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Borrower identifier, falling back to the loan id when absent.
    pub fn borrower_id(&self) -> Option<&str> {
        self.get(BORROWER_ID)
            .or_else(|| self.get(LOAN_ID))
            .filter(|id| !id.is_empty())
    }

    /// Column/value pairs sorted by column name.
    pub fn sorted_fields(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

impl<K: ToString, V: ToString> FromIterator<(K, V)> for BorrowerRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |record, (k, v)| record.with(&k.to_string(), v))
    }
}

/// Read borrower records from any CSV source with a header row.
///
/// Column names and cells are trimmed. Rows may be shorter or longer than the
/// header: missing trailing cells leave their columns absent and extra cells
/// are ignored, so feature preparation drops the short row instead of the
/// whole file failing to load.
pub fn read_records<R: Read>(reader: R) -> crate::Result<Vec<BorrowerRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        let record = headers
            .iter()
            .zip(row.iter())
            .map(|(column, value)| (column.as_str(), value))
            .collect::<BorrowerRecord>();
        records.push(record);
    }

    Ok(records)
}

/// Load borrower records from a CSV file.
pub fn load_records(file_path: impl AsRef<Path>) -> crate::Result<Vec<BorrowerRecord>> {
    let path = file_path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?;
    let records = read_records(file)?;

    if records.is_empty() {
        anyhow::bail!("No borrower rows found in {}", path.display());
    }

    tracing::debug!(rows = records.len(), path = %path.display(), "loaded borrower records");
    Ok(records)
}
