use std::collections::btree_map::Iter;
use std::collections::{BTreeMap, HashMap};

use getset::Getters;
use log::debug;
use rust_decimal::{Decimal, RoundingStrategy};

use super::coerce::{ColumnSeparator, DecimalSeparator};
use super::{FieldValue, ImportError, LineError, RecordId, ReferenceLookup, TargetMove};

pub const DEFAULT_CODEPAGE: &str = "Windows-1252";

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    pub csv_separator: ColumnSeparator,
    pub decimal_separator: DecimalSeparator,
    /// Encoding label of the system that produced the file, e.g. `Windows-1252` or `utf-8`.
    pub codepage: String,
    /// Lines starting with this byte are ignored.
    pub comment_marker: u8,
}

impl ImportOptions {
    pub fn new(csv_separator: char, decimal_separator: char, codepage: &str) -> Result<ImportOptions, ImportError> {
        Ok(ImportOptions {
            csv_separator: ColumnSeparator::try_from(csv_separator)?,
            decimal_separator: DecimalSeparator::try_from(decimal_separator)?,
            codepage: codepage.to_string(),
            ..ImportOptions::default()
        })
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            csv_separator: ColumnSeparator::Semicolon,
            decimal_separator: DecimalSeparator::Comma,
            codepage: DEFAULT_CODEPAGE.to_string(),
            comment_marker: b'#',
        }
    }
}

/// Field values collected for one move line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveLine(BTreeMap<String, FieldValue>);

impl MoveLine {
    pub fn new() -> MoveLine {
        MoveLine(BTreeMap::new())
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// A field is written once per line, later columns targeting it are ignored.
    pub fn set(&mut self, field: &str, value: FieldValue) {
        self.0.entry(field.to_string()).or_insert(value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String, FieldValue> {
        self.0.iter()
    }
}

/// One data line of the file, cells aligned with the effective header.
#[derive(Debug, Clone)]
pub struct Row {
    pub cells: Vec<String>,
}

impl Row {
    pub fn cell(&self, column: usize) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn render(&self, separator: ColumnSeparator) -> String {
        self.cells.join(&separator.as_char().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct ErrorEntry {
    /// The offending row as it appeared in the file; `None` for file level errors.
    context: Option<String>,
    error: LineError,
}

impl ErrorEntry {
    pub fn render(&self) -> String {
        match &self.context {
            Some(row) => format!("Error when processing line '{}':\n{}\n\n", row, self.error),
            None => format!("\nError in CSV file, {}\n", self.error),
        }
    }
}

/// Append-only log of recoverable errors for one import run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorLog {
    entries: Vec<ErrorEntry>,
}

impl ErrorLog {
    pub fn push_line(&mut self, row: String, error: LineError) {
        debug!("line error, row={}, err={}", row, error);
        self.entries.push(ErrorEntry {
            context: Some(row),
            error,
        });
    }

    pub fn push_file(&mut self, error: LineError) {
        debug!("file error, err={}", error);
        self.entries.push(ErrorEntry { context: None, error });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn render(&self) -> String {
        self.entries.iter().map(ErrorEntry::render).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningTotals {
    pub debit: Decimal,
    pub credit: Decimal,
}

impl RunningTotals {
    pub fn is_balanced(&self, precision: u32) -> bool {
        round(self.debit, precision) == round(self.credit, precision)
    }
}

fn round(amount: Decimal, precision: u32) -> Decimal {
    amount.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
}

/// State shared by every handler during one import run.
pub struct ImportContext<'a> {
    pub options: &'a ImportOptions,
    pub target: &'a TargetMove,
    pub lookup: &'a dyn ReferenceLookup,
    /// Account code to id, for the company of the target move.
    pub accounts: HashMap<String, RecordId>,
    pub errors: ErrorLog,
    pub totals: RunningTotals,
}

impl<'a> ImportContext<'a> {
    pub fn new(
        options: &'a ImportOptions,
        target: &'a TargetMove,
        lookup: &'a dyn ReferenceLookup,
    ) -> ImportContext<'a> {
        let accounts: HashMap<String, RecordId> = lookup.postable_accounts(target.company_id).into_iter().collect();
        debug!("cached {} accounts for company {}", accounts.len(), target.company_id);

        ImportContext {
            options,
            target,
            lookup,
            accounts,
            errors: ErrorLog::default(),
            totals: RunningTotals::default(),
        }
    }

    pub fn log_line_error(&mut self, row: &Row, error: LineError) {
        self.errors.push_line(row.render(self.options.csv_separator), error);
    }
}
