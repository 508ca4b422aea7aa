use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

pub mod catalog;
pub mod coerce;
pub mod context;
pub mod handlers;
pub mod header;
pub mod importer;
pub mod preprocess;
pub mod resolvers;

#[cfg(test)]
mod import_tests;

use context::MoveLine;

pub type RecordId = u32;

/// Fatal errors: the import stops and nothing is written.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no header line found in the input file")]
    NoHeaderFound,
    #[error("duplicate header field '{0}' found, please correct the input file")]
    DuplicateHeaderField(String),
    #[error("unknown code page '{0}'")]
    UnknownCodepage(String),
    #[error("wrong code page {codepage}: cannot decode column '{column}' on line {line}")]
    Decode {
        codepage: String,
        line: usize,
        column: String,
    },
    #[error("invalid {option} '{value}'")]
    InvalidOption { option: &'static str, value: char },
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("failed to commit move lines: {0}")]
    Commit(anyhow::Error),
}

/// Recoverable errors, accumulated in the error log while the import goes on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("incorrect value '{value}' for field '{field}' of type integer")]
    InvalidInteger { field: String, value: String },
    #[error("incorrect value '{value}' for field '{field}' of type numeric")]
    InvalidNumber { field: String, value: String },
    #[error(
        "incorrect value '{value}' for field '{field}' of type reference, \
         a database key is expected"
    )]
    InvalidReferenceKey { field: String, value: String },
    #[error("incorrect date format for field '{field}' with value '{value}', should be YYYY-MM-DD")]
    InvalidDate { field: String, value: String },
    #[error("{entity} '{token}' not found")]
    NotFound { entity: EntityType, token: String },
    #[error("multiple {entity} entries matching '{token}' found for field '{field}'")]
    Ambiguous {
        entity: EntityType,
        field: String,
        token: String,
    },
    #[error("amount '{value}' for field '{field}' overflows the running total")]
    TotalOverflow { field: String, value: String },
    #[error("the '{field}' field is required and must be correctly set")]
    MissingRequired { field: String },
    #[error("total debit ({debit}) is different from total credit ({credit})")]
    UnbalancedBatch { debit: Decimal, credit: Decimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Account,
    Partner,
    Product,
    Currency,
    TaxCode,
    AnalyticAccount,
    MoveLine,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityType::Account => "account",
            EntityType::Partner => "partner",
            EntityType::Product => "product",
            EntityType::Currency => "currency",
            EntityType::TaxCode => "tax code",
            EntityType::AnalyticAccount => "analytic account",
            EntityType::MoveLine => "move line",
        };
        f.write_str(name)
    }
}

/// Candidate filter applied by the backend before matching a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Partners without a parent, or flagged as a company.
    CommercialPartners,
    /// Entries of one company that are open for posting
    /// (no view, closed or cancelled analytic accounts).
    PostableIn(RecordId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "char")]
    Text,
    Integer,
    #[serde(alias = "float")]
    Decimal,
    #[serde(alias = "many2one")]
    Reference,
    Date,
    Boolean,
    Selection,
    #[serde(other)]
    Other,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Reference => "reference",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Selection => "selection",
            FieldType::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldDescriptor {
    pub fn new(name: &str, field_type: FieldType, label: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            field_type,
            label: label.to_string(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Reference(RecordId),
    Date(NaiveDate),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Decimal(value) => write!(f, "{value}"),
            FieldValue::Reference(id) => write!(f, "{id}"),
            FieldValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// The journal entry receiving the imported lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TargetMove {
    pub id: RecordId,
    pub company_id: RecordId,
}

/// Read side of the host ledger.
pub trait ReferenceLookup {
    fn lookup_by_primary(&self, entity: EntityType, key: &str, scope: Scope) -> Vec<RecordId>;
    fn lookup_by_name(&self, entity: EntityType, name: &str, scope: Scope) -> Vec<RecordId>;

    /// `(code, id)` of every account of the company that accepts postings.
    fn postable_accounts(&self, company_id: RecordId) -> Vec<(String, RecordId)>;

    fn field_schema(&self, entity: EntityType) -> Vec<FieldDescriptor>;
    fn precision(&self, domain: &str) -> u32;
}

/// Write side of the host ledger. A call is all or nothing.
pub trait BatchWriter {
    fn commit_batch(&mut self, target: &TargetMove, lines: &[MoveLine]) -> Result<()>;
}
