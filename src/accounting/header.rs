use std::collections::HashSet;
use std::fmt;

use log::{debug, error};

use super::handlers::{
    Account, AnalyticAccount, CellHandler, CharField, Credit, Currency, Debit, DecimalField, DueDate, Handler,
    IntegerField, Partner, Product, ReferenceField, TaxCode,
};
use super::{FieldDescriptor, FieldType, ImportError};

/// Fields every accepted line must carry, whatever the header contains.
pub const REQUIRED_FIELDS: [&str; 3] = ["account_id", "debit", "credit"];

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    UnknownField,
    UnsupportedType(FieldType),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownField => f.write_str("undefined field"),
            SkipReason::UnsupportedType(field_type) => {
                write!(f, "import of fields of type '{field_type}' is not supported")
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Handled(Handler),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub index: usize,
    pub name: String,
    pub kind: ColumnKind,
    pub required: bool,
}

impl Column {
    pub fn handler(&self) -> Option<&Handler> {
        match &self.kind {
            ColumnKind::Handled(handler) => Some(handler),
            ColumnKind::Skipped(_) => None,
        }
    }
}

/// Per column dispatch table, built once from the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable {
    pub columns: Vec<Column>,
    /// Move line fields that must be set once a line has been processed.
    pub required: Vec<String>,
}

impl ColumnTable {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|column| matches!(column.kind, ColumnKind::Skipped(_)))
    }
}

/// Columns with a dedicated handler, matched before the move line schema.
pub fn pseudo_field(token: &str) -> Option<Handler> {
    let handler: Handler = match token {
        "account" => Account.into(),
        "debit" => Debit.into(),
        "credit" => Credit.into(),
        "partner" => Partner.into(),
        "product" => Product.into(),
        "date_maturity" | "due date" => DueDate.into(),
        "currency" => Currency.into(),
        "tax account" | "tax_code" => TaxCode.into(),
        "analytic account" => AnalyticAccount.into(),
        _ => return None,
    };

    Some(handler)
}

/// Everything from the first blank column on is a comment block.
pub fn truncate_at_blank(tokens: &[String]) -> &[String] {
    match tokens.iter().position(|token| token.is_empty()) {
        Some(blank) => &tokens[..blank],
        None => tokens,
    }
}

fn find_field<'a>(schema: &'a [FieldDescriptor], token: &str) -> Option<&'a FieldDescriptor> {
    schema
        .iter()
        .find(|field| field.name.to_lowercase() == token)
        .or_else(|| schema.iter().find(|field| field.label.to_lowercase() == token))
}

fn schema_handler(field: &FieldDescriptor) -> Result<Handler, SkipReason> {
    match field.field_type {
        FieldType::Text => Ok(CharField::new(&field.name).into()),
        FieldType::Integer => Ok(IntegerField::new(&field.name).into()),
        FieldType::Decimal => Ok(DecimalField::new(&field.name).into()),
        FieldType::Reference => Ok(ReferenceField::new(&field.name).into()),
        other => Err(SkipReason::UnsupportedType(other)),
    }
}

fn classify(index: usize, name: String, schema: &[FieldDescriptor]) -> Column {
    if let Some(handler) = pseudo_field(&name) {
        return Column {
            index,
            name,
            kind: ColumnKind::Handled(handler),
            required: false,
        };
    }

    let (kind, required) = match find_field(schema, &name) {
        Some(field) => match schema_handler(field) {
            Ok(handler) => (ColumnKind::Handled(handler), field.required),
            Err(reason) => (ColumnKind::Skipped(reason), false),
        },
        None => (ColumnKind::Skipped(SkipReason::UnknownField), false),
    };

    if let ColumnKind::Skipped(reason) = &kind {
        error!("column '{}' ignored while importing move lines: {}", name, reason);
    }

    Column {
        index,
        name,
        kind,
        required,
    }
}

pub fn process_header(tokens: &[String], schema: &[FieldDescriptor]) -> Result<ColumnTable, ImportError> {
    let tokens: Vec<String> = tokens.iter().map(|token| token.trim().to_lowercase()).collect();
    let tokens = truncate_at_blank(&tokens);

    let mut seen = HashSet::new();
    for token in tokens {
        if !seen.insert(token.as_str()) {
            return Err(ImportError::DuplicateHeaderField(token.clone()));
        }
    }

    let columns: Vec<Column> = tokens
        .iter()
        .enumerate()
        .map(|(index, token)| classify(index, token.clone(), schema))
        .collect();

    let mut required: Vec<String> = REQUIRED_FIELDS.iter().map(|field| field.to_string()).collect();
    for column in columns.iter().filter(|column| column.required) {
        if let Some(handler) = column.handler() {
            let target = handler.target().to_string();
            if !required.contains(&target) {
                required.push(target);
            }
        }
    }

    debug!("header processed, columns={:?}, required={:?}", tokens, required);

    Ok(ColumnTable { columns, required })
}
