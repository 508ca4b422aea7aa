use std::borrow::Cow;
use std::fmt;

use csv::ByteRecord;
use encoding_rs::Encoding;
use getset::Getters;
use log::{debug, info};
use rust_decimal::Decimal;

use super::context::{ErrorLog, ImportContext, ImportOptions, MoveLine, Row, RunningTotals};
use super::handlers::CellHandler;
use super::header::{process_header, ColumnKind, ColumnTable};
use super::preprocess::{detect_dialect, split_header};
use super::{BatchWriter, EntityType, FieldValue, ImportError, LineError, ReferenceLookup, TargetMove};

/// Precision domain used for the debit/credit balance check.
pub const ACCOUNT_PRECISION: &str = "Account";
pub const DEFAULT_LINE_NAME: &str = "/";

/// Lines and errors collected from one file, before the commit decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBatch {
    pub columns: ColumnTable,
    pub lines: Vec<MoveLine>,
    pub errors: ErrorLog,
    pub totals: RunningTotals,
}

#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct ErrorReport {
    errors: ErrorLog,
    skipped_columns: Vec<String>,
    totals: RunningTotals,
}

impl ErrorReport {
    pub fn render(&self) -> String {
        self.errors.render()
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<ParsedBatch> for ErrorReport {
    fn from(batch: ParsedBatch) -> Self {
        ErrorReport {
            skipped_columns: batch.columns.skipped().map(|column| column.name.clone()).collect(),
            errors: batch.errors,
            totals: batch.totals,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Committed { lines: usize },
    Rejected(ErrorReport),
}

/// Reads the file, commits the lines when no error was logged, returns the report otherwise.
pub fn import_move_lines(
    input: &[u8],
    target: &TargetMove,
    options: &ImportOptions,
    lookup: &dyn ReferenceLookup,
    writer: &mut dyn BatchWriter,
) -> Result<ImportOutcome, ImportError> {
    let batch = parse_move_lines(input, target, options, lookup)?;
    commit_or_report(batch, target, writer)
}

pub fn parse_move_lines(
    input: &[u8],
    target: &TargetMove,
    options: &ImportOptions,
    lookup: &dyn ReferenceLookup,
) -> Result<ParsedBatch, ImportError> {
    let encoding = Encoding::for_label(options.codepage.as_bytes())
        .ok_or_else(|| ImportError::UnknownCodepage(options.codepage.clone()))?;

    let split = split_header(input, options.csv_separator.as_byte(), options.comment_marker)?;
    let dialect = detect_dialect(split.body, options.csv_separator);
    debug!("using dialect {:?}", dialect);

    let header = decode(encoding, split.header)
        .ok_or_else(|| decode_error(options, split.header_line, "header"))?
        .to_lowercase();
    let tokens: Vec<String> = match dialect.reader_builder().from_reader(header.as_bytes()).records().next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => return Err(ImportError::NoHeaderFound),
    };

    let schema = lookup.field_schema(EntityType::MoveLine);
    let columns = process_header(&tokens, &schema)?;

    let mut ctx = ImportContext::new(options, target, lookup);
    let mut lines = Vec::new();
    let mut reader = dialect.reader_builder().from_reader(split.body);
    for record in reader.byte_records() {
        let record = record?;
        let line_no = split.header_line + record.position().map_or(0, |pos| pos.line() as usize);

        if let Some(line) = process_row(&record, line_no, &columns, encoding, &mut ctx)? {
            lines.push(line);
        }
    }

    check_balance(&mut ctx, lookup.precision(ACCOUNT_PRECISION));
    info!(
        "parsed {} move lines, {} errors, debit={}, credit={}",
        lines.len(),
        ctx.errors.len(),
        ctx.totals.debit,
        ctx.totals.credit
    );

    Ok(ParsedBatch {
        columns,
        lines,
        errors: ctx.errors,
        totals: ctx.totals,
    })
}

/// Nothing is written unless the error log is empty.
pub fn commit_or_report(
    batch: ParsedBatch,
    target: &TargetMove,
    writer: &mut dyn BatchWriter,
) -> Result<ImportOutcome, ImportError> {
    if !batch.errors.is_empty() {
        info!("import rejected, {} errors", batch.errors.len());
        return Ok(ImportOutcome::Rejected(batch.into()));
    }

    writer
        .commit_batch(target, &batch.lines)
        .map_err(ImportError::Commit)?;
    info!("committed {} lines to move {}", batch.lines.len(), target.id);

    Ok(ImportOutcome::Committed {
        lines: batch.lines.len(),
    })
}

fn decode<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    encoding.decode_without_bom_handling_and_without_replacement(bytes)
}

fn decode_error(options: &ImportOptions, line: usize, column: &str) -> ImportError {
    ImportError::Decode {
        codepage: options.codepage.clone(),
        line,
        column: column.to_string(),
    }
}

/// Decodes the cells the handlers will see. Ignored columns are only kept for
/// error messages, so they are decoded leniently.
fn decode_row(
    record: &ByteRecord,
    line_no: usize,
    columns: &ColumnTable,
    encoding: &'static Encoding,
    options: &ImportOptions,
) -> Result<Row, ImportError> {
    let mut cells = Vec::with_capacity(columns.len());
    for column in &columns.columns {
        let raw = record.get(column.index).unwrap_or_default();
        let text = match column.kind {
            ColumnKind::Handled(_) => {
                decode(encoding, raw).ok_or_else(|| decode_error(options, line_no, &column.name))?
            },
            ColumnKind::Skipped(_) => encoding.decode_without_bom_handling(raw).0,
        };
        cells.push(text.trim().to_string());
    }

    Ok(Row { cells })
}

fn process_row(
    record: &ByteRecord,
    line_no: usize,
    columns: &ColumnTable,
    encoding: &'static Encoding,
    ctx: &mut ImportContext,
) -> Result<Option<MoveLine>, ImportError> {
    if record.get(0).and_then(|cell| cell.first()) == Some(&ctx.options.comment_marker) {
        debug!("skipping comment line {}", line_no);
        return Ok(None);
    }

    let row = decode_row(record, line_no, columns, encoding, ctx.options)?;
    let mut line = MoveLine::new();
    for column in &columns.columns {
        let Some(handler) = column.handler() else {
            continue;
        };

        let cell = row.cell(column.index);
        if cell.is_empty() || line.is_set(handler.target()) {
            continue;
        }

        handler.handle(&column.name, cell, &row, ctx, &mut line);
    }

    if line.is_empty() {
        return Ok(None);
    }

    apply_defaults(&mut line);
    check_required(&line, &row, columns, ctx);

    Ok(Some(line))
}

fn apply_defaults(line: &mut MoveLine) {
    line.set("name", FieldValue::Text(DEFAULT_LINE_NAME.to_string()));
    line.set("debit", FieldValue::Decimal(Decimal::ZERO));
    line.set("credit", FieldValue::Decimal(Decimal::ZERO));
}

fn check_required(line: &MoveLine, row: &Row, columns: &ColumnTable, ctx: &mut ImportContext) {
    for field in columns.required.iter().filter(|field| !line.is_set(field)) {
        ctx.log_line_error(row, LineError::MissingRequired { field: field.clone() });
    }
}

/// Runs once per file, on the totals accumulated while the amounts were parsed.
fn check_balance(ctx: &mut ImportContext, precision: u32) {
    if !ctx.totals.is_balanced(precision) {
        ctx.errors.push_file(LineError::UnbalancedBatch {
            debit: ctx.totals.debit,
            credit: ctx.totals.credit,
        });
    }
}
