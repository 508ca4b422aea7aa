use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::debug;
use serde::de::DeserializeOwned;

use crate::accounting::catalog::Catalog;
use crate::accounting::context::{ImportOptions, MoveLine, DEFAULT_CODEPAGE};
use crate::accounting::{BatchWriter, TargetMove};

const DEFAULT_TARGET: TargetMove = TargetMove { id: 1, company_id: 1 };

#[derive(Debug, serde::Deserialize)]
struct PrecisionRecord {
    domain: String,
    digits: u32,
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        debug!("{} not found, skipping", path.display());
        return Ok(Vec::new());
    }

    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut records = Vec::new();
    for record in csv_reader.deserialize::<T>() {
        records.push(record.with_context(|| format!("invalid record in {}", path.display()))?);
    }

    debug!("loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Loads the reference data exported from the host ledger. Every file is optional.
pub fn load_catalog(dir: &Path) -> Result<Catalog> {
    let mut catalog = Catalog::new();
    catalog.accounts = read_records(&dir.join("accounts.csv"))?;
    catalog.partners = read_records(&dir.join("partners.csv"))?;
    catalog.products = read_records(&dir.join("products.csv"))?;
    catalog.currencies = read_records(&dir.join("currencies.csv"))?;
    catalog.tax_codes = read_records(&dir.join("tax_codes.csv"))?;
    catalog.analytic_accounts = read_records(&dir.join("analytic_accounts.csv"))?;

    let fields = read_records(&dir.join("move_line_fields.csv"))?;
    if !fields.is_empty() {
        catalog.move_line_fields = fields;
    }

    for precision in read_records::<PrecisionRecord>(&dir.join("precisions.csv"))? {
        catalog.precisions.insert(precision.domain, precision.digits);
    }

    Ok(catalog)
}

pub fn load_target_move(dir: &Path) -> Result<TargetMove> {
    let moves: Vec<TargetMove> = read_records(&dir.join("move.csv"))?;
    Ok(moves.into_iter().next().unwrap_or(DEFAULT_TARGET))
}

fn single_char(value: &str, option: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => bail!("{} must be a single character, got '{}'", option, value),
    }
}

/// `[csv_separator] [decimal_separator] [codepage]`, each falling back to its default.
pub fn parse_options(args: &[String]) -> Result<ImportOptions> {
    let defaults = ImportOptions::default();

    let csv_separator = match args.first() {
        Some(value) => single_char(value, "csv separator")?,
        None => defaults.csv_separator.as_char(),
    };
    let decimal_separator = match args.get(1) {
        Some(value) => single_char(value, "decimal separator")?,
        None => defaults.decimal_separator.as_char(),
    };
    let codepage = args.get(2).map(String::as_str).unwrap_or(DEFAULT_CODEPAGE);

    Ok(ImportOptions::new(csv_separator, decimal_separator, codepage)?)
}

/// Writes committed lines as CSV, one column per field found in the batch.
pub struct CsvJournal<W: Write> {
    writer: W,
}

impl<W: Write> CsvJournal<W> {
    pub fn new(writer: W) -> CsvJournal<W> {
        CsvJournal { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> BatchWriter for CsvJournal<W> {
    fn commit_batch(&mut self, target: &TargetMove, lines: &[MoveLine]) -> Result<()> {
        let fields: BTreeSet<&str> = lines
            .iter()
            .flat_map(|line| line.iter().map(|(field, _)| field.as_str()))
            .collect();

        let mut csv_writer = csv::WriterBuilder::new().from_writer(&mut self.writer);
        csv_writer.write_record(std::iter::once("move_id").chain(fields.iter().copied()))?;

        for line in lines {
            let mut record = vec![target.id.to_string()];
            record.extend(
                fields
                    .iter()
                    .map(|field| line.get(field).map(|value| value.to_string()).unwrap_or_default()),
            );
            csv_writer.write_record(&record)?;
        }

        csv_writer.flush()?;

        Ok(())
    }
}
