use anyhow::{bail, Result};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use super::catalog::*;
use super::context::{ImportOptions, MoveLine};
use super::importer::*;
use super::resolvers::*;
use super::*;
use crate::data::CsvJournal;

const TARGET: TargetMove = TargetMove { id: 7, company_id: 1 };

#[derive(Default)]
struct RecordingWriter {
    batches: Vec<(TargetMove, Vec<MoveLine>)>,
}

impl BatchWriter for RecordingWriter {
    fn commit_batch(&mut self, target: &TargetMove, lines: &[MoveLine]) -> Result<()> {
        self.batches.push((*target, lines.to_vec()));
        Ok(())
    }
}

struct FailingWriter;

impl BatchWriter for FailingWriter {
    fn commit_batch(&mut self, _target: &TargetMove, _lines: &[MoveLine]) -> Result<()> {
        bail!("database is read-only")
    }
}

fn account(id: RecordId, code: &str, company_id: RecordId, kind: AccountKind) -> AccountRecord {
    AccountRecord {
        id,
        code: code.to_string(),
        name: format!("Account {code}"),
        company_id,
        kind,
    }
}

fn partner(id: RecordId, reference: &str, name: &str, parent_id: Option<RecordId>) -> PartnerRecord {
    PartnerRecord {
        id,
        reference: reference.to_string(),
        name: name.to_string(),
        parent_id,
        is_company: false,
    }
}

fn analytic(id: RecordId, code: &str, name: &str, company_id: RecordId, state: AnalyticState) -> AnalyticAccountRecord {
    AnalyticAccountRecord {
        id,
        code: code.to_string(),
        name: name.to_string(),
        company_id,
        is_view: false,
        state,
    }
}

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.accounts = vec![
        account(1, "610000", 1, AccountKind::Regular),
        account(2, "400000", 1, AccountKind::Regular),
        account(3, "700000", 2, AccountKind::Regular),
        account(4, "100000", 1, AccountKind::View),
    ];
    catalog.partners = vec![
        partner(1, "P001", "Acme", None),
        partner(2, "", "Duplicate", None),
        partner(3, "", "Duplicate", None),
        partner(4, "", "Acme Contact", Some(1)),
        PartnerRecord {
            is_company: true,
            ..partner(5, "P005", "Subsidiary", Some(1))
        },
    ];
    catalog.products = vec![ProductRecord {
        id: 1,
        default_code: "PRD1".to_string(),
        name: "Widget".to_string(),
    }];
    catalog.currencies = vec![
        CurrencyRecord {
            id: 1,
            name: "EUR".to_string(),
        },
        CurrencyRecord {
            id: 2,
            name: "USD".to_string(),
        },
    ];
    catalog.tax_codes = vec![TaxCodeRecord {
        id: 1,
        code: "VAT21".to_string(),
        name: "VAT 21%".to_string(),
    }];
    catalog.analytic_accounts = vec![
        analytic(1, "AN1", "Project A", 1, AnalyticState::Open),
        analytic(2, "AN2", "Old project", 1, AnalyticState::Close),
        analytic(3, "AN1", "Project A", 2, AnalyticState::Open),
    ];
    catalog
}

fn parse(input: &str) -> Result<ParsedBatch> {
    Ok(parse_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog())?)
}

fn errors_of(batch: &ParsedBatch) -> Vec<LineError> {
    batch.errors.entries().iter().map(|entry| entry.error().clone()).collect()
}

fn decimal(line: &MoveLine, field: &str) -> Option<Decimal> {
    match line.get(field) {
        Some(FieldValue::Decimal(amount)) => Some(*amount),
        _ => None,
    }
}

#[test]
fn test_import_balanced_file() -> Result<()> {
    let input = "account;debit;credit\n610000;100,00;0,00\n610000;0,00;100,00\n";
    let mut writer = RecordingWriter::default();

    let outcome = import_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog(), &mut writer)?;

    assert_eq!(outcome, ImportOutcome::Committed { lines: 2 });
    assert_eq!(writer.batches.len(), 1);

    let (target, lines) = &writer.batches[0];
    assert_eq!(*target, TARGET);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].get("account_id"), Some(&FieldValue::Reference(1)));
    assert_eq!(lines[0].get("name"), Some(&FieldValue::Text("/".to_string())));
    assert_eq!(decimal(&lines[0], "debit"), Some(dec!(100)));
    assert_eq!(decimal(&lines[1], "credit"), Some(dec!(100)));

    let batch = parse(input)?;
    assert_eq!(batch.totals.debit, dec!(100));
    assert_eq!(batch.totals.credit, dec!(100));

    Ok(())
}

#[test]
fn test_import_unknown_account_vetoes_commit() -> Result<()> {
    let input = "account;debit;credit\n610000;100,00;0,00\n999999;0,00;100,00\n";
    let mut writer = RecordingWriter::default();

    let outcome = import_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog(), &mut writer)?;

    let ImportOutcome::Rejected(report) = outcome else {
        bail!("import with an unknown account should be rejected");
    };
    assert_eq!(writer.batches.is_empty(), true);

    let not_found: Vec<&LineError> = report
        .errors()
        .entries()
        .iter()
        .map(|entry| entry.error())
        .filter(|err| matches!(err, LineError::NotFound { .. }))
        .collect();
    assert_eq!(
        not_found,
        vec![&LineError::NotFound {
            entity: EntityType::Account,
            token: "999999".to_string(),
        }]
    );

    // The line still carries amounts, so the missing account is reported as well.
    assert_eq!(report.errors().len(), 2);
    assert!(report
        .render()
        .starts_with("Error when processing line '999999;0,00;100,00':\naccount '999999' not found\n\n"));

    Ok(())
}

#[test]
fn test_account_scoping() -> Result<()> {
    // 700000 belongs to another company, 100000 is a view account.
    let batch = parse("account;debit;credit\n700000;1;1\n100000;1;1\n")?;

    assert_eq!(
        errors_of(&batch)
            .iter()
            .filter(|err| matches!(err, LineError::NotFound { entity: EntityType::Account, .. }))
            .count(),
        2
    );

    Ok(())
}

#[test]
fn test_duplicate_header_is_fatal() -> Result<()> {
    let input = "account;account;debit;credit\n610000;610000;1;1\n";
    let mut writer = RecordingWriter::default();

    if let Err(err) = import_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog(), &mut writer) {
        assert!(matches!(err, ImportError::DuplicateHeaderField(_)));
    } else {
        bail!("duplicate header should abort the import");
    }
    assert_eq!(writer.batches.is_empty(), true);

    Ok(())
}

#[test]
fn test_no_header() -> Result<()> {
    if let Err(err) = parse("# nothing\n\n") {
        assert!(matches!(err.downcast_ref::<ImportError>(), Some(ImportError::NoHeaderFound)));
    } else {
        bail!("input without header should be rejected");
    }

    Ok(())
}

#[test]
fn test_balance_within_precision() -> Result<()> {
    let batch = parse("account;debit;credit\n610000;100,004;0\n400000;0;100,00\n")?;
    assert_eq!(batch.errors.is_empty(), true);

    Ok(())
}

#[test]
fn test_unbalanced_batch() -> Result<()> {
    let input = "account;debit;credit\n610000;100,02;0,00\n400000;0,00;100,00\n";
    let mut writer = RecordingWriter::default();

    let batch = parse(input)?;
    assert_eq!(
        errors_of(&batch),
        vec![LineError::UnbalancedBatch {
            debit: dec!(100.02),
            credit: dec!(100.00),
        }]
    );

    let outcome = commit_or_report(batch, &TARGET, &mut writer)?;
    let ImportOutcome::Rejected(report) = outcome else {
        bail!("unbalanced import should be rejected");
    };
    assert_eq!(writer.batches.is_empty(), true);
    assert_eq!(
        report.render(),
        "\nError in CSV file, total debit (100.02) is different from total credit (100.00)\n"
    );

    Ok(())
}

#[test]
fn test_total_overflow_is_logged() -> Result<()> {
    let input = "account;debit;credit\n\
                 610000;50000000000000000000000000000;0\n\
                 610000;50000000000000000000000000000;0\n";
    let mut writer = RecordingWriter::default();

    let batch = parse(input)?;
    assert_eq!(
        errors_of(&batch),
        vec![
            LineError::TotalOverflow {
                field: "debit".to_string(),
                value: "50000000000000000000000000000".to_string(),
            },
            LineError::UnbalancedBatch {
                debit: dec!(50000000000000000000000000000),
                credit: dec!(0),
            },
        ]
    );
    assert_eq!(batch.lines.len(), 2);
    assert_eq!(decimal(&batch.lines[1], "debit"), Some(dec!(0)));

    let outcome = commit_or_report(batch, &TARGET, &mut writer)?;
    assert!(matches!(outcome, ImportOutcome::Rejected(_)));
    assert_eq!(writer.batches.is_empty(), true);

    Ok(())
}

#[test]
fn test_custom_precision() -> Result<()> {
    let mut catalog = catalog();
    catalog.precisions.insert(ACCOUNT_PRECISION.to_string(), 0);

    let input = "account;debit;credit\n610000;100,4;0\n400000;0;100\n";
    let batch = parse_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog)?;
    assert_eq!(batch.errors.is_empty(), true);

    Ok(())
}

#[test]
fn test_ambiguous_partner() -> Result<()> {
    let batch = parse("account;partner;name;debit;credit\n610000;Duplicate;Rent;10,00;10,00\n")?;

    assert_eq!(
        errors_of(&batch),
        vec![LineError::Ambiguous {
            entity: EntityType::Partner,
            field: "partner".to_string(),
            token: "Duplicate".to_string(),
        }]
    );
    assert_eq!(
        batch.errors.entries()[0].context().as_deref(),
        Some("610000;Duplicate;Rent;10,00;10,00")
    );

    let line = &batch.lines[0];
    assert_eq!(line.is_set("partner_id"), false);
    assert_eq!(line.get("account_id"), Some(&FieldValue::Reference(1)));
    assert_eq!(line.get("name"), Some(&FieldValue::Text("Rent".to_string())));
    assert_eq!(decimal(line, "debit"), Some(dec!(10)));

    Ok(())
}

#[test]
fn test_partner_resolution() -> Result<()> {
    let catalog = catalog();

    assert_eq!(resolve_partner(&catalog, "P001"), Resolution::Found(1));
    assert_eq!(resolve_partner(&catalog, "Acme"), Resolution::Found(1));
    assert_eq!(resolve_partner(&catalog, "Duplicate"), Resolution::Ambiguous);
    // Contacts are not commercial partners, companies are even with a parent.
    assert_eq!(resolve_partner(&catalog, "Acme Contact"), Resolution::NotFound);
    assert_eq!(resolve_partner(&catalog, "Subsidiary"), Resolution::Found(5));

    Ok(())
}

#[test]
fn test_reference_resolvers() -> Result<()> {
    let catalog = catalog();

    assert_eq!(resolve_product(&catalog, "PRD1"), Resolution::Found(1));
    assert_eq!(resolve_product(&catalog, "Widget"), Resolution::Found(1));
    assert_eq!(resolve_product(&catalog, "Gadget"), Resolution::NotFound);
    assert_eq!(resolve_tax_code(&catalog, "VAT 21%"), Resolution::Found(1));
    assert_eq!(resolve_currency(&catalog, "usd"), Resolution::Found(2));
    assert_eq!(resolve_analytic_account(&catalog, "AN1", 1), Resolution::Found(1));
    assert_eq!(resolve_analytic_account(&catalog, "AN1", 2), Resolution::Found(3));
    assert_eq!(resolve_analytic_account(&catalog, "AN2", 1), Resolution::NotFound);
    assert_eq!(resolve_analytic_account(&catalog, "Old project", 1), Resolution::NotFound);

    Ok(())
}

#[test]
fn test_pseudo_field_columns() -> Result<()> {
    let input = "account;product;currency;tax account;analytic account;due date;debit;credit\n\
                 610000;Widget;eur;VAT21;Project A;2015-03-31;121,00;0\n\
                 400000;;;;;;0;121,00\n";
    let batch = parse(input)?;

    assert_eq!(errors_of(&batch), Vec::<LineError>::new());
    let line = &batch.lines[0];
    assert_eq!(line.get("product_id"), Some(&FieldValue::Reference(1)));
    assert_eq!(line.get("currency_id"), Some(&FieldValue::Reference(1)));
    assert_eq!(line.get("tax_code_id"), Some(&FieldValue::Reference(1)));
    assert_eq!(line.get("analytic_account_id"), Some(&FieldValue::Reference(1)));
    assert_eq!(
        line.get("date_maturity").map(|value| value.to_string()),
        Some("2015-03-31".to_string())
    );
    assert_eq!(batch.lines[1].is_set("product_id"), false);

    Ok(())
}

#[test]
fn test_invalid_cells_are_logged() -> Result<()> {
    let input = "account;currency;due date;debit;credit\n610000;XYZ;31/03/2015;abc;0\n";
    let batch = parse(input)?;

    assert_eq!(
        errors_of(&batch),
        vec![
            LineError::NotFound {
                entity: EntityType::Currency,
                token: "XYZ".to_string(),
            },
            LineError::InvalidDate {
                field: "due date".to_string(),
                value: "31/03/2015".to_string(),
            },
            LineError::InvalidNumber {
                field: "debit".to_string(),
                value: "abc".to_string(),
            },
        ]
    );
    // Unparsable debit falls back to the default and does not count in the totals.
    assert_eq!(decimal(&batch.lines[0], "debit"), Some(dec!(0)));
    assert_eq!(batch.totals.debit, dec!(0));

    Ok(())
}

#[test]
fn test_schema_typed_columns() -> Result<()> {
    let mut catalog = catalog();
    catalog
        .move_line_fields
        .push(FieldDescriptor::new("sequence", FieldType::Integer, "Sequence"));

    let input = "account;sequence;quantity;product_uom_id;debit;credit\n\
                 610000;1.000;2,5;3;1;0\n\
                 400000;x;y;-1;0;1\n";
    let batch = parse_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog)?;

    let line = &batch.lines[0];
    assert_eq!(line.get("sequence"), Some(&FieldValue::Integer(1000)));
    assert_eq!(decimal(line, "quantity"), Some(dec!(2.5)));
    assert_eq!(line.get("product_uom_id"), Some(&FieldValue::Reference(3)));

    assert_eq!(
        errors_of(&batch),
        vec![
            LineError::InvalidInteger {
                field: "sequence".to_string(),
                value: "x".to_string(),
            },
            LineError::InvalidNumber {
                field: "quantity".to_string(),
                value: "y".to_string(),
            },
            LineError::InvalidReferenceKey {
                field: "product_uom_id".to_string(),
                value: "-1".to_string(),
            },
        ]
    );

    Ok(())
}

#[test]
fn test_required_field_missing() -> Result<()> {
    let batch = parse("partner;debit;credit\nAcme;5;5\n")?;

    assert_eq!(
        errors_of(&batch),
        vec![LineError::MissingRequired {
            field: "account_id".to_string(),
        }]
    );

    let mut catalog = catalog();
    for field in catalog.move_line_fields.iter_mut().filter(|field| field.name == "ref") {
        field.required = true;
    }
    let input = "account;ref;debit;credit\n610000;INV/001;5;0\n400000;;0;5\n";
    let batch = parse_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog)?;
    assert_eq!(
        errors_of(&batch),
        vec![LineError::MissingRequired { field: "ref".to_string() }]
    );
    assert_eq!(batch.errors.entries()[0].context().as_deref(), Some("400000;;0;5"));

    Ok(())
}

#[test]
fn test_first_column_wins_for_a_field() -> Result<()> {
    let batch = parse("account;account_id;debit;credit\n610000;2;1;1\n")?;

    assert_eq!(errors_of(&batch), Vec::<LineError>::new());
    assert_eq!(batch.lines[0].get("account_id"), Some(&FieldValue::Reference(1)));

    Ok(())
}

#[test]
fn test_comments_and_blank_rows() -> Result<()> {
    let input = "# journal export\n\
                 ;;\n\
                 account;debit;credit;;remarks\n\
                 #610000;5;0\n\
                 ;;\n\
                 610000;10;0;;not imported\n\
                 400000;0;10\n";
    let batch = parse(input)?;

    assert_eq!(batch.columns.names(), vec!["account", "debit", "credit"]);
    assert_eq!(errors_of(&batch), Vec::<LineError>::new());
    assert_eq!(batch.lines.len(), 2);
    assert_eq!(batch.totals.debit, dec!(10));

    Ok(())
}

#[test]
fn test_unknown_column_does_not_veto() -> Result<()> {
    let input = "account;colour;debit;credit\n610000;blue;1;0\n400000;red;0;1\n";
    let mut writer = RecordingWriter::default();

    let batch = parse(input)?;
    assert_eq!(
        batch.columns.skipped().map(|column| column.name.as_str()).collect::<Vec<_>>(),
        vec!["colour"]
    );
    assert_eq!(batch.lines[0].is_set("colour"), false);

    let outcome = commit_or_report(batch, &TARGET, &mut writer)?;
    assert_eq!(outcome, ImportOutcome::Committed { lines: 2 });

    Ok(())
}

#[test]
fn test_skipped_columns_in_report() -> Result<()> {
    let input = "account;colour;debit;credit\n610000;blue;1;0\n";
    let mut writer = RecordingWriter::default();

    let outcome = import_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog(), &mut writer)?;
    let ImportOutcome::Rejected(report) = outcome else {
        bail!("unbalanced import should be rejected");
    };
    assert_eq!(report.skipped_columns(), &vec!["colour".to_string()]);
    assert_eq!(report.totals().debit, dec!(1));

    Ok(())
}

#[test]
fn test_dot_decimal_comma_separator() -> Result<()> {
    let options = ImportOptions::new(',', '.', "utf-8")?;
    let input = "account,name,debit,credit\n610000,\"Rent, March\",\"1,250.00\",0\n400000,,0,1250\n";

    let batch = parse_move_lines(input.as_bytes(), &TARGET, &options, &catalog())?;

    assert_eq!(errors_of(&batch), Vec::<LineError>::new());
    assert_eq!(
        batch.lines[0].get("name"),
        Some(&FieldValue::Text("Rent, March".to_string()))
    );
    assert_eq!(decimal(&batch.lines[0], "debit"), Some(dec!(1250)));

    Ok(())
}

#[test]
fn test_codepage_decoding() -> Result<()> {
    let input = b"account;name;debit;credit\n610000;Caf\xe9;1;1\n";

    let batch = parse_move_lines(input, &TARGET, &ImportOptions::default(), &catalog())?;
    assert_eq!(
        batch.lines[0].get("name"),
        Some(&FieldValue::Text("Caf\u{e9}".to_string()))
    );

    let options = ImportOptions::new(';', ',', "utf-8")?;
    if let Err(err) = parse_move_lines(input, &TARGET, &options, &catalog()) {
        assert!(matches!(err, ImportError::Decode { line: 2, ref column, .. } if column == "name"));
    } else {
        bail!("invalid utf-8 should abort the import");
    }

    let options = ImportOptions::new(';', ',', "klingon")?;
    if let Err(err) = parse_move_lines(input, &TARGET, &options, &catalog()) {
        assert!(matches!(err, ImportError::UnknownCodepage(_)));
    } else {
        bail!("unknown code page should abort the import");
    }

    Ok(())
}

#[test]
fn test_commit_failure() -> Result<()> {
    let input = "account;debit;credit\n610000;1;0\n400000;0;1\n";

    let mut writer = FailingWriter;
    if let Err(err) = import_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog(), &mut writer) {
        assert!(matches!(err, ImportError::Commit(_)));
    } else {
        bail!("writer failure should be reported");
    }

    Ok(())
}

#[test]
fn test_csv_journal_output() -> Result<()> {
    let input = "account;partner;debit;credit\n610000;P001;12,50;0\n400000;;0;12,50\n";
    let mut journal = CsvJournal::new(Vec::new());

    let outcome = import_move_lines(input.as_bytes(), &TARGET, &ImportOptions::default(), &catalog(), &mut journal)?;
    assert_eq!(outcome, ImportOutcome::Committed { lines: 2 });

    let output = String::from_utf8(journal.into_inner())?;
    assert_eq!(
        output,
        "move_id,account_id,credit,debit,name,partner_id\n\
         7,1,0,12.50,/,1\n\
         7,2,12.50,0,/,\n"
    );

    Ok(())
}
