use chrono::NaiveDate;
use enum_dispatch::enum_dispatch;

use super::coerce::{parse_decimal, parse_integer};
use super::context::{ImportContext, MoveLine, Row};
use super::resolvers::{
    resolve_account, resolve_analytic_account, resolve_currency, resolve_partner, resolve_product, resolve_tax_code,
};
use super::{EntityType, FieldValue, LineError, RecordId};

const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

#[enum_dispatch]
pub trait CellHandler {
    /// Move line field written by this handler.
    fn target(&self) -> &str;

    /// Converts one non-empty cell and stores it on `line`, or logs why it could not.
    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine);
}

#[enum_dispatch(CellHandler)]
#[derive(Debug, Clone, PartialEq)]
pub enum Handler {
    Account,
    Debit,
    Credit,
    Partner,
    Product,
    DueDate,
    Currency,
    TaxCode,
    AnalyticAccount,
    CharField,
    IntegerField,
    DecimalField,
    ReferenceField,
}

fn store(ctx: &mut ImportContext, row: &Row, line: &mut MoveLine, field: &str, value: Result<FieldValue, LineError>) {
    match value {
        Ok(value) => line.set(field, value),
        Err(err) => ctx.log_line_error(row, err),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account;

impl CellHandler for Account {
    fn target(&self) -> &str {
        "account_id"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = resolve_account(&ctx.accounts, cell)
            .into_result(EntityType::Account, column, cell)
            .map(FieldValue::Reference);
        store(ctx, row, line, self.target(), value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Debit;

impl CellHandler for Debit {
    fn target(&self) -> &str {
        "debit"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        match parse_decimal(cell, ctx.options.decimal_separator) {
            Some(amount) => match ctx.totals.debit.checked_add(amount) {
                Some(total) => {
                    ctx.totals.debit = total;
                    line.set(self.target(), FieldValue::Decimal(amount));
                },
                None => ctx.log_line_error(row, total_overflow(column, cell)),
            },
            None => ctx.log_line_error(row, invalid_number(column, cell)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credit;

impl CellHandler for Credit {
    fn target(&self) -> &str {
        "credit"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        match parse_decimal(cell, ctx.options.decimal_separator) {
            Some(amount) => match ctx.totals.credit.checked_add(amount) {
                Some(total) => {
                    ctx.totals.credit = total;
                    line.set(self.target(), FieldValue::Decimal(amount));
                },
                None => ctx.log_line_error(row, total_overflow(column, cell)),
            },
            None => ctx.log_line_error(row, invalid_number(column, cell)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partner;

impl CellHandler for Partner {
    fn target(&self) -> &str {
        "partner_id"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = resolve_partner(ctx.lookup, cell)
            .into_result(EntityType::Partner, column, cell)
            .map(FieldValue::Reference);
        store(ctx, row, line, self.target(), value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product;

impl CellHandler for Product {
    fn target(&self) -> &str {
        "product_id"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = resolve_product(ctx.lookup, cell)
            .into_result(EntityType::Product, column, cell)
            .map(FieldValue::Reference);
        store(ctx, row, line, self.target(), value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DueDate;

impl CellHandler for DueDate {
    fn target(&self) -> &str {
        "date_maturity"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = NaiveDate::parse_from_str(cell, DUE_DATE_FORMAT)
            .map(FieldValue::Date)
            .map_err(|_| LineError::InvalidDate {
                field: column.to_string(),
                value: cell.to_string(),
            });
        store(ctx, row, line, self.target(), value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Currency;

impl CellHandler for Currency {
    fn target(&self) -> &str {
        "currency_id"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = resolve_currency(ctx.lookup, cell)
            .into_result(EntityType::Currency, column, cell)
            .map(FieldValue::Reference);
        store(ctx, row, line, self.target(), value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxCode;

impl CellHandler for TaxCode {
    fn target(&self) -> &str {
        "tax_code_id"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = resolve_tax_code(ctx.lookup, cell)
            .into_result(EntityType::TaxCode, column, cell)
            .map(FieldValue::Reference);
        store(ctx, row, line, self.target(), value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticAccount;

impl CellHandler for AnalyticAccount {
    fn target(&self) -> &str {
        "analytic_account_id"
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = resolve_analytic_account(ctx.lookup, cell, ctx.target.company_id)
            .into_result(EntityType::AnalyticAccount, column, cell)
            .map(FieldValue::Reference);
        store(ctx, row, line, self.target(), value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharField {
    field: String,
}

impl CharField {
    pub fn new(field: &str) -> CharField {
        CharField {
            field: field.to_string(),
        }
    }
}

impl CellHandler for CharField {
    fn target(&self) -> &str {
        &self.field
    }

    fn handle(&self, _column: &str, cell: &str, _row: &Row, _ctx: &mut ImportContext, line: &mut MoveLine) {
        line.set(&self.field, FieldValue::Text(cell.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerField {
    field: String,
}

impl IntegerField {
    pub fn new(field: &str) -> IntegerField {
        IntegerField {
            field: field.to_string(),
        }
    }
}

impl CellHandler for IntegerField {
    fn target(&self) -> &str {
        &self.field
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = parse_integer(cell, ctx.options.decimal_separator)
            .map(FieldValue::Integer)
            .ok_or_else(|| LineError::InvalidInteger {
                field: column.to_string(),
                value: cell.to_string(),
            });
        store(ctx, row, line, &self.field, value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecimalField {
    field: String,
}

impl DecimalField {
    pub fn new(field: &str) -> DecimalField {
        DecimalField {
            field: field.to_string(),
        }
    }
}

impl CellHandler for DecimalField {
    fn target(&self) -> &str {
        &self.field
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = parse_decimal(cell, ctx.options.decimal_separator)
            .map(FieldValue::Decimal)
            .ok_or_else(|| invalid_number(column, cell));
        store(ctx, row, line, &self.field, value);
    }
}

/// Link to another record given directly by its database key.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceField {
    field: String,
}

impl ReferenceField {
    pub fn new(field: &str) -> ReferenceField {
        ReferenceField {
            field: field.to_string(),
        }
    }
}

impl CellHandler for ReferenceField {
    fn target(&self) -> &str {
        &self.field
    }

    fn handle(&self, column: &str, cell: &str, row: &Row, ctx: &mut ImportContext, line: &mut MoveLine) {
        let value = parse_integer(cell, ctx.options.decimal_separator)
            .and_then(|key| RecordId::try_from(key).ok())
            .map(FieldValue::Reference)
            .ok_or_else(|| LineError::InvalidReferenceKey {
                field: column.to_string(),
                value: cell.to_string(),
            });
        store(ctx, row, line, &self.field, value);
    }
}

fn invalid_number(column: &str, cell: &str) -> LineError {
    LineError::InvalidNumber {
        field: column.to_string(),
        value: cell.to_string(),
    }
}

fn total_overflow(column: &str, cell: &str) -> LineError {
    LineError::TotalOverflow {
        field: column.to_string(),
        value: cell.to_string(),
    }
}
