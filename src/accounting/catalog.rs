use std::collections::HashMap;

use serde::Deserialize;

use super::{EntityType, FieldDescriptor, FieldType, RecordId, ReferenceLookup, Scope};

pub const DEFAULT_PRECISION: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    View,
    Consolidation,
    Closed,
    #[default]
    #[serde(other)]
    Regular,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountRecord {
    pub id: RecordId,
    pub code: String,
    pub name: String,
    pub company_id: RecordId,
    #[serde(rename = "type", default)]
    pub kind: AccountKind,
}

impl AccountRecord {
    fn is_postable(&self) -> bool {
        self.kind == AccountKind::Regular
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartnerRecord {
    pub id: RecordId,
    #[serde(rename = "ref", default)]
    pub reference: String,
    pub name: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub is_company: bool,
}

impl PartnerRecord {
    fn in_scope(&self, scope: Scope) -> bool {
        match scope {
            Scope::CommercialPartners => self.parent_id.is_none() || self.is_company,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductRecord {
    pub id: RecordId,
    #[serde(default)]
    pub default_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrencyRecord {
    pub id: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaxCodeRecord {
    pub id: RecordId,
    #[serde(default)]
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticState {
    Close,
    Cancelled,
    #[default]
    #[serde(other)]
    Open,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalyticAccountRecord {
    pub id: RecordId,
    #[serde(default)]
    pub code: String,
    pub name: String,
    pub company_id: RecordId,
    #[serde(default)]
    pub is_view: bool,
    #[serde(default)]
    pub state: AnalyticState,
}

impl AnalyticAccountRecord {
    fn in_scope(&self, scope: Scope) -> bool {
        match scope {
            Scope::PostableIn(company_id) => {
                self.company_id == company_id && !self.is_view && self.state == AnalyticState::Open
            },
            _ => true,
        }
    }
}

/// Reference data held in memory, typically loaded from CSV exports of the host ledger.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub accounts: Vec<AccountRecord>,
    pub partners: Vec<PartnerRecord>,
    pub products: Vec<ProductRecord>,
    pub currencies: Vec<CurrencyRecord>,
    pub tax_codes: Vec<TaxCodeRecord>,
    pub analytic_accounts: Vec<AnalyticAccountRecord>,
    pub move_line_fields: Vec<FieldDescriptor>,
    pub precisions: HashMap<String, u32>,
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog {
            accounts: Vec::new(),
            partners: Vec::new(),
            products: Vec::new(),
            currencies: Vec::new(),
            tax_codes: Vec::new(),
            analytic_accounts: Vec::new(),
            move_line_fields: default_move_line_fields(),
            precisions: HashMap::new(),
        }
    }
}

/// Move line fields exposed when the host does not provide its own schema.
pub fn default_move_line_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("name", FieldType::Text, "Name"),
        FieldDescriptor::new("ref", FieldType::Text, "Reference"),
        FieldDescriptor::new("quantity", FieldType::Decimal, "Quantity"),
        FieldDescriptor::new("amount_currency", FieldType::Decimal, "Amount Currency"),
        FieldDescriptor::new("tax_amount", FieldType::Decimal, "Tax/Base Amount"),
        FieldDescriptor::new("debit", FieldType::Decimal, "Debit"),
        FieldDescriptor::new("credit", FieldType::Decimal, "Credit"),
        FieldDescriptor::new("account_id", FieldType::Reference, "Account"),
        FieldDescriptor::new("partner_id", FieldType::Reference, "Partner"),
        FieldDescriptor::new("product_id", FieldType::Reference, "Product"),
        FieldDescriptor::new("product_uom_id", FieldType::Reference, "Unit of Measure"),
        FieldDescriptor::new("currency_id", FieldType::Reference, "Currency"),
        FieldDescriptor::new("tax_code_id", FieldType::Reference, "Tax Account"),
        FieldDescriptor::new("analytic_account_id", FieldType::Reference, "Analytic Account"),
        FieldDescriptor::new("date_maturity", FieldType::Date, "Due date"),
        FieldDescriptor::new("blocked", FieldType::Boolean, "No Follow-up"),
    ]
}

fn ids<T>(records: &[T], keep: impl Fn(&T) -> bool, id: impl Fn(&T) -> RecordId) -> Vec<RecordId> {
    records.iter().filter(|record| keep(record)).map(id).collect()
}

impl ReferenceLookup for Catalog {
    fn lookup_by_primary(&self, entity: EntityType, key: &str, scope: Scope) -> Vec<RecordId> {
        match entity {
            EntityType::Account => ids(
                &self.accounts,
                |account| account.code == key && in_company(account.company_id, scope),
                |account| account.id,
            ),
            EntityType::Partner => ids(
                &self.partners,
                |partner| partner.reference == key && partner.in_scope(scope),
                |partner| partner.id,
            ),
            EntityType::Product => ids(
                &self.products,
                |product| product.default_code == key,
                |product| product.id,
            ),
            EntityType::TaxCode => ids(&self.tax_codes, |tax_code| tax_code.code == key, |tax_code| tax_code.id),
            EntityType::AnalyticAccount => ids(
                &self.analytic_accounts,
                |analytic| analytic.code == key && analytic.in_scope(scope),
                |analytic| analytic.id,
            ),
            // Currencies are only known by name.
            EntityType::Currency => self.lookup_by_name(entity, key, scope),
            EntityType::MoveLine => Vec::new(),
        }
    }

    fn lookup_by_name(&self, entity: EntityType, name: &str, scope: Scope) -> Vec<RecordId> {
        match entity {
            EntityType::Account => ids(
                &self.accounts,
                |account| account.name == name && in_company(account.company_id, scope),
                |account| account.id,
            ),
            EntityType::Partner => ids(
                &self.partners,
                |partner| partner.name == name && partner.in_scope(scope),
                |partner| partner.id,
            ),
            EntityType::Product => ids(&self.products, |product| product.name == name, |product| product.id),
            EntityType::TaxCode => ids(&self.tax_codes, |tax_code| tax_code.name == name, |tax_code| tax_code.id),
            EntityType::AnalyticAccount => ids(
                &self.analytic_accounts,
                |analytic| analytic.name == name && analytic.in_scope(scope),
                |analytic| analytic.id,
            ),
            EntityType::Currency => {
                let name = name.to_lowercase();
                ids(
                    &self.currencies,
                    |currency| currency.name.to_lowercase() == name,
                    |currency| currency.id,
                )
            },
            EntityType::MoveLine => Vec::new(),
        }
    }

    fn postable_accounts(&self, company_id: RecordId) -> Vec<(String, RecordId)> {
        self.accounts
            .iter()
            .filter(|account| account.company_id == company_id && account.is_postable())
            .map(|account| (account.code.clone(), account.id))
            .collect()
    }

    fn field_schema(&self, entity: EntityType) -> Vec<FieldDescriptor> {
        match entity {
            EntityType::MoveLine => self.move_line_fields.clone(),
            _ => Vec::new(),
        }
    }

    fn precision(&self, domain: &str) -> u32 {
        self.precisions.get(domain).copied().unwrap_or(DEFAULT_PRECISION)
    }
}

fn in_company(company_id: RecordId, scope: Scope) -> bool {
    match scope {
        Scope::PostableIn(scoped) => company_id == scoped,
        _ => true,
    }
}
