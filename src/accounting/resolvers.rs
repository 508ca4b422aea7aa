use std::collections::HashMap;

use super::{EntityType, LineError, RecordId, ReferenceLookup, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(RecordId),
    NotFound,
    Ambiguous,
}

impl From<Vec<RecordId>> for Resolution {
    fn from(ids: Vec<RecordId>) -> Self {
        match ids.as_slice() {
            [] => Resolution::NotFound,
            [id] => Resolution::Found(*id),
            _ => Resolution::Ambiguous,
        }
    }
}

impl Resolution {
    pub fn into_result(self, entity: EntityType, field: &str, token: &str) -> Result<RecordId, LineError> {
        match self {
            Resolution::Found(id) => Ok(id),
            Resolution::NotFound => Err(LineError::NotFound {
                entity,
                token: token.to_string(),
            }),
            Resolution::Ambiguous => Err(LineError::Ambiguous {
                entity,
                field: field.to_string(),
                token: token.to_string(),
            }),
        }
    }
}

/// Searches the key-like attribute first and falls back to the display name
/// only when the key yields nothing.
pub fn resolve(lookup: &dyn ReferenceLookup, entity: EntityType, token: &str, scope: Scope) -> Resolution {
    let ids = lookup.lookup_by_primary(entity, token, scope);
    if !ids.is_empty() {
        return ids.into();
    }

    lookup.lookup_by_name(entity, token, scope).into()
}

/// Accounts are matched on code only, against the cache built at the start of the run.
pub fn resolve_account(accounts: &HashMap<String, RecordId>, code: &str) -> Resolution {
    match accounts.get(code) {
        Some(id) => Resolution::Found(*id),
        None => Resolution::NotFound,
    }
}

pub fn resolve_partner(lookup: &dyn ReferenceLookup, token: &str) -> Resolution {
    resolve(lookup, EntityType::Partner, token, Scope::CommercialPartners)
}

pub fn resolve_product(lookup: &dyn ReferenceLookup, token: &str) -> Resolution {
    resolve(lookup, EntityType::Product, token, Scope::All)
}

pub fn resolve_tax_code(lookup: &dyn ReferenceLookup, token: &str) -> Resolution {
    resolve(lookup, EntityType::TaxCode, token, Scope::All)
}

pub fn resolve_analytic_account(lookup: &dyn ReferenceLookup, token: &str, company_id: RecordId) -> Resolution {
    resolve(lookup, EntityType::AnalyticAccount, token, Scope::PostableIn(company_id))
}

/// Currencies match on name, the first hit wins.
pub fn resolve_currency(lookup: &dyn ReferenceLookup, name: &str) -> Resolution {
    match lookup.lookup_by_name(EntityType::Currency, name, Scope::All).first() {
        Some(id) => Resolution::Found(*id),
        None => Resolution::NotFound,
    }
}
