//! In-memory evaluation of filters, search and ordering over row records.
//!
//! Adapters whose engine cannot evaluate the predicate model server-side
//! (Redis hashes, Cassandra tables outside their key order) load records
//! and narrow them here.

use std::cmp::Ordering;

use serde_json::Value as Json;

use crate::{FilterCriteria, FilteringField, QueryOrder, RowRecord};

/// Cell text; missing fields and JSON null are absent
pub fn cell(row: &RowRecord, field: &str) -> Option<String> {
    match row.get(field) {
        None | Some(Json::Null) => None,
        Some(Json::String(s)) => Some(s.clone()),
        Some(value) => Some(value.to_string()),
    }
}

/// True when every applicable filter holds.
///
/// Filters are checked against the row's own fields, since records of one
/// table need not share a field set. A field the hash lacks is absent, which
/// only `empty` (or `eq` null) accepts. Unknown criteria are skipped.
pub fn matches_filters(row: &RowRecord, filters: &[FilteringField]) -> bool {
    filters.iter().all(|filter| {
        let Some(criteria) = filter.criteria() else {
            tracing::warn!(field = %filter.field, criteria = %filter.criteria, "ignoring unknown filter criteria");
            return true;
        };
        let value = cell(row, &filter.field);
        if criteria == FilterCriteria::Eq && filter.value.is_null() {
            return value.is_none();
        }
        if criteria != FilterCriteria::Empty && filter.value.is_null() {
            return true;
        }
        criteria.matches(value.as_deref(), &filter.value)
    })
}

/// Case-insensitive prefix match on any of `fields`; no fields matches all
pub fn matches_prefix(row: &RowRecord, fields: &[String], value: &str) -> bool {
    if fields.is_empty() {
        return true;
    }
    let needle = value.to_lowercase();
    fields.iter().any(|field| {
        cell(row, field).is_some_and(|text| text.to_lowercase().starts_with(&needle))
    })
}

/// Numeric when both sides parse, text otherwise
pub fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Missing cells sort last ascending and first descending
pub fn sort_rows(rows: &mut [RowRecord], field: &str, order: QueryOrder) {
    rows.sort_by(|a, b| {
        let ordering = match (cell(a, field), cell(b, field)) {
            (Some(x), Some(y)) => compare_text(&x, &y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match order {
            QueryOrder::Asc => ordering,
            QueryOrder::Desc => ordering.reverse(),
        }
    });
}

/// Restrict a row to `fields` in their order; absent fields become null
pub fn project(row: &RowRecord, fields: &[String]) -> RowRecord {
    fields
        .iter()
        .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(Json::Null)))
        .collect()
}
