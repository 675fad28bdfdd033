//! Row records and listing result shapes

use serde::{Deserialize, Serialize};

use crate::{AutocompleteFields, FilteringField};

/// A row keyed by column name, in column order
pub type RowRecord = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub last_page: u64,
    pub per_page: u64,
    pub current_page: u64,
}

impl Pagination {
    /// `last_page = ceil(total / per_page)`
    pub fn new(total: u64, per_page: u64, current_page: u64) -> Self {
        let last_page = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Self {
            total,
            last_page,
            per_page,
            current_page,
        }
    }

    /// Pagination of the autocomplete branch, which has none
    pub fn empty() -> Self {
        Self::default()
    }
}

/// One page of rows plus its pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundRows {
    pub data: Vec<RowRecord>,
    pub pagination: Pagination,
    pub large_dataset: bool,
    /// `pagination.total` came from catalog statistics, not `COUNT(*)`
    #[serde(default)]
    pub is_estimated_total: bool,
}

/// Listing request: paging, search, filters and autocomplete input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowsQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub search: Option<String>,
    pub filters: Vec<FilteringField>,
    pub autocomplete: AutocompleteFields,
}

impl RowsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u64, per_page: u64) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }

    pub fn search(mut self, value: impl Into<String>) -> Self {
        self.search = Some(value.into());
        self
    }

    pub fn filter(mut self, filter: FilteringField) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn autocomplete(mut self, fields: Vec<String>, value: impl Into<String>) -> Self {
        self.autocomplete = AutocompleteFields {
            fields,
            value: Some(value.into()),
        };
        self
    }

    /// Search value if present and non-blank
    pub fn search_value(&self) -> Option<&str> {
        self.search.as_deref().filter(|v| !v.is_empty())
    }
}

/// Outcome of a CSV import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvImportResult {
    /// Data rows read from the input (header excluded)
    pub rows_processed: usize,
    /// Rows inserted successfully
    pub rows_added: usize,
    /// Rows rejected by coercion or by the insert
    pub error_count: usize,
    /// First errors encountered, capped
    pub errors: Vec<String>,
}

impl CsvImportResult {
    const MAX_STORED_ERRORS: usize = 100;

    /// Record a row failure; only the first 100 messages are kept
    pub fn add_error(&mut self, line: usize, message: impl Into<String>) {
        self.error_count += 1;
        if self.errors.len() < Self::MAX_STORED_ERRORS {
            self.errors.push(format!("Line {}: {}", line, message.into()));
        }
    }
}

#[cfg(test)]
mod tests;
