//! Per-table view configuration supplied by the outer service

use serde::{Deserialize, Serialize};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryOrder {
    #[default]
    Asc,
    Desc,
}

impl QueryOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            QueryOrder::Asc => "ASC",
            QueryOrder::Desc => "DESC",
        }
    }
}

/// View configuration of one table.
///
/// Columns named in `excluded_fields` never appear in any returned row or
/// column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    pub search_fields: Vec<String>,
    pub excluded_fields: Vec<String>,
    pub list_fields: Vec<String>,
    pub readonly_fields: Vec<String>,
    pub ordering_field: Option<String>,
    pub ordering: Option<QueryOrder>,
    pub list_per_page: Option<i64>,
}

impl TableSettings {
    pub fn is_excluded(&self, field: &str) -> bool {
        self.excluded_fields.iter().any(|f| f == field)
    }

    /// Positive `list_per_page`, if configured
    pub fn per_page(&self) -> Option<u64> {
        self.list_per_page.filter(|n| *n > 0).map(|n| n as u64)
    }
}
