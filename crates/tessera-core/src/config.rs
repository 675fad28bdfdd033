//! DAO tuning knobs

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Thresholds, limits and timeouts shared by every adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    /// Row count at or above which a table is a large dataset
    large_dataset_threshold: u64,
    /// Time allowed for an exact `COUNT` before falling back to the estimate
    count_timeout_ms: u64,
    /// Rows returned by an autocomplete lookup
    autocomplete_row_limit: u64,
    /// Page size when neither the request nor the table settings set one
    default_per_page: u64,
    /// Rows fetched per page by row streams
    stream_page_size: u64,
}

impl DaoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_large_dataset_threshold(mut self, rows: u64) -> Self {
        self.large_dataset_threshold = rows;
        self
    }

    pub fn with_count_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.count_timeout_ms = timeout_ms;
        self
    }

    pub fn with_autocomplete_row_limit(mut self, rows: u64) -> Self {
        self.autocomplete_row_limit = rows.max(1);
        self
    }

    pub fn with_default_per_page(mut self, rows: u64) -> Self {
        self.default_per_page = rows.max(1);
        self
    }

    pub fn with_stream_page_size(mut self, rows: u64) -> Self {
        self.stream_page_size = rows.max(1);
        self
    }

    pub fn large_dataset_threshold(&self) -> u64 {
        self.large_dataset_threshold
    }

    pub fn count_timeout(&self) -> Duration {
        Duration::from_millis(self.count_timeout_ms)
    }

    pub fn autocomplete_row_limit(&self) -> u64 {
        self.autocomplete_row_limit
    }

    pub fn default_per_page(&self) -> u64 {
        self.default_per_page
    }

    pub fn stream_page_size(&self) -> u64 {
        self.stream_page_size
    }

    /// Resolve `(page, per_page)`: page defaults to 1, per page to the table
    /// setting when positive, else the global default.
    pub fn resolve_paging(
        &self,
        page: Option<u64>,
        per_page: Option<u64>,
        settings_per_page: Option<u64>,
    ) -> (u64, u64) {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let per_page = per_page
            .filter(|n| *n > 0)
            .or(settings_per_page)
            .unwrap_or(self.default_per_page);
        (page, per_page)
    }
}

impl Default for DaoConfig {
    /// Defaults:
    /// - large_dataset_threshold: 100 000 rows
    /// - count_timeout: 2 seconds
    /// - autocomplete_row_limit: 20
    /// - default_per_page: 20
    /// - stream_page_size: 1 000
    fn default() -> Self {
        Self {
            large_dataset_threshold: 100_000,
            count_timeout_ms: 2_000,
            autocomplete_row_limit: 20,
            default_per_page: 20,
            stream_page_size: 1_000,
        }
    }
}
