//! The uniform contract every engine adapter implements

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::AsyncRead;

use crate::{
    AutocompleteFields, CsvImportResult, DaoConfig, DatabaseType, FoundRows, ForeignKey,
    Pagination, PrimaryKey, ReferencedTableNamesAndColumns, Result, RowCount, RowRecord,
    RowsQuery, TableDs, TableSettings, TableStructure, TestConnectionResult,
    validate_table_settings,
};

/// Lazy, page-bounded sequence of rows
pub type RowStream = BoxStream<'static, Result<RowRecord>>;

/// Adapter capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaoCapabilities {
    /// Engine has foreign-key constraints
    pub foreign_keys: bool,
    /// Engine has views
    pub views: bool,
    /// Streams stay cheap on tables classified as large datasets
    pub streams_large_tables: bool,
    /// Inserts can report engine-generated keys
    pub generated_keys: bool,
}

/// Data access object for one connection.
///
/// Operations are stateless per call; the only shared state lives in the
/// connection and introspection caches the adapter was built with.
#[async_trait]
pub trait TableDao: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    fn capabilities(&self) -> DaoCapabilities;

    fn config(&self) -> &DaoConfig;

    /// Insert a row, returning the generated key when the table has one and
    /// the primary-key subset of `row` otherwise.
    async fn add_row_in_table(&self, table: &str, row: &RowRecord) -> Result<RowRecord>;

    /// Fetch one row by primary key, restricted to the available fields
    async fn get_row_by_primary_key(
        &self,
        table: &str,
        primary_key: &RowRecord,
        settings: &TableSettings,
    ) -> Result<Option<RowRecord>>;

    /// Update one row, returning its primary key
    async fn update_row_in_table(
        &self,
        table: &str,
        row: &RowRecord,
        primary_key: &RowRecord,
    ) -> Result<RowRecord>;

    /// Delete one row, returning its primary key
    async fn delete_row_in_table(&self, table: &str, primary_key: &RowRecord)
    -> Result<RowRecord>;

    /// Type-ahead lookup capped at the autocomplete row limit
    async fn autocomplete(
        &self,
        table: &str,
        settings: &TableSettings,
        autocomplete: &AutocompleteFields,
    ) -> Result<Vec<RowRecord>>;

    /// Total rows matching the search and filters, via the row-count strategy
    async fn count_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowCount>;

    /// One window of rows matching the search and filters, ordered
    async fn fetch_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>>;

    /// Paginated, filtered, searched listing
    async fn get_rows_from_table(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<FoundRows> {
        if query.autocomplete.is_active() {
            let data = self.autocomplete(table, settings, &query.autocomplete).await?;
            return Ok(FoundRows {
                data,
                pagination: Pagination::empty(),
                large_dataset: false,
                is_estimated_total: false,
            });
        }

        let (page, per_page) =
            self.config()
                .resolve_paging(query.page, query.per_page, settings.per_page());

        let count = self.count_rows(table, settings, query).await?;
        tracing::debug!(table, page, per_page, total = count.value(), "listing rows");
        let offset = (page - 1).saturating_mul(per_page);
        let data = self
            .fetch_rows(table, settings, query, offset, per_page)
            .await?;

        Ok(FoundRows {
            data,
            pagination: Pagination::new(count.value(), per_page, page),
            large_dataset: count.is_large_dataset(self.config().large_dataset_threshold()),
            is_estimated_total: count.is_estimated(),
        })
    }

    /// Fetch many rows by key; keys that fail or match nothing are skipped
    async fn bulk_get_rows_from_table_by_primary_keys(
        &self,
        table: &str,
        primary_keys: &[RowRecord],
        settings: &TableSettings,
    ) -> Result<Vec<RowRecord>> {
        let mut rows = Vec::with_capacity(primary_keys.len());
        for pk in primary_keys {
            match self.get_row_by_primary_key(table, pk, settings).await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {}
                Err(e) => tracing::warn!(table, error = %e, "skipping key in bulk get"),
            }
        }
        Ok(rows)
    }

    /// Apply the same values to many rows; returns the keys that succeeded
    async fn bulk_update_rows_in_table(
        &self,
        table: &str,
        new_values: &RowRecord,
        primary_keys: &[RowRecord],
    ) -> Result<Vec<RowRecord>> {
        let mut updated = Vec::with_capacity(primary_keys.len());
        for pk in primary_keys {
            match self.update_row_in_table(table, new_values, pk).await {
                Ok(key) => updated.push(key),
                Err(e) => tracing::warn!(table, error = %e, "skipping key in bulk update"),
            }
        }
        Ok(updated)
    }

    /// Delete many rows; returns how many deletions succeeded
    async fn bulk_delete_rows_in_table(
        &self,
        table: &str,
        primary_keys: &[RowRecord],
    ) -> Result<u64> {
        let mut deleted = 0;
        for pk in primary_keys {
            match self.delete_row_in_table(table, pk).await {
                Ok(_) => deleted += 1,
                Err(e) => tracing::warn!(table, error = %e, "skipping key in bulk delete"),
            }
        }
        Ok(deleted)
    }

    async fn get_table_structure(&self, table: &str) -> Result<Vec<TableStructure>>;

    async fn get_table_primary_columns(&self, table: &str) -> Result<Vec<PrimaryKey>>;

    /// Foreign keys declared on `table`; empty for engines without them
    async fn get_table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    async fn get_tables_from_db(&self) -> Result<Vec<TableDs>>;

    /// Tables whose foreign keys reference columns of `table`
    async fn get_referenced_table_names_and_columns(
        &self,
        table: &str,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>>;

    /// False for plain tables and unknown names
    async fn is_view(&self, table: &str) -> Result<bool> {
        let tables = self.get_tables_from_db().await?;
        Ok(tables.iter().any(|t| t.table_name == table && t.is_view))
    }

    /// Problems with `settings` for `table`; empty when valid
    async fn validate_settings(&self, settings: &TableSettings, table: &str) -> Result<Vec<String>> {
        let structure = self.get_table_structure(table).await?;
        let primary_keys = self.get_table_primary_columns(table).await?;
        Ok(validate_table_settings(
            settings,
            table,
            &structure,
            &primary_keys,
            self.database_type().is_sql(),
        ))
    }

    /// Cheapest liveness check; never fails
    async fn test_connect(&self) -> TestConnectionResult;

    /// Passthrough execution; authorization is the caller's job
    async fn execute_raw_query(&self, query: &str) -> Result<Vec<RowRecord>>;

    /// Same semantics as the listing, as a lazy stream of rows
    async fn get_table_rows_stream(
        self: Arc<Self>,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowStream>;

    /// Parse CSV (header row first) and insert each row
    async fn import_csv_in_table(
        &self,
        table: &str,
        csv: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<CsvImportResult>;
}
