//! The DAO contract over one Cassandra keyspace

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use tessera_connection::{CacheService, ClientProvisioner};
use tessera_core::matching::{matches_filters, matches_prefix, project, sort_rows};
use tessera_core::{
    AutocompleteFields, Connection, ConnectionParams, CsvImportResult, DaoCapabilities,
    DaoConfig, DaoError, DatabaseType, FilteringField, Fingerprint, ForeignKey, PrimaryKey,
    QueryResult, ReferencedTableNamesAndColumns, Result, RowCount, RowRecord, RowStream,
    RowsQuery, TableDao, TableDs, TableSettings, TableStructure, TestConnectionResult, Value,
    count_rows_with_fallback, find_available_fields, resolve_ordering, resolve_search_fields,
};
use tessera_query::rows::first_count;

use crate::connection::JSON_COLUMN;
use crate::cql::{self, CqlTable, column_of_json_key};
use crate::schema;

/// Table DAO for one Cassandra keyspace.
///
/// Unfiltered listings without an ordering column read the first
/// `offset + limit` rows in token order. Everything else loads the table
/// and narrows, sorts and pages it in memory.
pub struct CassandraTableDao {
    params: ConnectionParams,
    fingerprint: Fingerprint,
    keyspace: Option<String>,
    provisioner: Arc<dyn ClientProvisioner>,
    caches: Arc<CacheService>,
    config: DaoConfig,
}

impl CassandraTableDao {
    pub fn new(
        params: ConnectionParams,
        provisioner: Arc<dyn ClientProvisioner>,
        caches: Arc<CacheService>,
        config: DaoConfig,
    ) -> Self {
        let fingerprint = params.fingerprint();
        let keyspace = params
            .database
            .as_deref()
            .or(params.schema.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        Self {
            params,
            fingerprint,
            keyspace,
            provisioner,
            caches,
            config,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    fn keyspace(&self) -> Result<&str> {
        self.keyspace.as_deref().ok_or_else(|| {
            DaoError::Configuration("Cassandra needs a keyspace in `database`".to_string())
        })
    }

    fn table(&self, name: &str) -> Result<CqlTable> {
        Ok(CqlTable::new(self.keyspace()?, name))
    }

    async fn client(&self) -> Result<Arc<dyn Connection>> {
        self.caches
            .acquire(&self.params, self.provisioner.clone())
            .await
    }

    /// Pass `result` through, evicting the cached client on connectivity errors
    async fn evicting<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.caches
                .clients()
                .evict_on_error(&self.fingerprint, e)
                .await;
        }
        result
    }

    async fn catalog(&self, table: &str) -> Result<Vec<schema::CatalogColumn>> {
        let keyspace = self.keyspace()?;
        let conn = self.client().await?;
        let loaded = schema::catalog_columns(conn.as_ref(), keyspace, table).await;
        let columns = self.evicting(loaded).await?;
        if columns.is_empty() {
            return Err(DaoError::NotFound(format!(
                "table \"{}\" not found in keyspace \"{}\"",
                table, keyspace
            )));
        }
        Ok(columns)
    }

    async fn structure(&self, table: &str) -> Result<Arc<Vec<TableStructure>>> {
        self.caches
            .introspection()
            .structure(&self.fingerprint, table, || async {
                Ok(schema::table_structure(&self.catalog(table).await?))
            })
            .await
    }

    async fn primary_keys(&self, table: &str) -> Result<Arc<Vec<PrimaryKey>>> {
        self.caches
            .introspection()
            .primary_keys(&self.fingerprint, table, || async {
                Ok(schema::primary_keys(&self.catalog(table).await?))
            })
            .await
    }

    async fn available_fields(
        &self,
        table: &str,
        settings: &TableSettings,
    ) -> Result<(Arc<Vec<TableStructure>>, Vec<String>)> {
        let structure = self.structure(table).await?;
        let primary_keys = self.primary_keys(table).await?;
        let available = find_available_fields(settings, &structure, &primary_keys);
        Ok((structure, available))
    }

    /// Filters on columns the table does not have are skipped
    fn known_filters(query: &RowsQuery, structure: &[TableStructure]) -> Vec<FilteringField> {
        query
            .filters
            .iter()
            .filter(|f| {
                let known = structure.iter().any(|c| c.column_name == f.field);
                if !known {
                    tracing::warn!(field = %f.field, "filter on unknown column skipped");
                }
                known
            })
            .cloned()
            .collect()
    }

    fn is_narrowed(query: &RowsQuery) -> bool {
        query.search_value().is_some() || !query.filters.is_empty()
    }

    fn keep(
        row: &RowRecord,
        settings: &TableSettings,
        available: &[String],
        query: &RowsQuery,
        filters: &[FilteringField],
    ) -> bool {
        if let Some(value) = query.search_value() {
            let fields = resolve_search_fields(settings, available, Some(value));
            if !matches_prefix(row, &fields, value) {
                return false;
            }
        }
        matches_filters(row, filters)
    }

    async fn load_rows(
        conn: &dyn Connection,
        table: &CqlTable,
        columns: &[String],
        key: &RowRecord,
        limit: Option<u64>,
    ) -> Result<Vec<RowRecord>> {
        let result = conn
            .query(&cql::select_json(table, columns, key, limit)?, &[])
            .await?;
        json_rows(&result)
    }

    /// Primary-key values of `source`, in key order; every key column is required
    fn key_of(table: &str, primary_keys: &[PrimaryKey], source: &RowRecord) -> Result<RowRecord> {
        let mut key = RowRecord::new();
        for pk in primary_keys {
            match source.get(&pk.column_name) {
                Some(value) if !value.is_null() => {
                    key.insert(pk.column_name.clone(), value.clone());
                }
                _ => {
                    return Err(DaoError::Validation(format!(
                        "primary key column \"{}\" of \"{}\" is missing",
                        pk.column_name, table
                    )));
                }
            }
        }
        Ok(key)
    }

    fn check_columns(table: &str, structure: &[TableStructure], row: &RowRecord) -> Result<()> {
        match row
            .keys()
            .find(|name| !structure.iter().any(|c| &c.column_name == *name))
        {
            Some(unknown) => Err(DaoError::Validation(format!(
                "unknown column \"{}\" in \"{}\"",
                unknown, table
            ))),
            None => Ok(()),
        }
    }

    async fn count_matching(
        conn: &dyn Connection,
        table: &CqlTable,
        settings: &TableSettings,
        available: &[String],
        query: &RowsQuery,
        filters: &[FilteringField],
    ) -> Result<u64> {
        let rows = Self::load_rows(conn, table, &[], &RowRecord::new(), None).await?;
        Ok(rows
            .iter()
            .filter(|row| Self::keep(row, settings, available, query, filters))
            .count() as u64)
    }

    async fn count_all(conn: &dyn Connection, table: &CqlTable) -> Result<u64> {
        let result = conn.query(&cql::count(table)?, &[]).await?;
        Ok(first_count(&result).unwrap_or(0))
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_window(
        conn: &dyn Connection,
        table: &CqlTable,
        settings: &TableSettings,
        available: &[String],
        query: &RowsQuery,
        filters: &[FilteringField],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>> {
        if !Self::is_narrowed(query) && settings.ordering_field.is_none() {
            let rows = Self::load_rows(
                conn,
                table,
                available,
                &RowRecord::new(),
                Some(offset.saturating_add(limit)),
            )
            .await?;
            return Ok(window(rows, offset, limit)
                .iter()
                .map(|row| project(row, available))
                .collect());
        }

        let mut rows = Self::load_rows(conn, table, &[], &RowRecord::new(), None).await?;
        rows.retain(|row| Self::keep(row, settings, available, query, filters));
        if let Some((field, order)) = resolve_ordering(settings, available) {
            sort_rows(&mut rows, &field, order);
        }
        Ok(window(rows, offset, limit)
            .iter()
            .map(|row| project(row, available))
            .collect())
    }

    async fn autocomplete_rows(
        &self,
        conn: &dyn Connection,
        table: &CqlTable,
        fields: &[String],
        available: &[String],
        value: &str,
    ) -> Result<Vec<RowRecord>> {
        let limit = usize::try_from(self.config.autocomplete_row_limit()).unwrap_or(usize::MAX);
        let rows = Self::load_rows(conn, table, available, &RowRecord::new(), None).await?;
        Ok(rows
            .iter()
            .filter(|row| matches_prefix(row, fields, value))
            .take(limit)
            .map(|row| project(row, available))
            .collect())
    }

    /// Run a conditional statement; `false` when its condition did not hold
    async fn run_conditional(conn: &dyn Connection, statement: &str) -> Result<bool> {
        Ok(conn.execute(statement, &[]).await?.affected_rows > 0)
    }

    fn not_found(table: &str) -> DaoError {
        DaoError::NotFound(format!("no row of \"{}\" matches the primary key", table))
    }
}

/// Records of a `SELECT JSON` result, keyed by plain column names
pub(crate) fn json_rows(result: &QueryResult) -> Result<Vec<RowRecord>> {
    result
        .rows
        .iter()
        .map(|row| {
            let Some(Value::String(document)) = row.get_by_name(JSON_COLUMN) else {
                return Err(DaoError::Driver(format!(
                    "expected a {} column in a SELECT JSON row",
                    JSON_COLUMN
                )));
            };
            let parsed: RowRecord = serde_json::from_str(document)?;
            Ok(parsed
                .into_iter()
                .map(|(key, value)| (column_of_json_key(&key), value))
                .collect())
        })
        .collect()
}

fn window<T>(items: Vec<T>, offset: u64, limit: u64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl TableDao for CassandraTableDao {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Cassandra
    }

    fn capabilities(&self) -> DaoCapabilities {
        DaoCapabilities {
            foreign_keys: false,
            views: true,
            streams_large_tables: false,
            generated_keys: false,
        }
    }

    fn config(&self) -> &DaoConfig {
        &self.config
    }

    /// Refuses to overwrite an existing row; echoes the primary key
    #[tracing::instrument(skip(self, row), fields(db = %self.fingerprint))]
    async fn add_row_in_table(&self, table: &str, row: &RowRecord) -> Result<RowRecord> {
        let structure = self.structure(table).await?;
        Self::check_columns(table, &structure, row)?;
        let primary_keys = self.primary_keys(table).await?;
        let key = Self::key_of(table, &primary_keys, row)?;
        let statement = cql::insert_json(&self.table(table)?, row)?;

        let conn = self.client().await?;
        let applied = Self::run_conditional(conn.as_ref(), &statement).await;
        if !self.evicting(applied).await? {
            return Err(DaoError::Validation(format!(
                "a row with this primary key already exists in \"{}\"",
                table
            )));
        }
        Ok(key)
    }

    async fn get_row_by_primary_key(
        &self,
        table: &str,
        primary_key: &RowRecord,
        settings: &TableSettings,
    ) -> Result<Option<RowRecord>> {
        let (_, available) = self.available_fields(table, settings).await?;
        let primary_keys = self.primary_keys(table).await?;
        let key = Self::key_of(table, &primary_keys, primary_key)?;
        let cql_table = self.table(table)?;

        let conn = self.client().await?;
        let loaded = Self::load_rows(conn.as_ref(), &cql_table, &available, &key, Some(1)).await;
        let row = self
            .evicting(loaded)
            .await?
            .first()
            .map(|row| project(row, &available));
        Ok(row)
    }

    /// Primary-key columns identify the row and cannot be changed
    #[tracing::instrument(skip(self, row, primary_key), fields(db = %self.fingerprint))]
    async fn update_row_in_table(
        &self,
        table: &str,
        row: &RowRecord,
        primary_key: &RowRecord,
    ) -> Result<RowRecord> {
        let structure = self.structure(table).await?;
        Self::check_columns(table, &structure, row)?;
        let primary_keys = self.primary_keys(table).await?;
        let key = Self::key_of(table, &primary_keys, primary_key)?;

        let mut changes = RowRecord::new();
        for (column, value) in row {
            match key.get(column) {
                Some(current) if current == value => {}
                Some(_) => {
                    return Err(DaoError::Validation(format!(
                        "primary key column \"{}\" of \"{}\" cannot be changed",
                        column, table
                    )));
                }
                None => {
                    changes.insert(column.clone(), value.clone());
                }
            }
        }
        if changes.is_empty() {
            return Ok(key);
        }
        let statement = cql::update(&self.table(table)?, &changes, &key)?;

        let conn = self.client().await?;
        let applied = Self::run_conditional(conn.as_ref(), &statement).await;
        if !self.evicting(applied).await? {
            return Err(Self::not_found(table));
        }
        Ok(key)
    }

    async fn delete_row_in_table(
        &self,
        table: &str,
        primary_key: &RowRecord,
    ) -> Result<RowRecord> {
        let primary_keys = self.primary_keys(table).await?;
        let key = Self::key_of(table, &primary_keys, primary_key)?;
        let statement = cql::delete(&self.table(table)?, &key)?;

        let conn = self.client().await?;
        let applied = Self::run_conditional(conn.as_ref(), &statement).await;
        if !self.evicting(applied).await? {
            return Err(Self::not_found(table));
        }
        Ok(key)
    }

    async fn autocomplete(
        &self,
        table: &str,
        settings: &TableSettings,
        autocomplete: &AutocompleteFields,
    ) -> Result<Vec<RowRecord>> {
        let Some(value) = autocomplete.value.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(Vec::new());
        };
        let (_, available) = self.available_fields(table, settings).await?;
        let fields: Vec<String> = autocomplete
            .fields
            .iter()
            .filter(|f| available.contains(f))
            .cloned()
            .collect();
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let cql_table = self.table(table)?;
        let conn = self.client().await?;
        let found = self
            .autocomplete_rows(conn.as_ref(), &cql_table, &fields, &available, value)
            .await;
        self.evicting(found).await
    }

    /// No statistics exist, so every count races the timeout and falls
    /// back to the threshold
    #[tracing::instrument(skip(self, settings, query), fields(db = %self.fingerprint))]
    async fn count_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowCount> {
        let (structure, available) = self.available_fields(table, settings).await?;
        let cql_table = self.table(table)?;
        let conn = self.client().await?;
        let approximate = async { Ok::<_, DaoError>(None) };

        let count = if Self::is_narrowed(query) {
            let filters = Self::known_filters(query, &structure);
            let exact = Self::count_matching(
                conn.as_ref(),
                &cql_table,
                settings,
                &available,
                query,
                &filters,
            );
            count_rows_with_fallback(&self.config, approximate, exact).await
        } else {
            let exact = Self::count_all(conn.as_ref(), &cql_table);
            count_rows_with_fallback(&self.config, approximate, exact).await
        };
        self.evicting(count).await
    }

    async fn fetch_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>> {
        let (structure, available) = self.available_fields(table, settings).await?;
        let filters = Self::known_filters(query, &structure);
        let cql_table = self.table(table)?;
        let conn = self.client().await?;
        let rows = Self::fetch_window(
            conn.as_ref(),
            &cql_table,
            settings,
            &available,
            query,
            &filters,
            offset,
            limit,
        )
        .await;
        self.evicting(rows).await
    }

    async fn get_table_structure(&self, table: &str) -> Result<Vec<TableStructure>> {
        Ok(self.structure(table).await?.as_ref().clone())
    }

    async fn get_table_primary_columns(&self, table: &str) -> Result<Vec<PrimaryKey>> {
        Ok(self.primary_keys(table).await?.as_ref().clone())
    }

    async fn get_table_foreign_keys(&self, _table: &str) -> Result<Vec<ForeignKey>> {
        Ok(Vec::new())
    }

    async fn get_tables_from_db(&self) -> Result<Vec<TableDs>> {
        let keyspace = self.keyspace()?;
        let tables = self
            .caches
            .introspection()
            .tables(&self.fingerprint, || async {
                let conn = self.client().await?;
                let loaded = schema::tables(conn.as_ref(), keyspace).await;
                self.evicting(loaded).await
            })
            .await?;
        Ok(tables.as_ref().clone())
    }

    async fn get_referenced_table_names_and_columns(
        &self,
        _table: &str,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>> {
        Ok(Vec::new())
    }

    async fn test_connect(&self) -> TestConnectionResult {
        let conn = match self.client().await {
            Ok(conn) => conn,
            Err(e) => return TestConnectionResult::failure(e.to_string()),
        };
        match self.evicting(conn.ping().await).await {
            Ok(()) => TestConnectionResult::success(),
            Err(e) => TestConnectionResult::failure(e.to_string()),
        }
    }

    /// Runs one CQL statement; rows come back keyed by column name and a
    /// `SELECT JSON` result is unpacked
    #[tracing::instrument(skip(self, query), fields(db = %self.fingerprint))]
    async fn execute_raw_query(&self, query: &str) -> Result<Vec<RowRecord>> {
        let conn = self.client().await?;
        let result = conn.query(query, &[]).await;
        let result = self.evicting(result).await?;
        let is_json = result.columns.len() == 1 && result.columns[0].name == JSON_COLUMN;
        if is_json {
            json_rows(&result)
        } else {
            Ok(result.into_records())
        }
    }

    async fn get_table_rows_stream(
        self: Arc<Self>,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowStream> {
        tessera_interchange::stream_rows(self, table, settings, query).await
    }

    async fn import_csv_in_table(
        &self,
        table: &str,
        csv: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<CsvImportResult> {
        tessera_interchange::import_csv(self, table, csv).await
    }
}
