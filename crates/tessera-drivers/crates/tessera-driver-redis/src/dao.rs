//! The DAO contract over Redis hashes

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as Json;
use tokio::io::AsyncRead;

use tessera_connection::{CacheService, ClientProvisioner};
use tessera_core::{
    AutocompleteFields, CanonicalType, Connection, ConnectionParams, CsvImportResult,
    DaoCapabilities, DaoConfig, DaoError, DatabaseType, Fingerprint, ForeignKey, PrimaryKey,
    QueryOrder, ReferencedTableNamesAndColumns, Result, RowCount, RowRecord, RowStream, RowsQuery,
    TableDao, TableDs, TableSettings, TableStructure, TestConnectionResult, Value,
    count_rows_with_fallback, find_available_fields, resolve_ordering, resolve_search_fields,
};

use crate::connection::{json_text, reply_of, reply_records};
use crate::keys::{
    KEY_COLUMN, exists, key_text, load_hash, row_key, row_record, scan_keys, split_row_key,
    table_of, table_pattern,
};
use tessera_core::matching::{compare_text, matches_filters, matches_prefix, project, sort_rows};

/// Hashes sampled to infer a table's columns
const STRUCTURE_SAMPLE: usize = 100;

/// Table DAO for one Redis database.
///
/// Every listing scans the table's keys; hashes are loaded only for the
/// rows a request needs, except when filters or search force a full pass.
pub struct RedisTableDao {
    params: ConnectionParams,
    fingerprint: Fingerprint,
    provisioner: Arc<dyn ClientProvisioner>,
    caches: Arc<CacheService>,
    config: DaoConfig,
}

impl RedisTableDao {
    pub fn new(
        params: ConnectionParams,
        provisioner: Arc<dyn ClientProvisioner>,
        caches: Arc<CacheService>,
        config: DaoConfig,
    ) -> Self {
        let fingerprint = params.fingerprint();
        Self {
            params,
            fingerprint,
            provisioner,
            caches,
            config,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
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

    fn primary_keys() -> Vec<PrimaryKey> {
        vec![PrimaryKey {
            column_name: KEY_COLUMN.to_string(),
            data_type: CanonicalType::String,
        }]
    }

    async fn structure(&self, table: &str) -> Result<Arc<Vec<TableStructure>>> {
        self.caches
            .introspection()
            .structure(&self.fingerprint, table, || async {
                let conn = self.client().await?;
                let loaded = Self::load_structure(conn.as_ref(), table).await;
                self.evicting(loaded).await
            })
            .await
    }

    /// `key` first, then every field seen in a sample of the table's hashes
    async fn load_structure(conn: &dyn Connection, table: &str) -> Result<Vec<TableStructure>> {
        let keys = scan_keys(conn, &table_pattern(table), Some(STRUCTURE_SAMPLE)).await?;
        if keys.is_empty() {
            return Err(DaoError::NotFound(format!("table \"{}\" not found", table)));
        }

        let mut fields: Vec<String> = Vec::new();
        for full in &keys {
            let Some(hash) = load_hash(conn, full).await? else {
                continue;
            };
            for (field, _) in hash {
                if field != KEY_COLUMN && !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }

        let mut key = TableStructure::new(KEY_COLUMN, CanonicalType::String, "string");
        key.allow_null = false;
        Ok(std::iter::once(key)
            .chain(
                fields
                    .into_iter()
                    .map(|f| TableStructure::new(f, CanonicalType::String, "string")),
            )
            .collect())
    }

    async fn available_fields(
        &self,
        table: &str,
        settings: &TableSettings,
    ) -> Result<Vec<String>> {
        let structure = self.structure(table).await?;
        Ok(find_available_fields(settings, &structure, &Self::primary_keys()))
    }

    fn is_narrowed(query: &RowsQuery) -> bool {
        query.search_value().is_some() || !query.filters.is_empty()
    }

    /// Search disjunction and filter conjunction of a listing request
    fn keep(
        row: &RowRecord,
        settings: &TableSettings,
        available: &[String],
        query: &RowsQuery,
    ) -> bool {
        if let Some(value) = query.search_value() {
            let fields = resolve_search_fields(settings, available, Some(value));
            if !matches_prefix(row, &fields, value) {
                return false;
            }
        }
        matches_filters(row, &query.filters)
    }

    async fn load_rows(conn: &dyn Connection, table: &str, keys: &[String]) -> Result<Vec<RowRecord>> {
        let mut rows = Vec::with_capacity(keys.len());
        for full in keys {
            let Some(id) = split_row_key(table, full) else {
                continue;
            };
            // Deleted between SCAN and HGETALL
            if let Some(fields) = load_hash(conn, full).await? {
                rows.push(row_record(id, fields));
            }
        }
        Ok(rows)
    }

    async fn count_matching(
        conn: &dyn Connection,
        table: &str,
        keys: &[String],
        settings: &TableSettings,
        available: &[String],
        query: &RowsQuery,
    ) -> Result<u64> {
        let rows = Self::load_rows(conn, table, keys).await?;
        Ok(rows
            .iter()
            .filter(|row| Self::keep(row, settings, available, query))
            .count() as u64)
    }

    async fn fetch_window(
        conn: &dyn Connection,
        table: &str,
        settings: &TableSettings,
        available: &[String],
        query: &RowsQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>> {
        let (field, order) =
            resolve_ordering(settings, available).unwrap_or((KEY_COLUMN.to_string(), QueryOrder::Asc));
        let mut keys = scan_keys(conn, &table_pattern(table), None).await?;

        let rows = if !Self::is_narrowed(query) && field == KEY_COLUMN {
            // Only the requested window of hashes is loaded
            keys.sort_by(|a, b| {
                let ordering = compare_text(
                    split_row_key(table, a).unwrap_or(a),
                    split_row_key(table, b).unwrap_or(b),
                );
                match order {
                    QueryOrder::Asc => ordering,
                    QueryOrder::Desc => ordering.reverse(),
                }
            });
            Self::load_rows(conn, table, &window(keys, offset, limit)).await?
        } else {
            let mut rows = Self::load_rows(conn, table, &keys).await?;
            rows.retain(|row| Self::keep(row, settings, available, query));
            sort_rows(&mut rows, &field, order);
            window(rows, offset, limit)
        };
        Ok(rows.iter().map(|row| project(row, available)).collect())
    }

    async fn autocomplete_rows(
        &self,
        conn: &dyn Connection,
        table: &str,
        fields: &[String],
        available: &[String],
        value: &str,
    ) -> Result<Vec<RowRecord>> {
        let limit = usize::try_from(self.config.autocomplete_row_limit()).unwrap_or(usize::MAX);
        let keys = scan_keys(conn, &table_pattern(table), None).await?;
        let mut found = Vec::new();
        for full in &keys {
            if found.len() >= limit {
                break;
            }
            let Some(id) = split_row_key(table, full) else {
                continue;
            };
            let Some(fields_of_row) = load_hash(conn, full).await? else {
                continue;
            };
            let row = row_record(id, fields_of_row);
            if matches_prefix(&row, fields, value) {
                found.push(project(&row, available));
            }
        }
        Ok(found)
    }

    async fn load_tables(conn: &dyn Connection) -> Result<Vec<TableDs>> {
        let keys = scan_keys(conn, "*", None).await?;
        let names: BTreeSet<&str> = keys.iter().filter_map(|k| table_of(k)).collect();
        Ok(names
            .into_iter()
            .map(|name| TableDs {
                table_name: name.to_string(),
                is_view: false,
            })
            .collect())
    }

    async fn insert_hash(conn: &dyn Connection, table: &str, id: &str, args: Vec<Value>) -> Result<()> {
        let full = row_key(table, id);
        if exists(conn, &full).await? {
            return Err(DaoError::Validation(format!(
                "row \"{}\" already exists in \"{}\"",
                id, table
            )));
        }
        let mut hset = vec![Value::String(full)];
        hset.extend(args);
        conn.execute("HSET", &hset).await?;
        Ok(())
    }

    async fn update_hash(
        conn: &dyn Connection,
        table: &str,
        id: &str,
        target: &str,
        changes: HashChanges,
    ) -> Result<()> {
        let full = row_key(table, id);
        if !exists(conn, &full).await? {
            return Err(DaoError::NotFound(format!(
                "no row of \"{}\" matches the primary key",
                table
            )));
        }
        let renamed = row_key(table, target);
        if target != id && exists(conn, &renamed).await? {
            return Err(DaoError::Validation(format!(
                "row \"{}\" already exists in \"{}\"",
                target, table
            )));
        }

        if !changes.set.is_empty() {
            let mut hset = vec![Value::String(full.clone())];
            hset.extend(changes.set);
            conn.execute("HSET", &hset).await?;
        }
        if !changes.unset.is_empty() {
            let mut hdel = vec![Value::String(full.clone())];
            hdel.extend(changes.unset.into_iter().map(Value::String));
            conn.execute("HDEL", &hdel).await?;
        }
        if target != id {
            let result = conn
                .execute("RENAMENX", &[Value::String(full), Value::String(renamed)])
                .await?;
            if result.affected_rows == 0 {
                return Err(DaoError::Validation(format!(
                    "row \"{}\" already exists in \"{}\"",
                    target, table
                )));
            }
        }
        Ok(())
    }

    fn key_record(id: &str) -> RowRecord {
        let mut key = RowRecord::new();
        key.insert(KEY_COLUMN.to_string(), Json::String(id.to_string()));
        key
    }
}

/// Field writes of one update: `HSET` pairs and fields to `HDEL`
#[derive(Debug, Default)]
struct HashChanges {
    set: Vec<Value>,
    unset: Vec<String>,
}

impl HashChanges {
    /// Null removes a field; every other value is stored as its text
    fn from_row(row: &RowRecord) -> Self {
        let mut changes = Self::default();
        for (field, value) in row {
            if field == KEY_COLUMN {
                continue;
            }
            match value {
                Json::Null => changes.unset.push(field.clone()),
                value => {
                    changes.set.push(Value::String(field.clone()));
                    changes.set.push(Value::String(json_text(value)));
                }
            }
        }
        changes
    }
}

fn window<T>(items: Vec<T>, offset: u64, limit: u64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl TableDao for RedisTableDao {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Redis
    }

    fn capabilities(&self) -> DaoCapabilities {
        DaoCapabilities {
            foreign_keys: false,
            views: false,
            streams_large_tables: false,
            generated_keys: false,
        }
    }

    fn config(&self) -> &DaoConfig {
        &self.config
    }

    /// Echoes the key; null fields are not stored
    #[tracing::instrument(skip(self, row), fields(db = %self.fingerprint))]
    async fn add_row_in_table(&self, table: &str, row: &RowRecord) -> Result<RowRecord> {
        let id = key_text(row.get(KEY_COLUMN))?;
        let changes = HashChanges::from_row(row);
        if changes.set.is_empty() {
            return Err(DaoError::Validation(format!(
                "a row of \"{}\" needs at least one non-null field besides \"{}\"",
                table, KEY_COLUMN
            )));
        }

        let conn = self.client().await?;
        let inserted = Self::insert_hash(conn.as_ref(), table, &id, changes.set).await;
        self.evicting(inserted).await?;
        // New fields widen the inferred structure
        self.caches
            .introspection()
            .invalidate_table(&self.fingerprint, table);
        Ok(Self::key_record(&id))
    }

    async fn get_row_by_primary_key(
        &self,
        table: &str,
        primary_key: &RowRecord,
        settings: &TableSettings,
    ) -> Result<Option<RowRecord>> {
        let id = key_text(primary_key.get(KEY_COLUMN))?;
        let available = self.available_fields(table, settings).await?;
        let conn = self.client().await?;
        let loaded = load_hash(conn.as_ref(), &row_key(table, &id)).await;
        let row = self
            .evicting(loaded)
            .await?
            .map(|fields| project(&row_record(&id, fields), &available));
        Ok(row)
    }

    /// A `key` in `row` renames the hash, refusing to overwrite another row
    #[tracing::instrument(skip(self, row, primary_key), fields(db = %self.fingerprint))]
    async fn update_row_in_table(
        &self,
        table: &str,
        row: &RowRecord,
        primary_key: &RowRecord,
    ) -> Result<RowRecord> {
        let id = key_text(primary_key.get(KEY_COLUMN))?;
        let target = match row.get(KEY_COLUMN) {
            Some(value) => key_text(Some(value))?,
            None => id.clone(),
        };
        let changes = HashChanges::from_row(row);

        let conn = self.client().await?;
        let updated = Self::update_hash(conn.as_ref(), table, &id, &target, changes).await;
        self.evicting(updated).await?;
        self.caches
            .introspection()
            .invalidate_table(&self.fingerprint, table);
        Ok(Self::key_record(&target))
    }

    async fn delete_row_in_table(
        &self,
        table: &str,
        primary_key: &RowRecord,
    ) -> Result<RowRecord> {
        let id = key_text(primary_key.get(KEY_COLUMN))?;
        let conn = self.client().await?;
        let deleted = conn
            .execute("DEL", &[Value::String(row_key(table, &id))])
            .await;
        if self.evicting(deleted).await?.affected_rows == 0 {
            return Err(DaoError::NotFound(format!(
                "no row of \"{}\" matches the primary key",
                table
            )));
        }
        Ok(primary_key.clone())
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
        let available = self.available_fields(table, settings).await?;
        let fields: Vec<String> = autocomplete
            .fields
            .iter()
            .filter(|f| available.contains(f))
            .cloned()
            .collect();
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.client().await?;
        let found = self
            .autocomplete_rows(conn.as_ref(), table, &fields, &available, value)
            .await;
        self.evicting(found).await
    }

    /// Unfiltered counts are exact key counts; filtered counts race the
    /// timeout with the key count as the estimate
    #[tracing::instrument(skip(self, settings, query), fields(db = %self.fingerprint))]
    async fn count_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowCount> {
        let available = self.available_fields(table, settings).await?;
        let conn = self.client().await?;
        let scanned = scan_keys(conn.as_ref(), &table_pattern(table), None).await;
        let keys = self.evicting(scanned).await?;
        let estimate = keys.len() as u64;
        if !Self::is_narrowed(query) {
            return Ok(RowCount::Exact(estimate));
        }

        let approximate = async move { Ok::<_, DaoError>(Some(estimate)) };
        let exact = Self::count_matching(
            conn.as_ref(),
            table,
            &keys,
            settings,
            &available,
            query,
        );
        let count = count_rows_with_fallback(&self.config, approximate, exact).await;
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
        let available = self.available_fields(table, settings).await?;
        let conn = self.client().await?;
        let rows = Self::fetch_window(
            conn.as_ref(),
            table,
            settings,
            &available,
            query,
            offset,
            limit,
        )
        .await;
        self.evicting(rows).await
    }

    async fn get_table_structure(&self, table: &str) -> Result<Vec<TableStructure>> {
        Ok(self.structure(table).await?.as_ref().clone())
    }

    async fn get_table_primary_columns(&self, _table: &str) -> Result<Vec<PrimaryKey>> {
        Ok(Self::primary_keys())
    }

    async fn get_table_foreign_keys(&self, _table: &str) -> Result<Vec<ForeignKey>> {
        Ok(Vec::new())
    }

    async fn get_tables_from_db(&self) -> Result<Vec<TableDs>> {
        let tables = self
            .caches
            .introspection()
            .tables(&self.fingerprint, || async {
                let conn = self.client().await?;
                let loaded = Self::load_tables(conn.as_ref()).await;
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

    /// Runs one command line; the reply comes back as `key`/`value` records
    #[tracing::instrument(skip(self, query), fields(db = %self.fingerprint))]
    async fn execute_raw_query(&self, query: &str) -> Result<Vec<RowRecord>> {
        let conn = self.client().await?;
        let result = conn.query(query, &[]).await;
        let result = self.evicting(result).await?;
        Ok(reply_records(&reply_of(&result)))
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
