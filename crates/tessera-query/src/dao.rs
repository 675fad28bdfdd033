//! The DAO contract for relational engines

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use tessera_connection::{CacheService, ClientProvisioner};
use tessera_core::{
    AutocompleteFields, Connection, ConnectionParams, CsvImportResult, DaoCapabilities, DaoConfig,
    DaoError, DatabaseType, Fingerprint, ForeignKey, PrimaryKey, QueryResult,
    ReferencedTableNamesAndColumns, Result, RowCount, RowRecord, RowStream, RowsQuery,
    StatementResult, TableDao, TableDs, TableSettings, TableStructure, TestConnectionResult,
    Value, coerce_json, count_rows_with_fallback, find_available_fields, resolve_ordering,
    resolve_search_fields,
};

use crate::dialect::{InsertKeys, SqlDialect, TableRef};
use crate::predicate::{
    autocomplete_predicate, filter_predicate, primary_key_predicate, search_predicate,
};
use crate::rows::first_count;
use crate::statement::{SqlBuilder, is_row_returning, where_clause};


/// Table DAO for one relational connection.
///
/// Clients come from the shared [`CacheService`] on every call; any
/// connectivity error evicts the cached client so the next call reconnects.
pub struct SqlTableDao {
    params: ConnectionParams,
    fingerprint: Fingerprint,
    schema: Option<String>,
    dialect: Arc<dyn SqlDialect>,
    provisioner: Arc<dyn ClientProvisioner>,
    caches: Arc<CacheService>,
    config: DaoConfig,
}

impl SqlTableDao {
    pub fn new(
        params: ConnectionParams,
        dialect: Arc<dyn SqlDialect>,
        provisioner: Arc<dyn ClientProvisioner>,
        caches: Arc<CacheService>,
        config: DaoConfig,
    ) -> Self {
        let fingerprint = params.fingerprint();
        let schema = dialect.default_schema(&params);
        Self {
            params,
            fingerprint,
            schema,
            dialect,
            provisioner,
            caches,
            config,
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    fn table_ref(&self, table: &str) -> TableRef {
        TableRef::new(self.schema.clone(), table)
    }

    fn builder(&self) -> SqlBuilder<'_> {
        SqlBuilder::new(self.dialect.as_ref())
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

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        tracing::debug!(sql, params = params.len(), "query");
        let conn = self.client().await?;
        let result = conn.query(sql, params).await;
        self.evicting(result).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tracing::debug!(sql, params = params.len(), "execute");
        let conn = self.client().await?;
        let result = conn.execute(sql, params).await;
        self.evicting(result).await
    }

    async fn structure(&self, table: &str) -> Result<Arc<Vec<TableStructure>>> {
        let table_ref = self.table_ref(table);
        self.caches
            .introspection()
            .structure(&self.fingerprint, table, || async {
                let conn = self.client().await?;
                let loaded = self.dialect.table_structure(conn.as_ref(), &table_ref).await;
                let columns = self.evicting(loaded).await?;
                // Not cached, so a table created later is picked up
                if columns.is_empty() {
                    return Err(DaoError::NotFound(format!("table \"{}\" not found", table)));
                }
                Ok(columns)
            })
            .await
    }

    async fn primary_keys(&self, table: &str) -> Result<Arc<Vec<PrimaryKey>>> {
        let table_ref = self.table_ref(table);
        self.caches
            .introspection()
            .primary_keys(&self.fingerprint, table, || async {
                let conn = self.client().await?;
                let loaded = self.dialect.primary_keys(conn.as_ref(), &table_ref).await;
                self.evicting(loaded).await
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

    /// Search disjunction and filter conjunction of a listing request
    fn listing_conditions(
        builder: &mut SqlBuilder<'_>,
        structure: &[TableStructure],
        available: &[String],
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<Vec<String>> {
        let mut conditions = Vec::new();
        if let Some(value) = query.search_value() {
            let fields = resolve_search_fields(settings, available, Some(value));
            if let Some(search) = search_predicate(builder, &fields, structure, value)? {
                conditions.push(search);
            }
        }
        for filter in &query.filters {
            if let Some(condition) = filter_predicate(builder, filter, structure)? {
                conditions.push(condition);
            }
        }
        Ok(conditions)
    }

    fn primary_key_subset(row: &RowRecord, primary_keys: &[PrimaryKey]) -> RowRecord {
        if primary_keys.is_empty() {
            return row.clone();
        }
        primary_keys
            .iter()
            .filter_map(|pk| {
                row.get(&pk.column_name)
                    .map(|v| (pk.column_name.clone(), v.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl TableDao for SqlTableDao {
    fn database_type(&self) -> DatabaseType {
        self.dialect.database_type()
    }

    fn capabilities(&self) -> DaoCapabilities {
        self.dialect.capabilities()
    }

    fn config(&self) -> &DaoConfig {
        &self.config
    }

    #[tracing::instrument(skip(self, row), fields(db = %self.fingerprint))]
    async fn add_row_in_table(&self, table: &str, row: &RowRecord) -> Result<RowRecord> {
        let structure = self.structure(table).await?;
        let primary_keys = self.primary_keys(table).await?;
        let table_ref = self.table_ref(table);

        let mut builder = self.builder();
        let target = builder.table(&table_ref)?;
        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (name, value) in row {
            let column = structure
                .iter()
                .find(|c| &c.column_name == name)
                .ok_or_else(|| {
                    DaoError::Validation(format!(
                        "There is no column \"{}\" in table \"{}\"",
                        name, table
                    ))
                })?;
            columns.push(builder.ident(name)?);
            values.push(builder.bind(coerce_json(value, column.data_type))?);
        }

        let key_columns = primary_keys
            .iter()
            .map(|pk| builder.ident(&pk.column_name))
            .collect::<Result<Vec<_>>>()?;
        let strategy = match self.dialect.insert_keys() {
            InsertKeys::Returning | InsertKeys::OutputInserted if key_columns.is_empty() => {
                InsertKeys::EchoInput
            }
            strategy => strategy,
        };

        let output = if strategy == InsertKeys::OutputInserted {
            let inserted: Vec<String> = key_columns
                .iter()
                .map(|c| format!("INSERTED.{}", c))
                .collect();
            format!(" OUTPUT {}", inserted.join(", "))
        } else {
            String::new()
        };
        let mut sql = if columns.is_empty() {
            if output.is_empty() {
                self.dialect.insert_default_values(&target)
            } else {
                format!("INSERT INTO {}{} DEFAULT VALUES", target, output)
            }
        } else {
            format!(
                "INSERT INTO {} ({}){} VALUES ({})",
                target,
                columns.join(", "),
                output,
                values.join(", ")
            )
        };
        if strategy == InsertKeys::Returning {
            sql.push_str(" RETURNING ");
            sql.push_str(&key_columns.join(", "));
        }
        let params = builder.into_params();

        match strategy {
            InsertKeys::Returning | InsertKeys::OutputInserted => {
                let result = self.query(&sql, &params).await?;
                result
                    .rows
                    .first()
                    .map(|r| r.to_record())
                    .ok_or_else(|| DaoError::Query("insert did not report the new key".to_string()))
            }
            InsertKeys::LastInsertId => {
                let result = self.execute(&sql, &params).await?;
                let generated = match (primary_keys.as_slice(), result.last_insert_id) {
                    ([pk], Some(id)) if !row.contains_key(&pk.column_name) => {
                        let auto = structure
                            .iter()
                            .any(|c| c.column_name == pk.column_name && c.is_auto_increment);
                        auto.then(|| {
                            let mut key = RowRecord::new();
                            key.insert(pk.column_name.clone(), serde_json::Value::from(id));
                            key
                        })
                    }
                    _ => None,
                };
                Ok(generated.unwrap_or_else(|| Self::primary_key_subset(row, &primary_keys)))
            }
            InsertKeys::EchoInput => {
                self.execute(&sql, &params).await?;
                Ok(Self::primary_key_subset(row, &primary_keys))
            }
        }
    }

    #[tracing::instrument(skip(self, primary_key, settings), fields(db = %self.fingerprint))]
    async fn get_row_by_primary_key(
        &self,
        table: &str,
        primary_key: &RowRecord,
        settings: &TableSettings,
    ) -> Result<Option<RowRecord>> {
        let (structure, available) = self.available_fields(table, settings).await?;
        if available.is_empty() {
            return Err(DaoError::Configuration(format!(
                "every column of \"{}\" is excluded",
                table
            )));
        }

        let mut builder = self.builder();
        let fields = builder.column_list(&available)?;
        let target = builder.table(&self.table_ref(table))?;
        let predicate = primary_key_predicate(&mut builder, primary_key, &structure)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {}{}",
            fields,
            target,
            predicate,
            builder.window(0, 1, false)
        );
        let result = self.query(&sql, builder.params()).await?;
        Ok(result.rows.first().map(|r| r.to_record()))
    }

    #[tracing::instrument(skip(self, row, primary_key), fields(db = %self.fingerprint))]
    async fn update_row_in_table(
        &self,
        table: &str,
        row: &RowRecord,
        primary_key: &RowRecord,
    ) -> Result<RowRecord> {
        if row.is_empty() {
            return Err(DaoError::Validation("nothing to update".to_string()));
        }
        let structure = self.structure(table).await?;

        let mut builder = self.builder();
        let target = builder.table(&self.table_ref(table))?;
        let mut assignments = Vec::with_capacity(row.len());
        for (name, value) in row {
            let column = structure
                .iter()
                .find(|c| &c.column_name == name)
                .ok_or_else(|| {
                    DaoError::Validation(format!(
                        "There is no column \"{}\" in table \"{}\"",
                        name, table
                    ))
                })?;
            let quoted = builder.ident(name)?;
            let bound = builder.bind(coerce_json(value, column.data_type))?;
            assignments.push(format!("{} = {}", quoted, bound));
        }
        let predicate = primary_key_predicate(&mut builder, primary_key, &structure)?;
        let sql = self
            .dialect
            .update_statement(&target, &assignments.join(", "), &predicate);
        self.execute(&sql, builder.params()).await?;

        // The key may itself have been updated
        let mut key = primary_key.clone();
        for (name, value) in key.iter_mut() {
            if let Some(updated) = row.get(name) {
                *value = updated.clone();
            }
        }
        Ok(key)
    }

    #[tracing::instrument(skip(self, primary_key), fields(db = %self.fingerprint))]
    async fn delete_row_in_table(
        &self,
        table: &str,
        primary_key: &RowRecord,
    ) -> Result<RowRecord> {
        let structure = self.structure(table).await?;

        let mut builder = self.builder();
        let target = builder.table(&self.table_ref(table))?;
        let predicate = primary_key_predicate(&mut builder, primary_key, &structure)?;
        let sql = self.dialect.delete_statement(&target, &predicate);
        let result = self.execute(&sql, builder.params()).await?;

        if self.dialect.reports_affected_rows() && result.affected_rows == 0 {
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
        let Some(value) = autocomplete.value.as_deref() else {
            return Ok(Vec::new());
        };
        let (structure, available) = self.available_fields(table, settings).await?;
        let fields: Vec<String> = autocomplete
            .fields
            .iter()
            .filter(|f| available.contains(f))
            .cloned()
            .collect();

        let mut builder = self.builder();
        let columns = builder.column_list(&available)?;
        let target = builder.table(&self.table_ref(table))?;
        let Some(predicate) = autocomplete_predicate(&mut builder, &fields, &structure, value)?
        else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {}{}",
            columns,
            target,
            predicate,
            builder.window(0, self.config.autocomplete_row_limit(), false)
        );
        Ok(self.query(&sql, builder.params()).await?.into_records())
    }

    #[tracing::instrument(skip(self, settings, query), fields(db = %self.fingerprint))]
    async fn count_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowCount> {
        let (structure, available) = self.available_fields(table, settings).await?;
        let table_ref = self.table_ref(table);

        let mut builder = self.builder();
        let target = builder.table(&table_ref)?;
        let conditions =
            Self::listing_conditions(&mut builder, &structure, &available, settings, query)?;
        let sql = self
            .dialect
            .count_statement(&target, &where_clause(&conditions));
        let params = builder.into_params();

        let conn = self.client().await?;
        let approximate = self.dialect.approximate_count(conn.as_ref(), &table_ref);
        let exact = async {
            tracing::debug!(sql = %sql, "exact count");
            let result = conn.query(&sql, &params).await?;
            first_count(&result)
                .ok_or_else(|| DaoError::Query("COUNT returned no rows".to_string()))
        };
        let count = count_rows_with_fallback(&self.config, approximate, exact).await;
        self.evicting(count).await
    }

    #[tracing::instrument(skip(self, settings, query), fields(db = %self.fingerprint))]
    async fn fetch_rows(
        &self,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>> {
        let (structure, available) = self.available_fields(table, settings).await?;
        if available.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = self.builder();
        let columns = builder.column_list(&available)?;
        let target = builder.table(&self.table_ref(table))?;
        let conditions =
            Self::listing_conditions(&mut builder, &structure, &available, settings, query)?;
        let order = match resolve_ordering(settings, &available) {
            Some((field, direction)) => {
                format!(" ORDER BY {} {}", builder.ident(&field)?, direction.as_sql())
            }
            None => String::new(),
        };
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            columns,
            target,
            where_clause(&conditions),
            order,
            builder.window(offset, limit, !order.is_empty())
        );
        Ok(self.query(&sql, builder.params()).await?.into_records())
    }

    async fn get_table_structure(&self, table: &str) -> Result<Vec<TableStructure>> {
        Ok(self.structure(table).await?.as_ref().clone())
    }

    async fn get_table_primary_columns(&self, table: &str) -> Result<Vec<PrimaryKey>> {
        Ok(self.primary_keys(table).await?.as_ref().clone())
    }

    async fn get_table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        if !self.capabilities().foreign_keys {
            return Ok(Vec::new());
        }
        let table_ref = self.table_ref(table);
        let foreign_keys = self
            .caches
            .introspection()
            .foreign_keys(&self.fingerprint, table, || async {
                let conn = self.client().await?;
                let loaded = self.dialect.foreign_keys(conn.as_ref(), &table_ref).await;
                self.evicting(loaded).await
            })
            .await?;
        Ok(foreign_keys.as_ref().clone())
    }

    async fn get_tables_from_db(&self) -> Result<Vec<TableDs>> {
        let tables = self
            .caches
            .introspection()
            .tables(&self.fingerprint, || async {
                let conn = self.client().await?;
                let loaded = self.dialect.tables(conn.as_ref(), self.schema.as_deref()).await;
                self.evicting(loaded).await
            })
            .await?;
        Ok(tables.as_ref().clone())
    }

    async fn get_referenced_table_names_and_columns(
        &self,
        table: &str,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>> {
        if !self.capabilities().foreign_keys {
            return Ok(Vec::new());
        }
        let conn = self.client().await?;
        let referenced = self
            .dialect
            .referencing_columns(conn.as_ref(), &self.table_ref(table))
            .await;
        self.evicting(referenced).await
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

    #[tracing::instrument(skip(self, query), fields(db = %self.fingerprint))]
    async fn execute_raw_query(&self, query: &str) -> Result<Vec<RowRecord>> {
        if is_row_returning(query) {
            return Ok(self.query(query, &[]).await?.into_records());
        }
        let result = self.execute(query, &[]).await?;
        let mut record = RowRecord::new();
        record.insert(
            "affected_rows".to_string(),
            serde_json::Value::from(result.affected_rows),
        );
        Ok(vec![record])
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
