use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncRead;

use tessera_core::{
    AutocompleteFields, CanonicalType, CsvImportResult, DaoCapabilities, DaoConfig, DaoError,
    DatabaseType, ForeignKey, PrimaryKey, ReferencedTableNamesAndColumns, Result, RowCount,
    RowRecord, RowStream, RowsQuery, TableDao, TableDs, TableSettings, TableStructure,
    TestConnectionResult,
};

/// In-memory table `people(id integer auto, name text not null, age integer,
/// active boolean)`; inserts of a row named "reject" fail
pub struct MemoryDao {
    pub rows: Mutex<Vec<RowRecord>>,
    pub config: DaoConfig,
    pub capabilities: DaoCapabilities,
    pub count: Option<RowCount>,
    pub fetches: AtomicUsize,
}

impl MemoryDao {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            config: DaoConfig::default(),
            capabilities: DaoCapabilities::default(),
            count: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_rows(n: usize) -> Self {
        let dao = Self::new();
        {
            let mut rows = dao.rows.lock();
            for i in 0..n {
                let mut row = RowRecord::new();
                row.insert("id".into(), serde_json::json!(i + 1));
                rows.push(row);
            }
        }
        dao
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn structure() -> Vec<TableStructure> {
    let mut id = TableStructure::new("id", CanonicalType::Integer, "integer");
    id.is_auto_increment = true;
    id.allow_null = false;
    let mut name = TableStructure::new("name", CanonicalType::Text, "text");
    name.allow_null = false;
    vec![
        id,
        name,
        TableStructure::new("age", CanonicalType::Integer, "integer"),
        TableStructure::new("active", CanonicalType::Boolean, "boolean"),
    ]
}

#[async_trait]
impl TableDao for MemoryDao {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn capabilities(&self) -> DaoCapabilities {
        self.capabilities
    }

    fn config(&self) -> &DaoConfig {
        &self.config
    }

    async fn add_row_in_table(&self, _table: &str, row: &RowRecord) -> Result<RowRecord> {
        if row.get("name").and_then(|v| v.as_str()) == Some("reject") {
            return Err(DaoError::Query("constraint failed".into()));
        }
        let mut rows = self.rows.lock();
        rows.push(row.clone());
        let mut key = RowRecord::new();
        key.insert("id".into(), serde_json::json!(rows.len()));
        Ok(key)
    }

    async fn get_row_by_primary_key(
        &self,
        _table: &str,
        _primary_key: &RowRecord,
        _settings: &TableSettings,
    ) -> Result<Option<RowRecord>> {
        Ok(None)
    }

    async fn update_row_in_table(
        &self,
        _table: &str,
        _row: &RowRecord,
        primary_key: &RowRecord,
    ) -> Result<RowRecord> {
        Ok(primary_key.clone())
    }

    async fn delete_row_in_table(&self, _table: &str, primary_key: &RowRecord) -> Result<RowRecord> {
        Ok(primary_key.clone())
    }

    async fn autocomplete(
        &self,
        _table: &str,
        _settings: &TableSettings,
        _autocomplete: &AutocompleteFields,
    ) -> Result<Vec<RowRecord>> {
        Ok(Vec::new())
    }

    async fn count_rows(
        &self,
        _table: &str,
        _settings: &TableSettings,
        _query: &RowsQuery,
    ) -> Result<RowCount> {
        Ok(self
            .count
            .unwrap_or_else(|| RowCount::Exact(self.rows.lock().len() as u64)))
    }

    async fn fetch_rows(
        &self,
        _table: &str,
        _settings: &TableSettings,
        _query: &RowsQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RowRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_table_structure(&self, _table: &str) -> Result<Vec<TableStructure>> {
        Ok(structure())
    }

    async fn get_table_primary_columns(&self, _table: &str) -> Result<Vec<PrimaryKey>> {
        Ok(vec![PrimaryKey {
            column_name: "id".into(),
            data_type: CanonicalType::Integer,
        }])
    }

    async fn get_table_foreign_keys(&self, _table: &str) -> Result<Vec<ForeignKey>> {
        Ok(Vec::new())
    }

    async fn get_tables_from_db(&self) -> Result<Vec<TableDs>> {
        Ok(Vec::new())
    }

    async fn get_referenced_table_names_and_columns(
        &self,
        _table: &str,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>> {
        Ok(Vec::new())
    }

    async fn test_connect(&self) -> TestConnectionResult {
        TestConnectionResult::success()
    }

    async fn execute_raw_query(&self, _query: &str) -> Result<Vec<RowRecord>> {
        Ok(Vec::new())
    }

    async fn get_table_rows_stream(
        self: Arc<Self>,
        table: &str,
        settings: &TableSettings,
        query: &RowsQuery,
    ) -> Result<RowStream> {
        crate::stream_rows(self, table, settings, query).await
    }

    async fn import_csv_in_table(
        &self,
        table: &str,
        csv: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<CsvImportResult> {
        crate::import_csv(self, table, csv).await
    }
}
