//! MySQL flavour of the relational DAO

use async_trait::async_trait;
use tessera_core::{
    Connection, ConnectionParams, DaoCapabilities, DaoConfig, DatabaseType, ForeignKey,
    PrimaryKey, ReferencedTableNamesAndColumns, Result, TableDs, TableStructure,
};
use tessera_query::rows::first_count;
use tessera_query::{InsertKeys, SqlDialect, TableRef};

use crate::schema;

/// Backtick quoting, `?` placeholders, `LAST_INSERT_ID` keys and
/// server-bounded exact counts
#[derive(Debug, Clone, Copy)]
pub struct MySqlDialect {
    count_timeout_ms: u64,
}

impl MySqlDialect {
    pub fn new(config: &DaoConfig) -> Self {
        Self {
            count_timeout_ms: config.count_timeout().as_millis() as u64,
        }
    }
}

#[async_trait]
impl SqlDialect for MySqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    fn capabilities(&self) -> DaoCapabilities {
        DaoCapabilities {
            foreign_keys: true,
            views: true,
            streams_large_tables: false,
            generated_keys: true,
        }
    }

    /// A MySQL schema is a database
    fn default_schema(&self, params: &ConnectionParams) -> Option<String> {
        params.database.clone().filter(|d| !d.is_empty())
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('`', '`')
    }

    fn placeholder(&self, _index: usize) -> Option<String> {
        Some("?".to_string())
    }

    fn insert_keys(&self) -> InsertKeys {
        InsertKeys::LastInsertId
    }

    fn cast_to_text(&self, expr: &str) -> String {
        format!("CAST({} AS CHAR)", expr)
    }

    /// Backslash is already LIKE's escape character, and `'\'` would open an
    /// unterminated string literal
    fn like_escape_clause(&self) -> &'static str {
        ""
    }

    fn insert_default_values(&self, table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", table)
    }

    /// The optimizer hint makes the server abandon the count itself once the
    /// client has given up on it
    fn count_statement(&self, table: &str, predicate: &str) -> String {
        format!(
            "SELECT /*+ MAX_EXECUTION_TIME({}) */ COUNT(*) FROM {}{}",
            self.count_timeout_ms, table, predicate
        )
    }

    async fn approximate_count(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Option<u64>> {
        let result = conn
            .query(
                schema::ESTIMATE_SQL,
                &schema::table_key(table.schema(), &table.name),
            )
            .await?;
        Ok(first_count(&result))
    }

    async fn table_structure(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<TableStructure>> {
        schema::table_structure(conn, table.schema(), &table.name).await
    }

    async fn primary_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<PrimaryKey>> {
        schema::primary_keys(conn, table.schema(), &table.name).await
    }

    async fn foreign_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<ForeignKey>> {
        schema::foreign_keys(conn, table.schema(), &table.name).await
    }

    async fn referencing_columns(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>> {
        schema::referencing_columns(conn, table.schema(), &table.name).await
    }

    async fn tables(&self, conn: &dyn Connection, schema: Option<&str>) -> Result<Vec<TableDs>> {
        schema::tables(conn, schema).await
    }
}
