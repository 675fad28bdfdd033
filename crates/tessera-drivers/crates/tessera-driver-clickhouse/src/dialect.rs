//! ClickHouse flavour of the relational DAO

use async_trait::async_trait;
use tessera_core::{
    Connection, ConnectionParams, DaoCapabilities, DatabaseType, ForeignKey, PrimaryKey,
    ReferencedTableNamesAndColumns, Result, TableDs, TableStructure,
};
use tessera_query::rows::first_count;
use tessera_query::{InsertKeys, SqlDialect, TableRef};

use crate::schema;

const DEFAULT_DATABASE: &str = "default";

/// Backtick quoting, inlined literals and `ALTER TABLE` mutations
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickHouseDialect;

impl ClickHouseDialect {
    fn database_of(table: &TableRef) -> &str {
        table.schema().unwrap_or(DEFAULT_DATABASE)
    }
}

#[async_trait]
impl SqlDialect for ClickHouseDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Clickhouse
    }

    fn capabilities(&self) -> DaoCapabilities {
        DaoCapabilities {
            foreign_keys: false,
            views: true,
            streams_large_tables: true,
            generated_keys: false,
        }
    }

    fn default_schema(&self, params: &ConnectionParams) -> Option<String> {
        Some(
            params
                .database
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        )
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('`', '`')
    }

    fn placeholder(&self, _index: usize) -> Option<String> {
        None
    }

    fn insert_keys(&self) -> InsertKeys {
        InsertKeys::EchoInput
    }

    fn cast_to_text(&self, expr: &str) -> String {
        format!("toString({})", expr)
    }

    fn case_insensitive_like(&self, text_expr: &str, pattern: &str) -> String {
        format!("{} ILIKE {}", text_expr, pattern)
    }

    /// LIKE escapes with backslash and has no ESCAPE clause
    fn like_escape_clause(&self) -> &'static str {
        ""
    }

    fn update_statement(&self, table: &str, assignments: &str, predicate: &str) -> String {
        format!("ALTER TABLE {} UPDATE {} WHERE {}", table, assignments, predicate)
    }

    fn delete_statement(&self, table: &str, predicate: &str) -> String {
        format!("ALTER TABLE {} DELETE WHERE {}", table, predicate)
    }

    /// Mutations are acknowledged without a row count
    fn reports_affected_rows(&self) -> bool {
        false
    }

    async fn approximate_count(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Option<u64>> {
        let sql = schema::estimate_sql(Self::database_of(table), &table.name)?;
        let result = conn.query(&sql, &[]).await?;
        Ok(first_count(&result))
    }

    async fn table_structure(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<TableStructure>> {
        schema::table_structure(conn, Self::database_of(table), &table.name).await
    }

    async fn primary_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<PrimaryKey>> {
        schema::primary_keys(conn, Self::database_of(table), &table.name).await
    }

    async fn foreign_keys(&self, _conn: &dyn Connection, _table: &TableRef) -> Result<Vec<ForeignKey>> {
        Ok(Vec::new())
    }

    async fn referencing_columns(
        &self,
        _conn: &dyn Connection,
        _table: &TableRef,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>> {
        Ok(Vec::new())
    }

    async fn tables(&self, conn: &dyn Connection, schema: Option<&str>) -> Result<Vec<TableDs>> {
        schema::tables(conn, schema.unwrap_or(DEFAULT_DATABASE)).await
    }
}
