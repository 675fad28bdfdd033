//! T-SQL flavour of the relational DAO

use async_trait::async_trait;
use tessera_core::{
    Connection, ConnectionParams, DaoCapabilities, DatabaseType, ForeignKey, PrimaryKey,
    ReferencedTableNamesAndColumns, Result, TableDs, TableStructure,
};
use tessera_query::rows::first_count;
use tessera_query::{InsertKeys, PagingStyle, SqlDialect, TableRef};

use crate::schema;

const DEFAULT_SCHEMA: &str = "dbo";

/// Bracket quoting, `@Pn` placeholders, `OUTPUT INSERTED` keys and
/// `OFFSET ... FETCH` paging
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    fn schema_of(table: &TableRef) -> &str {
        table.schema().unwrap_or(DEFAULT_SCHEMA)
    }
}

#[async_trait]
impl SqlDialect for MssqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mssql
    }

    fn capabilities(&self) -> DaoCapabilities {
        DaoCapabilities {
            foreign_keys: true,
            views: true,
            streams_large_tables: false,
            generated_keys: true,
        }
    }

    fn default_schema(&self, params: &ConnectionParams) -> Option<String> {
        Some(
            params
                .schema
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
        )
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('[', ']')
    }

    fn placeholder(&self, index: usize) -> Option<String> {
        Some(format!("@P{}", index))
    }

    fn insert_keys(&self) -> InsertKeys {
        InsertKeys::OutputInserted
    }

    fn paging_style(&self) -> PagingStyle {
        PagingStyle::OffsetFetch
    }

    fn cast_to_text(&self, expr: &str) -> String {
        format!("CAST({} AS NVARCHAR(MAX))", expr)
    }

    /// `[` opens a character class in T-SQL patterns
    fn escape_like(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            if matches!(c, '%' | '_' | '[' | '\\') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }

    async fn approximate_count(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Option<u64>> {
        let result = conn
            .query(schema::ESTIMATE_SQL, &schema::key(Self::schema_of(table), &table.name))
            .await?;
        Ok(first_count(&result))
    }

    async fn table_structure(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<TableStructure>> {
        schema::table_structure(conn, Self::schema_of(table), &table.name).await
    }

    async fn primary_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<PrimaryKey>> {
        schema::primary_keys(conn, Self::schema_of(table), &table.name).await
    }

    async fn foreign_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<ForeignKey>> {
        schema::foreign_keys(conn, Self::schema_of(table), &table.name).await
    }

    async fn referencing_columns(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>> {
        schema::referencing_columns(conn, Self::schema_of(table), &table.name).await
    }

    async fn tables(&self, conn: &dyn Connection, schema: Option<&str>) -> Result<Vec<TableDs>> {
        schema::tables(conn, schema.unwrap_or(DEFAULT_SCHEMA)).await
    }
}
