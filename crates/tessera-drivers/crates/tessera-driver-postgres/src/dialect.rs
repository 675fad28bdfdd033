//! PostgreSQL flavour of the relational DAO

use async_trait::async_trait;
use tessera_core::{
    Connection, ConnectionParams, DaoCapabilities, DatabaseType, ForeignKey, PrimaryKey,
    ReferencedTableNamesAndColumns, Result, TableDs, TableStructure, Value,
};
use tessera_query::rows::opt_i64;
use tessera_query::{InsertKeys, SqlDialect, TableRef};

use crate::schema;

const DEFAULT_SCHEMA: &str = "public";

/// `$n` placeholders, `RETURNING` keys, `ILIKE` search, `reltuples` estimates
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    fn schema_of(table: &TableRef) -> &str {
        table.schema().unwrap_or(DEFAULT_SCHEMA)
    }
}

#[async_trait]
impl SqlDialect for PostgresDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
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

    fn placeholder(&self, index: usize) -> Option<String> {
        Some(format!("${}", index))
    }

    fn insert_keys(&self) -> InsertKeys {
        InsertKeys::Returning
    }

    fn case_insensitive_like(&self, text_expr: &str, pattern: &str) -> String {
        format!("{} ILIKE {}{}", text_expr, pattern, self.like_escape_clause())
    }

    async fn approximate_count(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Option<u64>> {
        let result = conn
            .query(
                schema::ESTIMATE_SQL,
                &[
                    Value::String(Self::schema_of(table).to_string()),
                    Value::String(table.name.clone()),
                ],
            )
            .await?;
        Ok(result
            .rows
            .first()
            .and_then(|row| opt_i64(row, "estimate"))
            .filter(|estimate| *estimate >= 0)
            .map(|estimate| estimate as u64))
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
