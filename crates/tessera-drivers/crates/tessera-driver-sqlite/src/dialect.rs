//! SQLite flavour of the relational DAO

use async_trait::async_trait;
use tessera_core::{
    Connection, ConnectionParams, DaoCapabilities, DatabaseType, ForeignKey, PrimaryKey,
    ReferencedTableNamesAndColumns, Result, TableDs, TableStructure,
};
use tessera_query::{InsertKeys, SqlDialect, TableRef};

use crate::schema;

/// `?N` placeholders and `last_insert_rowid` keys
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SqlDialect for SqliteDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn capabilities(&self) -> DaoCapabilities {
        DaoCapabilities {
            foreign_keys: true,
            views: true,
            streams_large_tables: false,
            generated_keys: true,
        }
    }

    fn default_schema(&self, _params: &ConnectionParams) -> Option<String> {
        None
    }

    fn placeholder(&self, index: usize) -> Option<String> {
        Some(format!("?{}", index))
    }

    fn insert_keys(&self) -> InsertKeys {
        InsertKeys::LastInsertId
    }

    /// SQLite keeps no row statistics, so the bounded exact count decides
    async fn approximate_count(
        &self,
        _conn: &dyn Connection,
        _table: &TableRef,
    ) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn table_structure(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<TableStructure>> {
        schema::table_structure(conn, &table.name).await
    }

    async fn primary_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<PrimaryKey>> {
        schema::primary_keys(conn, &table.name).await
    }

    async fn foreign_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<ForeignKey>> {
        schema::foreign_keys(conn, &table.name).await
    }

    async fn referencing_columns(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>> {
        schema::referencing_columns(conn, &table.name).await
    }

    async fn tables(&self, conn: &dyn Connection, _schema: Option<&str>) -> Result<Vec<TableDs>> {
        schema::tables(conn).await
    }
}
