use async_trait::async_trait;
use tessera_core::{
    CanonicalType, Connection, ConnectionParams, DaoCapabilities, DatabaseType, ForeignKey,
    PrimaryKey, ReferencedTableNamesAndColumns, Result, TableDs, TableStructure,
};

use crate::dialect::{InsertKeys, PagingStyle, SqlDialect, TableRef};

/// Dialect with `$n` placeholders, or inline literals when `inline` is set
pub struct FakeDialect {
    pub inline: bool,
    pub paging: PagingStyle,
}

impl FakeDialect {
    pub fn numbered() -> Self {
        Self {
            inline: false,
            paging: PagingStyle::LimitOffset,
        }
    }

    pub fn inline() -> Self {
        Self {
            inline: true,
            paging: PagingStyle::LimitOffset,
        }
    }

    pub fn offset_fetch() -> Self {
        Self {
            inline: false,
            paging: PagingStyle::OffsetFetch,
        }
    }
}

#[async_trait]
impl SqlDialect for FakeDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    fn capabilities(&self) -> DaoCapabilities {
        DaoCapabilities::default()
    }

    fn default_schema(&self, _params: &ConnectionParams) -> Option<String> {
        None
    }

    fn placeholder(&self, index: usize) -> Option<String> {
        (!self.inline).then(|| format!("${}", index))
    }

    fn insert_keys(&self) -> InsertKeys {
        InsertKeys::EchoInput
    }

    fn paging_style(&self) -> PagingStyle {
        self.paging
    }

    async fn approximate_count(&self, _: &dyn Connection, _: &TableRef) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn table_structure(&self, _: &dyn Connection, _: &TableRef) -> Result<Vec<TableStructure>> {
        Ok(users())
    }

    async fn primary_keys(&self, _: &dyn Connection, _: &TableRef) -> Result<Vec<PrimaryKey>> {
        Ok(Vec::new())
    }

    async fn foreign_keys(&self, _: &dyn Connection, _: &TableRef) -> Result<Vec<ForeignKey>> {
        Ok(Vec::new())
    }

    async fn referencing_columns(
        &self,
        _: &dyn Connection,
        _: &TableRef,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>> {
        Ok(Vec::new())
    }

    async fn tables(&self, _: &dyn Connection, _: Option<&str>) -> Result<Vec<TableDs>> {
        Ok(Vec::new())
    }
}

/// `users(id integer, name varchar, email text, created timestamp, tags json)`
pub fn users() -> Vec<TableStructure> {
    vec![
        TableStructure::new("id", CanonicalType::Integer, "int4"),
        TableStructure::new("name", CanonicalType::String, "varchar"),
        TableStructure::new("email", CanonicalType::Text, "text"),
        TableStructure::new("created", CanonicalType::Timestamp, "timestamp"),
        TableStructure::new("tags", CanonicalType::Json, "json"),
    ]
}
