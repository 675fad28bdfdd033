//! Engine seam of the relational adapter

use async_trait::async_trait;
use tessera_core::{
    Connection, ConnectionParams, DaoCapabilities, DatabaseType, ForeignKey, PrimaryKey,
    ReferencedTableNamesAndColumns, Result, TableDs, TableStructure, sanitize,
};

/// A table name together with the schema (or database) it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

/// How an insert reports the key of the new row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertKeys {
    /// `INSERT ... RETURNING pk`
    Returning,
    /// `INSERT ... OUTPUT INSERTED.pk VALUES ...`
    OutputInserted,
    /// The session's last generated id, reported with the statement result
    LastInsertId,
    /// No generated keys; the primary-key subset of the input is returned
    EchoInput,
}

/// Syntax of the page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`, which needs an `ORDER BY`
    OffsetFetch,
}

/// Everything that differs between relational engines.
///
/// The statement-shaping methods have ANSI defaults; the catalog methods run
/// the engine's own introspection queries over an already acquired client.
#[async_trait]
pub trait SqlDialect: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    fn capabilities(&self) -> DaoCapabilities;

    /// Schema (or database) that unqualified table names resolve against
    fn default_schema(&self, params: &ConnectionParams) -> Option<String>;

    /// Opening and closing identifier quote
    fn identifier_quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Bind placeholder for the 1-based parameter `index`, or `None` when the
    /// engine cannot bind and values are rendered as literals
    fn placeholder(&self, index: usize) -> Option<String>;

    fn insert_keys(&self) -> InsertKeys;

    fn paging_style(&self) -> PagingStyle {
        PagingStyle::LimitOffset
    }

    /// Expression converting `expr` to text for LIKE matching
    fn cast_to_text(&self, expr: &str) -> String {
        format!("CAST({} AS TEXT)", expr)
    }

    /// Case-insensitive LIKE of a text expression against a bound pattern
    fn case_insensitive_like(&self, text_expr: &str, pattern: &str) -> String {
        format!(
            "LOWER({}) LIKE LOWER({}){}",
            text_expr,
            pattern,
            self.like_escape_clause()
        )
    }

    /// Escape clause appended to LIKE predicates
    fn like_escape_clause(&self) -> &'static str {
        " ESCAPE '\\'"
    }

    /// Escape a LIKE operand for this engine
    fn escape_like(&self, value: &str) -> String {
        sanitize::escape_like(value, '\\')
    }

    /// Insert statement for a row with no explicit values
    fn insert_default_values(&self, table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    }

    fn update_statement(&self, table: &str, assignments: &str, predicate: &str) -> String {
        format!("UPDATE {} SET {} WHERE {}", table, assignments, predicate)
    }

    fn delete_statement(&self, table: &str, predicate: &str) -> String {
        format!("DELETE FROM {} WHERE {}", table, predicate)
    }

    /// Exact count statement; `predicate` is empty or starts with ` WHERE`
    fn count_statement(&self, table: &str, predicate: &str) -> String {
        format!("SELECT COUNT(*) FROM {}{}", table, predicate)
    }

    /// Whether `affected_rows` of a DELETE is meaningful
    fn reports_affected_rows(&self) -> bool {
        true
    }

    /// Catalog estimate of the table's row count; `None` when unknown
    async fn approximate_count(&self, conn: &dyn Connection, table: &TableRef)
    -> Result<Option<u64>>;

    async fn table_structure(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<TableStructure>>;

    async fn primary_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<PrimaryKey>>;

    async fn foreign_keys(&self, conn: &dyn Connection, table: &TableRef) -> Result<Vec<ForeignKey>>;

    /// Columns of other tables whose foreign keys point at `table`
    async fn referencing_columns(
        &self,
        conn: &dyn Connection,
        table: &TableRef,
    ) -> Result<Vec<ReferencedTableNamesAndColumns>>;

    /// Tables and views of `schema`, sorted by name
    async fn tables(&self, conn: &dyn Connection, schema: Option<&str>) -> Result<Vec<TableDs>>;
}
