//! Statement text assembly

use tessera_core::{Result, Value, sanitize};

use crate::dialect::{PagingStyle, SqlDialect, TableRef};

/// Accumulates bound values while SQL text is assembled left to right, so
/// placeholder numbering always follows textual order.
pub struct SqlBuilder<'d> {
    dialect: &'d dyn SqlDialect,
    params: Vec<Value>,
}

impl<'d> SqlBuilder<'d> {
    pub fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'d dyn SqlDialect {
        self.dialect
    }

    /// Quoted identifier
    pub fn ident(&self, name: &str) -> Result<String> {
        let (open, close) = self.dialect.identifier_quotes();
        sanitize::quote_identifier(name, open, close)
    }

    /// Quoted, schema-qualified table name
    pub fn table(&self, table: &TableRef) -> Result<String> {
        let (open, close) = self.dialect.identifier_quotes();
        sanitize::quote_qualified(table.schema(), &table.name, open, close)
    }

    /// Comma-separated quoted column list
    pub fn column_list(&self, columns: &[String]) -> Result<String> {
        let quoted = columns
            .iter()
            .map(|c| self.ident(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(quoted.join(", "))
    }

    /// Bind a value, returning the text to splice in its place: a
    /// placeholder, or a sanitized literal for engines without binding
    pub fn bind(&mut self, value: Value) -> Result<String> {
        match self.dialect.placeholder(self.params.len() + 1) {
            Some(placeholder) => {
                self.params.push(value);
                Ok(placeholder)
            }
            None => sanitize::render_literal(&value),
        }
    }

    /// Page window; `ordered` tells whether an ORDER BY was already emitted
    pub fn window(&self, offset: u64, limit: u64, ordered: bool) -> String {
        match self.dialect.paging_style() {
            PagingStyle::LimitOffset => format!(" LIMIT {} OFFSET {}", limit, offset),
            PagingStyle::OffsetFetch => {
                let order = if ordered { "" } else { " ORDER BY (SELECT NULL)" };
                format!(
                    "{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                    order, offset, limit
                )
            }
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

/// `" WHERE a AND b"` or an empty string
pub fn where_clause(conjuncts: &[String]) -> String {
    if conjuncts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conjuncts.join(" AND "))
    }
}

/// Whether a raw statement produces a result set
pub fn is_row_returning(sql: &str) -> bool {
    let trimmed = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    let keyword: String = trimmed
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    if matches!(
        keyword.as_str(),
        "SELECT" | "WITH" | "SHOW" | "EXPLAIN" | "DESCRIBE" | "DESC" | "PRAGMA" | "VALUES" | "TABLE"
    ) {
        return true;
    }
    let upper = sql.to_ascii_uppercase();
    upper.contains(" RETURNING ") || upper.contains(" OUTPUT INSERTED.")
}

#[cfg(test)]
mod tests;
