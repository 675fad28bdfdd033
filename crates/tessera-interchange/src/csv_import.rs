//! CSV import into an existing table

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

use tessera_core::{
    CsvImportResult, DaoError, RowRecord, TableDao, TableStructure, Value, coerce_text,
};

/// Errors that stop an import before or while reading input
#[derive(Debug, Error)]
pub enum CsvImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("CSV input has no header row")]
    MissingHeader,

    #[error("Unknown CSV columns for table \"{table}\": {}", quote_all(.columns))]
    UnknownColumns { table: String, columns: Vec<String> },
}

fn quote_all(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<CsvImportError> for DaoError {
    fn from(err: CsvImportError) -> Self {
        match err {
            CsvImportError::Io(e) => DaoError::Io(e),
            CsvImportError::Parse { .. } => DaoError::Validation(err.to_string()),
            CsvImportError::MissingHeader | CsvImportError::UnknownColumns { .. } => {
                DaoError::Configuration(err.to_string())
            }
        }
    }
}

/// Import options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvImportOptions {
    pub delimiter: char,
}

impl Default for CsvImportOptions {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl CsvImportOptions {
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Streaming reader of CSV records.
///
/// Quoted fields may contain delimiters, `""` escapes and line breaks; a
/// record therefore spans as many physical lines as its quotes require.
/// Blank lines between records are skipped.
pub struct CsvRecords<R> {
    reader: R,
    delimiter: char,
    line: usize,
}

impl<R: AsyncBufRead + Unpin> CsvRecords<R> {
    pub fn new(reader: R, delimiter: char) -> Self {
        Self {
            reader,
            delimiter,
            line: 0,
        }
    }

    /// Next record with the line it starts on, `None` at end of input
    pub async fn next_record(&mut self) -> Result<Option<(usize, Vec<String>)>, CsvImportError> {
        let mut record = String::new();
        let mut start_line = self.line + 1;
        let mut buf = String::new();

        loop {
            buf.clear();
            if self.reader.read_line(&mut buf).await? == 0 {
                if record.is_empty() {
                    return Ok(None);
                }
                if quotes_open(&record, self.delimiter) {
                    return Err(CsvImportError::Parse {
                        line: start_line,
                        message: "unterminated quoted field".to_string(),
                    });
                }
                break;
            }
            self.line += 1;

            let content = buf
                .strip_suffix('\n')
                .map(|s| s.strip_suffix('\r').unwrap_or(s))
                .unwrap_or(&buf);
            if record.is_empty() {
                if content.trim().is_empty() {
                    continue;
                }
                start_line = self.line;
            }
            record.push_str(content);
            if quotes_open(&record, self.delimiter) {
                record.push('\n');
                continue;
            }
            break;
        }

        split_record(&record, self.delimiter)
            .map(|fields| Some((start_line, fields)))
            .map_err(|message| CsvImportError::Parse {
                line: start_line,
                message,
            })
    }
}

/// Whether `text` ends inside a quoted field.
///
/// Follows the `split_record` rules: a quote opens a field only at its
/// start, and `""` inside quotes is an escaped quote.
fn quotes_open(text: &str, delimiter: char) -> bool {
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
        } else if c == '"' && at_field_start {
            in_quotes = true;
            at_field_start = false;
        } else {
            at_field_start = c == delimiter;
        }
    }
    in_quotes
}

/// Split one logical record into fields
fn split_record(record: &str, delimiter: char) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut chars = record.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                    match chars.peek() {
                        None => {}
                        Some(next) if *next == delimiter => {}
                        Some(next) => {
                            return Err(format!(
                                "unexpected {:?} after closing quote in field {}",
                                next,
                                fields.len() + 1
                            ));
                        }
                    }
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && at_field_start {
            in_quotes = true;
            at_field_start = false;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
            at_field_start = true;
        } else {
            current.push(c);
            at_field_start = false;
        }
    }

    fields.push(current);
    Ok(fields)
}

/// Convert one CSV record into a row record using the column types
fn record_to_row(
    headers: &[&TableStructure],
    cells: &[String],
) -> Result<RowRecord, String> {
    if cells.len() != headers.len() {
        return Err(format!(
            "expected {} fields, found {}",
            headers.len(),
            cells.len()
        ));
    }

    let mut row = RowRecord::new();
    for (column, cell) in headers.iter().zip(cells) {
        let value = if cell.is_empty() {
            // Let the engine generate it
            if column.is_auto_increment {
                continue;
            }
            if column.allow_null {
                Value::Null
            } else {
                Value::String(String::new())
            }
        } else {
            coerce_text(cell, column.data_type)
                .map_err(|e| format!("column \"{}\": {}", column.column_name, e))?
        };
        row.insert(column.column_name.clone(), value.to_json());
    }
    Ok(row)
}

/// Import CSV with default options
pub async fn import_csv(
    dao: &dyn TableDao,
    table: &str,
    csv: &mut (dyn AsyncRead + Send + Unpin),
) -> Result<CsvImportResult, DaoError> {
    import_csv_with_options(dao, table, csv, &CsvImportOptions::default()).await
}

/// Parse CSV (header row first) and insert every record with
/// [`TableDao::add_row_in_table`].
///
/// Header problems fail the whole import before anything is inserted; row
/// problems (field count, coercion, insert errors) are counted and logged.
#[tracing::instrument(skip(dao, csv, options), fields(delimiter = %options.delimiter))]
pub async fn import_csv_with_options(
    dao: &dyn TableDao,
    table: &str,
    csv: &mut (dyn AsyncRead + Send + Unpin),
    options: &CsvImportOptions,
) -> Result<CsvImportResult, DaoError> {
    let mut records = CsvRecords::new(BufReader::new(csv), options.delimiter);

    let Some((_, raw_headers)) = records.next_record().await? else {
        return Err(CsvImportError::MissingHeader.into());
    };
    let header_names: Vec<String> = raw_headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let structure = dao.get_table_structure(table).await?;
    let unknown: Vec<String> = header_names
        .iter()
        .filter(|h| !structure.iter().any(|c| &c.column_name == *h))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(CsvImportError::UnknownColumns {
            table: table.to_string(),
            columns: unknown,
        }
        .into());
    }
    let headers: Vec<&TableStructure> = header_names
        .iter()
        .filter_map(|h| structure.iter().find(|c| &c.column_name == h))
        .collect();

    let mut result = CsvImportResult::default();
    while let Some((line, cells)) = records.next_record().await? {
        result.rows_processed += 1;
        let row = match record_to_row(&headers, &cells) {
            Ok(row) => row,
            Err(message) => {
                tracing::warn!(line, error = %message, "rejecting CSV row");
                result.add_error(line, message);
                continue;
            }
        };
        match dao.add_row_in_table(table, &row).await {
            Ok(_) => result.rows_added += 1,
            Err(e) => {
                tracing::warn!(line, error = %e, "CSV row insert failed");
                result.add_error(line, e.to_string());
            }
        }
    }

    tracing::info!(
        rows_processed = result.rows_processed,
        rows_added = result.rows_added,
        error_count = result.error_count,
        "CSV import finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests;
