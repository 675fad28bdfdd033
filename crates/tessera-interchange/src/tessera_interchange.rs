//! Moving rows in and out of tables through the DAO contract.
//!
//! Both directions go through [`tessera_core::TableDao`] operations only, so
//! every engine adapter gets CSV import and streaming export for free.

mod csv_import;
mod export;
#[cfg(test)]
mod testing;

pub use csv_import::{CsvImportError, CsvImportOptions, CsvRecords, import_csv, import_csv_with_options};
pub use export::stream_rows;
