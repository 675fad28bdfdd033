//! Introspection shapes normalized across engines

use serde::{Deserialize, Serialize};

use crate::CanonicalType;

/// One column of a table, normalized into the common shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStructure {
    pub column_name: String,
    pub column_default: Option<String>,
    /// Canonical type
    pub data_type: CanonicalType,
    /// Native type name as reported by the engine
    pub udt_name: String,
    pub character_maximum_length: Option<i64>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub allow_null: bool,
    /// Value generated by the engine on insert (serial, identity, auto_increment)
    pub is_auto_increment: bool,
}

impl TableStructure {
    /// Start a column description with the engine-native type name
    pub fn new(column_name: impl Into<String>, data_type: CanonicalType, udt_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            column_default: None,
            data_type,
            udt_name: udt_name.into(),
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
            allow_null: true,
            is_auto_increment: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub column_name: String,
    pub data_type: CanonicalType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column_name: String,
    pub constraint_name: String,
    pub referenced_table_name: String,
    pub referenced_column_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDs {
    pub table_name: String,
    pub is_view: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencingColumn {
    pub table_name: String,
    pub column_name: String,
}

/// Tables whose foreign keys point at one column of the inspected table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedTableNamesAndColumns {
    pub referenced_on_column_name: String,
    pub referenced_by: Vec<ReferencingColumn>,
}

impl ReferencedTableNamesAndColumns {
    /// Group `(referenced column, referencing table, referencing column)` triples
    /// by the referenced column, keeping first-seen order.
    pub fn group(triples: impl IntoIterator<Item = (String, String, String)>) -> Vec<Self> {
        let mut grouped: Vec<Self> = Vec::new();
        for (referenced_on, table_name, column_name) in triples {
            let entry = match grouped
                .iter_mut()
                .position(|g| g.referenced_on_column_name == referenced_on)
            {
                Some(idx) => &mut grouped[idx],
                None => {
                    grouped.push(Self {
                        referenced_on_column_name: referenced_on,
                        referenced_by: Vec::new(),
                    });
                    let last = grouped.len() - 1;
                    &mut grouped[last]
                }
            };
            entry.referenced_by.push(ReferencingColumn {
                table_name,
                column_name,
            });
        }
        grouped
    }
}

/// Result of an explicit connectivity test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConnectionResult {
    pub result: bool,
    pub message: String,
}

impl TestConnectionResult {
    pub fn success() -> Self {
        Self {
            result: true,
            message: "Successfully connected".to_string(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            result: false,
            message: message.into(),
        }
    }
}
