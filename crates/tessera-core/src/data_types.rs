//! Canonical column type vocabulary and per-engine normalization

use serde::{Deserialize, Serialize};

use crate::DatabaseType;

/// Small engine-independent type vocabulary used by `TableStructure`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    Integer,
    Float,
    Decimal,
    Boolean,
    String,
    Text,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    Binary,
    Array,
    Unknown,
}

impl CanonicalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalType::Integer => "integer",
            CanonicalType::Float => "float",
            CanonicalType::Decimal => "decimal",
            CanonicalType::Boolean => "boolean",
            CanonicalType::String => "string",
            CanonicalType::Text => "text",
            CanonicalType::Date => "date",
            CanonicalType::Time => "time",
            CanonicalType::Timestamp => "timestamp",
            CanonicalType::Uuid => "uuid",
            CanonicalType::Json => "json",
            CanonicalType::Binary => "binary",
            CanonicalType::Array => "array",
            CanonicalType::Unknown => "unknown",
        }
    }

    /// Whether LIKE-family predicates apply without casting
    pub fn is_textual(&self) -> bool {
        matches!(self, CanonicalType::String | CanonicalType::Text)
    }
}

impl std::fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an engine-native type name into the canonical vocabulary.
///
/// `native` may carry length/precision modifiers (`varchar(255)`,
/// `Nullable(Int32)`, `tinyint(1)`); they are stripped except where they
/// change the meaning.
pub fn normalize_type(engine: DatabaseType, native: &str) -> CanonicalType {
    let lowered = native.trim().to_ascii_lowercase();

    if engine == DatabaseType::Mysql && lowered.starts_with("tinyint(1)") {
        return CanonicalType::Boolean;
    }
    if engine == DatabaseType::Postgres && (lowered.starts_with('_') || lowered.ends_with("[]")) {
        return CanonicalType::Array;
    }

    if engine == DatabaseType::Cassandra {
        let inner = unwrap_frozen(&lowered);
        if inner.starts_with("list<") || inner.starts_with("set<") {
            return CanonicalType::Array;
        }
        if inner.starts_with("map<") || inner.starts_with("tuple<") {
            return CanonicalType::Json;
        }
    }

    let unwrapped = unwrap_clickhouse(&lowered);
    if engine == DatabaseType::Clickhouse && unwrapped.starts_with("array(") {
        return CanonicalType::Array;
    }
    let base = unwrapped
        .split(|c: char| c == '(' || c == ' ')
        .next()
        .unwrap_or_default();

    match base {
        "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "bigserial" | "smallserial" | "int16" | "int32" | "int64"
        | "int128" | "int256" | "uint8" | "uint16" | "uint32" | "uint64" | "uint128"
        | "uint256" | "varint" | "counter" => CanonicalType::Integer,
        "real" | "float" | "float4" | "float8" | "double" | "float32" | "float64" => {
            CanonicalType::Float
        }
        "numeric" | "decimal" | "money" | "smallmoney" | "number" => CanonicalType::Decimal,
        "decimal32" | "decimal64" | "decimal128" | "decimal256" => CanonicalType::Decimal,
        "bool" | "boolean" => CanonicalType::Boolean,
        "bit" if engine == DatabaseType::Mssql => CanonicalType::Boolean,
        "char" | "varchar" | "nchar" | "nvarchar" | "character" | "bpchar" | "string"
        | "fixedstring" | "citext" | "name" | "enum" | "set" | "enum8" | "enum16"
        | "lowcardinality" | "ascii" | "inet" | "duration" => CanonicalType::String,
        "text" | "tinytext" | "mediumtext" | "longtext" | "ntext" | "clob" | "xml" => {
            CanonicalType::Text
        }
        "date" | "date32" => CanonicalType::Date,
        "time" | "timetz" => CanonicalType::Time,
        "timestamp" | "timestamptz" | "datetime" | "datetime2" | "smalldatetime"
        | "datetimeoffset" | "datetime64" => CanonicalType::Timestamp,
        "uuid" | "uniqueidentifier" | "timeuuid" => CanonicalType::Uuid,
        "json" | "jsonb" | "object" | "map" | "tuple" => CanonicalType::Json,
        "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary"
        | "image" => CanonicalType::Binary,
        "array" => CanonicalType::Array,
        // SQLite type affinity rules
        _ if engine == DatabaseType::Sqlite => sqlite_affinity(base),
        _ => CanonicalType::Unknown,
    }
}

/// Strip CQL `frozen<...>`
fn unwrap_frozen(lowered: &str) -> &str {
    lowered
        .strip_prefix("frozen<")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(lowered)
}

/// Strip ClickHouse `Nullable(...)` / `LowCardinality(...)` wrappers
fn unwrap_clickhouse(lowered: &str) -> &str {
    let mut current = lowered;
    for wrapper in ["nullable(", "lowcardinality("] {
        if let Some(inner) = current
            .strip_prefix(wrapper)
            .and_then(|rest| rest.strip_suffix(')'))
        {
            current = inner;
        }
    }
    current
}

fn sqlite_affinity(declared: &str) -> CanonicalType {
    if declared.is_empty() {
        return CanonicalType::Unknown;
    }
    if declared.contains("int") {
        CanonicalType::Integer
    } else if declared.contains("char") || declared.contains("clob") || declared.contains("text") {
        CanonicalType::Text
    } else if declared.contains("blob") {
        CanonicalType::Binary
    } else if declared.contains("real") || declared.contains("floa") || declared.contains("doub") {
        CanonicalType::Float
    } else {
        CanonicalType::Decimal
    }
}
