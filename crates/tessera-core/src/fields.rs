//! Field availability, search/order resolution and settings validation

use crate::{PrimaryKey, QueryOrder, TableSettings, TableStructure};

/// Columns a caller may see for this table.
///
/// `list_fields` (when set) picks and orders the columns, primary-key and
/// ordering columns are appended so pagination stays stable, and
/// `excluded_fields` always win.
pub fn find_available_fields(
    settings: &TableSettings,
    structure: &[TableStructure],
    primary_keys: &[PrimaryKey],
) -> Vec<String> {
    let exists = |name: &str| structure.iter().any(|c| c.column_name == name);

    let mut fields: Vec<String> = if settings.list_fields.is_empty() {
        structure.iter().map(|c| c.column_name.clone()).collect()
    } else {
        settings
            .list_fields
            .iter()
            .filter(|f| exists(f))
            .cloned()
            .collect()
    };

    let implicit = primary_keys
        .iter()
        .map(|pk| pk.column_name.as_str())
        .chain(settings.ordering_field.as_deref());
    for name in implicit {
        if exists(name) && !fields.iter().any(|f| f == name) {
            fields.push(name.to_string());
        }
    }

    fields.retain(|f| !settings.is_excluded(f));
    fields
}

/// Fields the search predicate runs over.
///
/// Configured search fields win; otherwise a present search value falls back
/// to every available field.
pub fn resolve_search_fields(
    settings: &TableSettings,
    available: &[String],
    search_value: Option<&str>,
) -> Vec<String> {
    if search_value.is_none() {
        return Vec::new();
    }
    let configured: Vec<String> = settings
        .search_fields
        .iter()
        .filter(|f| available.contains(f))
        .cloned()
        .collect();
    if !settings.search_fields.is_empty() {
        return configured;
    }
    available.to_vec()
}

/// Ordering column and direction; first available field ascending when unset
pub fn resolve_ordering(
    settings: &TableSettings,
    available: &[String],
) -> Option<(String, QueryOrder)> {
    let direction = settings.ordering.unwrap_or_default();
    match settings.ordering_field.as_deref() {
        Some(field) if available.iter().any(|f| f == field) => {
            Some((field.to_string(), direction))
        }
        _ => available.first().map(|f| (f.clone(), direction)),
    }
}

/// Cross-check settings against the real columns.
///
/// Every problem becomes a human-readable message; an empty list means the
/// settings are valid.
pub fn validate_table_settings(
    settings: &TableSettings,
    table: &str,
    structure: &[TableStructure],
    primary_keys: &[PrimaryKey],
    require_primary_key: bool,
) -> Vec<String> {
    let mut errors = Vec::new();
    let column = |name: &str| structure.iter().find(|c| c.column_name == name);

    let groups: [(&str, &[String]); 4] = [
        ("search", &settings.search_fields),
        ("excluded", &settings.excluded_fields),
        ("list", &settings.list_fields),
        ("readonly", &settings.readonly_fields),
    ];
    for (kind, names) in groups {
        for name in names {
            if column(name).is_none() {
                errors.push(format!(
                    "There is no column \"{}\" in table \"{}\" ({} field)",
                    name, table, kind
                ));
            }
        }
    }

    if let Some(ordering) = settings.ordering_field.as_deref() {
        if column(ordering).is_none() {
            errors.push(format!(
                "There is no column \"{}\" in table \"{}\" (ordering field)",
                ordering, table
            ));
        }
    }

    for pk in primary_keys {
        let generated = column(&pk.column_name).is_some_and(|c| c.is_auto_increment);
        if settings.readonly_fields.contains(&pk.column_name) && !generated {
            errors.push(format!(
                "Primary key \"{}\" cannot be readonly unless it is generated by the database",
                pk.column_name
            ));
        }
    }

    if require_primary_key && primary_keys.is_empty() {
        errors.push(format!("Table \"{}\" has no primary key", table));
    }

    if let Some(per_page) = settings.list_per_page {
        if per_page < 0 {
            errors.push(format!("list_per_page must be positive, got {}", per_page));
        }
    }

    errors
}
