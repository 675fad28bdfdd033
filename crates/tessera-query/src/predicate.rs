//! Translation of the generic predicate model into SQL conditions

use tessera_core::{
    CanonicalType, DaoError, FilterCriteria, FilteringField, Result, RowRecord, TableStructure,
    Value, coerce_json,
};

use crate::statement::SqlBuilder;

fn column<'a>(structure: &'a [TableStructure], name: &str) -> Option<&'a TableStructure> {
    structure.iter().find(|c| c.column_name == name)
}

/// Column expression usable on the left of LIKE
fn text_expr(builder: &SqlBuilder<'_>, column: &TableStructure) -> Result<String> {
    let quoted = builder.ident(&column.column_name)?;
    if column.data_type.is_textual() {
        Ok(quoted)
    } else {
        Ok(builder.dialect().cast_to_text(&quoted))
    }
}

fn operand_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL condition for one filter.
///
/// Unknown criteria, unknown fields and range comparisons against NULL are
/// skipped (`Ok(None)`) so one bad filter never fails the whole listing.
pub fn filter_predicate(
    builder: &mut SqlBuilder<'_>,
    filter: &FilteringField,
    structure: &[TableStructure],
) -> Result<Option<String>> {
    let Some(criteria) = filter.criteria() else {
        tracing::warn!(field = %filter.field, criteria = %filter.criteria, "ignoring unknown filter criteria");
        return Ok(None);
    };
    let Some(column) = column(structure, &filter.field) else {
        tracing::warn!(field = %filter.field, "ignoring filter on unknown column");
        return Ok(None);
    };
    let quoted = builder.ident(&column.column_name)?;

    if criteria == FilterCriteria::Empty
        || (criteria == FilterCriteria::Eq && filter.value.is_null())
    {
        return Ok(Some(format!("{} IS NULL", quoted)));
    }
    if filter.value.is_null() {
        tracing::warn!(field = %filter.field, criteria = criteria.as_str(), "ignoring filter without a value");
        return Ok(None);
    }

    if let Some(operator) = criteria.comparison_operator() {
        let structured = matches!(
            column.data_type,
            CanonicalType::Json
                | CanonicalType::Array
                | CanonicalType::Binary
        );
        let condition = if structured {
            let expr = builder.dialect().cast_to_text(&quoted);
            let bound = builder.bind(Value::String(operand_text(&filter.value)))?;
            format!("{} {} {}", expr, operator, bound)
        } else {
            let bound = builder.bind(coerce_json(&filter.value, column.data_type))?;
            format!("{} {} {}", quoted, operator, bound)
        };
        return Ok(Some(condition));
    }

    let escaped = builder.dialect().escape_like(&operand_text(&filter.value));
    let Some(pattern) = criteria.like_pattern(&escaped) else {
        return Ok(None);
    };
    let expr = text_expr(builder, column)?;
    let bound = builder.bind(Value::String(pattern))?;
    let negation = if criteria == FilterCriteria::IContains {
        "NOT "
    } else {
        ""
    };
    Ok(Some(format!(
        "{} {}LIKE {}{}",
        expr,
        negation,
        bound,
        builder.dialect().like_escape_clause()
    )))
}

/// Case-insensitive prefix match OR'ed across `fields`
pub fn search_predicate(
    builder: &mut SqlBuilder<'_>,
    fields: &[String],
    structure: &[TableStructure],
    value: &str,
) -> Result<Option<String>> {
    let pattern = format!("{}%", builder.dialect().escape_like(value));
    let mut disjuncts = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(column) = column(structure, field) else {
            continue;
        };
        let expr = text_expr(builder, column)?;
        let bound = builder.bind(Value::String(pattern.clone()))?;
        disjuncts.push(builder.dialect().case_insensitive_like(&expr, &bound));
    }
    Ok(or_group(disjuncts))
}

/// Prefix match OR'ed across the autocomplete fields
pub fn autocomplete_predicate(
    builder: &mut SqlBuilder<'_>,
    fields: &[String],
    structure: &[TableStructure],
    value: &str,
) -> Result<Option<String>> {
    let pattern = format!("{}%", builder.dialect().escape_like(value));
    let mut disjuncts = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(column) = column(structure, field) else {
            tracing::warn!(field = %field, "ignoring autocomplete on unknown column");
            continue;
        };
        let expr = text_expr(builder, column)?;
        let bound = builder.bind(Value::String(pattern.clone()))?;
        disjuncts.push(format!(
            "{} LIKE {}{}",
            expr,
            bound,
            builder.dialect().like_escape_clause()
        ));
    }
    Ok(or_group(disjuncts))
}

/// Equality conjunction identifying one row
pub fn primary_key_predicate(
    builder: &mut SqlBuilder<'_>,
    primary_key: &RowRecord,
    structure: &[TableStructure],
) -> Result<String> {
    if primary_key.is_empty() {
        return Err(DaoError::Validation("primary key is empty".to_string()));
    }
    let mut conjuncts = Vec::with_capacity(primary_key.len());
    for (name, value) in primary_key {
        let Some(column) = column(structure, name) else {
            return Err(DaoError::Validation(format!(
                "unknown primary key column \"{}\"",
                name
            )));
        };
        let quoted = builder.ident(name)?;
        if value.is_null() {
            conjuncts.push(format!("{} IS NULL", quoted));
        } else {
            let bound = builder.bind(coerce_json(value, column.data_type))?;
            conjuncts.push(format!("{} = {}", quoted, bound));
        }
    }
    Ok(conjuncts.join(" AND "))
}

fn or_group(disjuncts: Vec<String>) -> Option<String> {
    match disjuncts.len() {
        0 => None,
        1 => disjuncts.into_iter().next(),
        _ => Some(format!("({})", disjuncts.join(" OR "))),
    }
}

#[cfg(test)]
mod tests;
