//! Generic predicate model: filter criteria, search and autocomplete input

use serde::{Deserialize, Serialize};

/// The canonical filter operators every adapter translates natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCriteria {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
    StartsWith,
    EndsWith,
    Contains,
    /// Negated substring match (`NOT LIKE %value%`)
    IContains,
    /// No value (`IS NULL`)
    Empty,
}

impl FilterCriteria {
    /// Recognize a criteria name; unknown names yield `None`
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "eq" => Some(FilterCriteria::Eq),
            "gt" => Some(FilterCriteria::Gt),
            "lt" => Some(FilterCriteria::Lt),
            "gte" => Some(FilterCriteria::Gte),
            "lte" => Some(FilterCriteria::Lte),
            "startswith" => Some(FilterCriteria::StartsWith),
            "endswith" => Some(FilterCriteria::EndsWith),
            "contains" => Some(FilterCriteria::Contains),
            "icontains" => Some(FilterCriteria::IContains),
            "empty" => Some(FilterCriteria::Empty),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterCriteria::Eq => "eq",
            FilterCriteria::Gt => "gt",
            FilterCriteria::Lt => "lt",
            FilterCriteria::Gte => "gte",
            FilterCriteria::Lte => "lte",
            FilterCriteria::StartsWith => "startswith",
            FilterCriteria::EndsWith => "endswith",
            FilterCriteria::Contains => "contains",
            FilterCriteria::IContains => "icontains",
            FilterCriteria::Empty => "empty",
        }
    }

    /// Comparison operator for the range/equality family
    pub fn comparison_operator(&self) -> Option<&'static str> {
        match self {
            FilterCriteria::Eq => Some("="),
            FilterCriteria::Gt => Some(">"),
            FilterCriteria::Lt => Some("<"),
            FilterCriteria::Gte => Some(">="),
            FilterCriteria::Lte => Some("<="),
            _ => None,
        }
    }

    /// LIKE pattern for the substring family, built around an already
    /// escaped operand
    pub fn like_pattern(&self, escaped: &str) -> Option<String> {
        match self {
            FilterCriteria::StartsWith => Some(format!("{}%", escaped)),
            FilterCriteria::EndsWith => Some(format!("%{}", escaped)),
            FilterCriteria::Contains | FilterCriteria::IContains => {
                Some(format!("%{}%", escaped))
            }
            _ => None,
        }
    }

    /// Evaluate the operator against an in-memory cell.
    ///
    /// Used by engines without a query language (Redis). Numbers compare
    /// numerically when both sides parse, otherwise as strings.
    pub fn matches(&self, cell: Option<&str>, operand: &serde_json::Value) -> bool {
        if *self == FilterCriteria::Empty {
            return cell.is_none();
        }
        let Some(cell) = cell else {
            return false;
        };
        let operand = match operand {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => return false,
            other => other.to_string(),
        };
        match self {
            FilterCriteria::StartsWith => cell.starts_with(&operand),
            FilterCriteria::EndsWith => cell.ends_with(&operand),
            FilterCriteria::Contains => cell.contains(&operand),
            FilterCriteria::IContains => !cell.contains(&operand),
            _ => {
                let ordering = match (cell.parse::<f64>(), operand.parse::<f64>()) {
                    (Ok(a), Ok(b)) => a.partial_cmp(&b),
                    _ => Some(cell.cmp(operand.as_str())),
                };
                let Some(ordering) = ordering else {
                    return false;
                };
                match self {
                    FilterCriteria::Eq => ordering.is_eq(),
                    FilterCriteria::Gt => ordering.is_gt(),
                    FilterCriteria::Lt => ordering.is_lt(),
                    FilterCriteria::Gte => ordering.is_ge(),
                    FilterCriteria::Lte => ordering.is_le(),
                    _ => false,
                }
            }
        }
    }
}

/// One `{field, criteria, value}` filter.
///
/// `criteria` stays a raw string so unknown operators can be skipped
/// instead of failing deserialization of the whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteringField {
    pub field: String,
    pub criteria: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl FilteringField {
    pub fn new(
        field: impl Into<String>,
        criteria: FilterCriteria,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            criteria: criteria.as_str().to_string(),
            value: value.into(),
        }
    }

    pub fn criteria(&self) -> Option<FilterCriteria> {
        FilterCriteria::parse(&self.criteria)
    }
}

/// Bounded type-ahead lookup input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutocompleteFields {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl AutocompleteFields {
    /// Autocomplete short-circuits listing only when both parts are present
    pub fn is_active(&self) -> bool {
        !self.fields.is_empty() && self.value.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests;
