use super::*;
use serde_json::json;

#[test]
fn test_parse_is_case_insensitive() {
    assert_eq!(FilterCriteria::parse("GTE"), Some(FilterCriteria::Gte));
    assert_eq!(FilterCriteria::parse(" startsWith "), Some(FilterCriteria::StartsWith));
    assert_eq!(FilterCriteria::parse("between"), None);
}

#[test]
fn test_unknown_criteria_deserializes() {
    let filter: FilteringField =
        serde_json::from_value(json!({"field": "age", "criteria": "regex", "value": ".*"}))
            .unwrap();
    assert_eq!(filter.criteria(), None);
}

#[test]
fn test_like_patterns() {
    assert_eq!(FilterCriteria::StartsWith.like_pattern("ab").unwrap(), "ab%");
    assert_eq!(FilterCriteria::EndsWith.like_pattern("ab").unwrap(), "%ab");
    assert_eq!(FilterCriteria::IContains.like_pattern("ab").unwrap(), "%ab%");
    assert!(FilterCriteria::Eq.like_pattern("ab").is_none());
}

#[test]
fn test_in_memory_range_boundaries() {
    let ten = json!(10);
    assert!(FilterCriteria::Gte.matches(Some("10"), &ten));
    assert!(FilterCriteria::Lte.matches(Some("10"), &ten));
    assert!(!FilterCriteria::Gt.matches(Some("10"), &ten));
    assert!(!FilterCriteria::Lt.matches(Some("10"), &ten));
    assert!(FilterCriteria::Gt.matches(Some("9.5e1"), &ten));
}

#[test]
fn test_in_memory_empty_distinguishes_missing_from_blank() {
    assert!(FilterCriteria::Empty.matches(None, &json!(null)));
    assert!(!FilterCriteria::Empty.matches(Some(""), &json!(null)));
}

#[test]
fn test_in_memory_icontains_is_negated() {
    assert!(FilterCriteria::IContains.matches(Some("hello"), &json!("xyz")));
    assert!(!FilterCriteria::IContains.matches(Some("hello"), &json!("ell")));
}

#[test]
fn test_autocomplete_activation() {
    let mut auto = AutocompleteFields::default();
    assert!(!auto.is_active());
    auto.fields = vec!["name".into()];
    assert!(!auto.is_active());
    auto.value = Some(String::new());
    assert!(!auto.is_active());
    auto.value = Some("Va".into());
    assert!(auto.is_active());
}
