use super::*;
use crate::testing::{FakeDialect, users};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn translate(filter: FilteringField) -> (Option<String>, Vec<Value>) {
    let dialect = FakeDialect::numbered();
    let mut builder = SqlBuilder::new(&dialect);
    let sql = filter_predicate(&mut builder, &filter, &users()).unwrap();
    (sql, builder.into_params())
}

#[rstest]
#[case(FilterCriteria::Eq, "\"id\" = $1")]
#[case(FilterCriteria::Gt, "\"id\" > $1")]
#[case(FilterCriteria::Lt, "\"id\" < $1")]
#[case(FilterCriteria::Gte, "\"id\" >= $1")]
#[case(FilterCriteria::Lte, "\"id\" <= $1")]
fn test_comparisons_bind_typed_operand(#[case] criteria: FilterCriteria, #[case] expected: &str) {
    let (sql, params) = translate(FilteringField::new("id", criteria, "7"));
    assert_eq!(sql.as_deref(), Some(expected));
    assert_eq!(params, vec![Value::Int64(7)]);
}

#[rstest]
#[case(FilterCriteria::StartsWith, "\"name\" LIKE $1 ESCAPE '\\'", "Va%")]
#[case(FilterCriteria::EndsWith, "\"name\" LIKE $1 ESCAPE '\\'", "%Va")]
#[case(FilterCriteria::Contains, "\"name\" LIKE $1 ESCAPE '\\'", "%Va%")]
#[case(FilterCriteria::IContains, "\"name\" NOT LIKE $1 ESCAPE '\\'", "%Va%")]
fn test_like_family(
    #[case] criteria: FilterCriteria,
    #[case] expected: &str,
    #[case] pattern: &str,
) {
    let (sql, params) = translate(FilteringField::new("name", criteria, "Va"));
    assert_eq!(sql.as_deref(), Some(expected));
    assert_eq!(params, vec![Value::String(pattern.into())]);
}

#[test]
fn test_like_on_non_text_column_casts() {
    let (sql, _) = translate(FilteringField::new("id", FilterCriteria::StartsWith, 4));
    assert_eq!(sql.as_deref(), Some("CAST(\"id\" AS TEXT) LIKE $1 ESCAPE '\\'"));
}

#[test]
fn test_like_operand_is_escaped() {
    let (_, params) = translate(FilteringField::new("name", FilterCriteria::Contains, "50%_off"));
    assert_eq!(params, vec![Value::String("%50\\%\\_off%".into())]);
}

#[test]
fn test_empty_and_null_equality() {
    let (sql, params) = translate(FilteringField::new("email", FilterCriteria::Empty, ""));
    assert_eq!(sql.as_deref(), Some("\"email\" IS NULL"));
    assert!(params.is_empty());

    let (sql, _) = translate(FilteringField::new("email", FilterCriteria::Eq, json!(null)));
    assert_eq!(sql.as_deref(), Some("\"email\" IS NULL"));

    let (sql, _) = translate(FilteringField::new("email", FilterCriteria::Gt, json!(null)));
    assert_eq!(sql, None);
}

#[test]
fn test_unknown_criteria_and_fields_are_skipped() {
    let unknown = FilteringField {
        field: "name".into(),
        criteria: "between".into(),
        value: json!("x"),
    };
    assert_eq!(translate(unknown).0, None);
    assert_eq!(
        translate(FilteringField::new("nope", FilterCriteria::Eq, 1)).0,
        None
    );
}

#[test]
fn test_structured_columns_compare_as_text() {
    let (sql, params) = translate(FilteringField::new("tags", FilterCriteria::Eq, "[]"));
    assert_eq!(sql.as_deref(), Some("CAST(\"tags\" AS TEXT) = $1"));
    assert_eq!(params, vec![Value::String("[]".into())]);
}

#[test]
fn test_search_is_a_case_insensitive_prefix_disjunction() {
    let dialect = FakeDialect::numbered();
    let mut builder = SqlBuilder::new(&dialect);
    let fields = vec!["name".to_string(), "id".to_string(), "missing".to_string()];
    let sql = search_predicate(&mut builder, &fields, &users(), "va")
        .unwrap()
        .unwrap();
    assert_eq!(
        sql,
        "(LOWER(\"name\") LIKE LOWER($1) ESCAPE '\\' OR LOWER(CAST(\"id\" AS TEXT)) LIKE LOWER($2) ESCAPE '\\')"
    );
    assert_eq!(builder.params()[0], Value::String("va%".into()));
}

#[test]
fn test_search_without_known_fields_is_none() {
    let dialect = FakeDialect::numbered();
    let mut builder = SqlBuilder::new(&dialect);
    let fields = vec!["missing".to_string()];
    assert_eq!(search_predicate(&mut builder, &fields, &users(), "x").unwrap(), None);
}

#[test]
fn test_autocomplete_single_field() {
    let dialect = FakeDialect::numbered();
    let mut builder = SqlBuilder::new(&dialect);
    let sql = autocomplete_predicate(&mut builder, &["email".to_string()], &users(), "a@")
        .unwrap()
        .unwrap();
    assert_eq!(sql, "\"email\" LIKE $1 ESCAPE '\\'");
}

#[test]
fn test_primary_key_predicate() {
    let dialect = FakeDialect::numbered();
    let mut builder = SqlBuilder::new(&dialect);
    let mut pk = RowRecord::new();
    pk.insert("id".into(), json!(3));
    pk.insert("name".into(), json!(null));
    let sql = primary_key_predicate(&mut builder, &pk, &users()).unwrap();
    assert_eq!(sql, "\"id\" = $1 AND \"name\" IS NULL");
    assert_eq!(builder.params(), &[Value::Int64(3)]);
}

#[test]
fn test_primary_key_predicate_rejects_bad_keys() {
    let dialect = FakeDialect::numbered();
    let mut builder = SqlBuilder::new(&dialect);
    assert!(matches!(
        primary_key_predicate(&mut builder, &RowRecord::new(), &users()),
        Err(DaoError::Validation(_))
    ));

    let mut pk = RowRecord::new();
    pk.insert("nope".into(), json!(1));
    assert!(matches!(
        primary_key_predicate(&mut builder, &pk, &users()),
        Err(DaoError::Validation(_))
    ));
}

#[test]
fn test_inline_dialect_renders_filter_literal() {
    let dialect = FakeDialect::inline();
    let mut builder = SqlBuilder::new(&dialect);
    let filter = FilteringField::new("name", FilterCriteria::Eq, "x' OR 1=1 --");
    let sql = filter_predicate(&mut builder, &filter, &users()).unwrap();
    assert_eq!(sql.as_deref(), Some("\"name\" = 'x\\' OR 1=1 --'"));
}
