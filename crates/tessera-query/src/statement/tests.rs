use super::*;
use crate::testing::FakeDialect;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn test_placeholders_follow_bind_order() {
    let dialect = FakeDialect::numbered();
    let mut builder = SqlBuilder::new(&dialect);
    assert_eq!(builder.bind(Value::Int64(1)).unwrap(), "$1");
    assert_eq!(builder.bind(Value::String("a".into())).unwrap(), "$2");
    assert_eq!(builder.params().len(), 2);
}

#[test]
fn test_inline_dialect_renders_literals() {
    let dialect = FakeDialect::inline();
    let mut builder = SqlBuilder::new(&dialect);
    assert_eq!(builder.bind(Value::String("it's".into())).unwrap(), "'it\\'s'");
    assert_eq!(builder.bind(Value::Int64(5)).unwrap(), "5");
    assert!(builder.into_params().is_empty());
}

#[test]
fn test_identifiers_are_quoted() {
    let dialect = FakeDialect::numbered();
    let builder = SqlBuilder::new(&dialect);
    assert_eq!(builder.ident("we\"ird").unwrap(), "\"we\"\"ird\"");
    assert_eq!(
        builder
            .table(&TableRef::new(Some("public".into()), "users"))
            .unwrap(),
        "\"public\".\"users\""
    );
    assert!(builder.ident("").is_err());
}

#[test]
fn test_window_styles() {
    let limit = FakeDialect::numbered();
    assert_eq!(SqlBuilder::new(&limit).window(40, 20, true), " LIMIT 20 OFFSET 40");

    let fetch = FakeDialect::offset_fetch();
    assert_eq!(
        SqlBuilder::new(&fetch).window(40, 20, true),
        " OFFSET 40 ROWS FETCH NEXT 20 ROWS ONLY"
    );
    assert_eq!(
        SqlBuilder::new(&fetch).window(0, 1, false),
        " ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 1 ROWS ONLY"
    );
}

#[test]
fn test_where_clause() {
    assert_eq!(where_clause(&[]), "");
    assert_eq!(
        where_clause(&["a = 1".to_string(), "b IS NULL".to_string()]),
        " WHERE a = 1 AND b IS NULL"
    );
}

#[rstest]
#[case("SELECT 1", true)]
#[case("  with t as (select 1) select * from t", true)]
#[case("(SELECT 1)", true)]
#[case("PRAGMA table_info(users)", true)]
#[case("INSERT INTO t (a) VALUES (1) RETURNING id", true)]
#[case("INSERT INTO t (a) VALUES (1)", false)]
#[case("update t set a = 1", false)]
#[case("CREATE TABLE t (id int)", false)]
fn test_row_returning_detection(#[case] sql: &str, #[case] expected: bool) {
    assert_eq!(is_row_returning(sql), expected);
}
