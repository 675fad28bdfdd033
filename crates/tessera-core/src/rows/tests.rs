use super::*;
use rstest::rstest;

#[rstest]
#[case(42, 20, 3)]
#[case(40, 20, 2)]
#[case(0, 20, 0)]
#[case(1, 1, 1)]
#[case(99_999, 100, 1_000)]
fn test_last_page_is_ceiling(#[case] total: u64, #[case] per_page: u64, #[case] last: u64) {
    assert_eq!(Pagination::new(total, per_page, 1).last_page, last);
}

#[test]
fn test_pagination_serializes_camel_case() {
    let json = serde_json::to_value(Pagination::new(42, 20, 1)).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"total": 42, "lastPage": 3, "perPage": 20, "currentPage": 1})
    );
}

#[test]
fn test_import_errors_are_capped() {
    let mut result = CsvImportResult::default();
    for line in 0..150 {
        result.add_error(line, "bad");
    }
    assert_eq!(result.error_count, 150);
    assert_eq!(result.errors.len(), 100);
    assert_eq!(result.errors[0], "Line 0: bad");
}

#[test]
fn test_blank_search_is_ignored() {
    assert_eq!(RowsQuery::new().search("").search_value(), None);
    assert_eq!(RowsQuery::new().search("ab").search_value(), Some("ab"));
}
