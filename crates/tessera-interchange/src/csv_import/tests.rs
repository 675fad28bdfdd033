use super::*;
use crate::testing::MemoryDao;
use indoc::indoc;
use pretty_assertions::assert_eq;
use serde_json::json;

async fn records(input: &str) -> Vec<(usize, Vec<String>)> {
    let mut reader = CsvRecords::new(input.as_bytes(), ',');
    let mut out = Vec::new();
    while let Some(record) = reader.next_record().await.unwrap() {
        out.push(record);
    }
    out
}

fn fields(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_simple_records() {
    let parsed = records("a,b,c\n1,2,3\n").await;
    assert_eq!(
        parsed,
        vec![(1, fields(&["a", "b", "c"])), (2, fields(&["1", "2", "3"]))]
    );
}

#[tokio::test]
async fn test_quoted_fields_with_delimiters_and_escapes() {
    let parsed = records("\"a,b\",\"say \"\"hi\"\"\",\"\"\n").await;
    assert_eq!(parsed, vec![(1, fields(&["a,b", "say \"hi\"", ""]))]);
}

#[tokio::test]
async fn test_quoted_field_spanning_lines() {
    let parsed = records("name,note\r\nx,\"line one\r\nline two\"\r\ny,z\r\n").await;
    assert_eq!(
        parsed,
        vec![
            (1, fields(&["name", "note"])),
            (2, fields(&["x", "line one\nline two"])),
            (4, fields(&["y", "z"])),
        ]
    );
}

#[tokio::test]
async fn test_quote_inside_unquoted_field_is_literal() {
    let parsed = records("size,label\n5\" screen,tv\n7,\"a \"\"b\"\"\"\n").await;
    assert_eq!(
        parsed,
        vec![
            (1, fields(&["size", "label"])),
            (2, fields(&["5\" screen", "tv"])),
            (3, fields(&["7", "a \"b\""])),
        ]
    );
}

#[tokio::test]
async fn test_blank_lines_and_missing_trailing_newline() {
    let parsed = records("a\n\n1\n\n2").await;
    assert_eq!(
        parsed,
        vec![(1, fields(&["a"])), (3, fields(&["1"])), (5, fields(&["2"]))]
    );
}

#[tokio::test]
async fn test_custom_delimiter() {
    let mut reader = CsvRecords::new("a;\"b;c\"\n".as_bytes(), ';');
    let (_, record) = reader.next_record().await.unwrap().unwrap();
    assert_eq!(record, fields(&["a", "b;c"]));
}

#[tokio::test]
async fn test_unterminated_quote_is_a_parse_error() {
    let mut reader = CsvRecords::new("a,\"open\nstill open\n".as_bytes(), ',');
    let err = reader.next_record().await.unwrap_err();
    assert!(matches!(err, CsvImportError::Parse { line: 1, .. }));
}

#[tokio::test]
async fn test_garbage_after_closing_quote() {
    let mut reader = CsvRecords::new("\"a\"b,c\n".as_bytes(), ',');
    assert!(matches!(
        reader.next_record().await,
        Err(CsvImportError::Parse { .. })
    ));
}

#[tokio::test]
async fn test_import_coerces_by_column_type() {
    let dao = MemoryDao::new();
    let csv = indoc! {"
        name,age,active
        Vasia,42,yes
        Petia,,0
    "};
    let mut input = csv.as_bytes();
    let result = import_csv(&dao, "people", &mut input).await.unwrap();

    assert_eq!(result.rows_processed, 2);
    assert_eq!(result.rows_added, 2);
    assert_eq!(result.error_count, 0);

    let rows = dao.rows.lock();
    assert_eq!(rows[0].get("age"), Some(&json!(42)));
    assert_eq!(rows[0].get("active"), Some(&json!(true)));
    assert_eq!(rows[1].get("age"), Some(&json!(null)));
    assert_eq!(rows[1].get("active"), Some(&json!(false)));
}

#[tokio::test]
async fn test_empty_auto_increment_cell_is_omitted() {
    let dao = MemoryDao::new();
    let mut input = "id,name\n,Vasia\n7,Petia\n".as_bytes();
    import_csv(&dao, "people", &mut input).await.unwrap();

    let rows = dao.rows.lock();
    assert!(!rows[0].contains_key("id"));
    assert_eq!(rows[1].get("id"), Some(&json!(7)));
}

#[tokio::test]
async fn test_empty_cell_in_not_null_text_column_is_empty_string() {
    let dao = MemoryDao::new();
    let mut input = "name,age\n,3\n".as_bytes();
    import_csv(&dao, "people", &mut input).await.unwrap();
    assert_eq!(dao.rows.lock()[0].get("name"), Some(&json!("")));
}

#[tokio::test]
async fn test_row_errors_are_counted_not_fatal() {
    let dao = MemoryDao::new();
    let csv = indoc! {"
        name,age
        ok,1
        bad,not-a-number
        reject,3
        short
        fine,5
    "};
    let mut input = csv.as_bytes();
    let result = import_csv(&dao, "people", &mut input).await.unwrap();

    assert_eq!(result.rows_processed, 5);
    assert_eq!(result.rows_added, 2);
    assert_eq!(result.error_count, 3);
    assert!(result.errors[0].starts_with("Line 3: column \"age\""));
    assert!(result.errors[1].starts_with("Line 4: "));
    assert_eq!(result.errors[2], "Line 5: expected 2 fields, found 1");
}

#[tokio::test]
async fn test_unknown_header_fails_before_inserting() {
    let dao = MemoryDao::new();
    let mut input = "name,nickname\nVasia,V\n".as_bytes();
    let err = import_csv(&dao, "people", &mut input).await.unwrap_err();

    assert!(matches!(err, DaoError::Configuration(ref msg) if msg.contains("\"nickname\"")));
    assert!(dao.rows.lock().is_empty());
}

#[tokio::test]
async fn test_missing_header() {
    let dao = MemoryDao::new();
    let mut input = "\n\n".as_bytes();
    let err = import_csv(&dao, "people", &mut input).await.unwrap_err();
    assert!(matches!(err, DaoError::Configuration(_)));
}

#[tokio::test]
async fn test_byte_order_mark_and_padded_headers() {
    let dao = MemoryDao::new();
    let mut input = "\u{feff}name , age\nVasia,1\n".as_bytes();
    let result = import_csv(&dao, "people", &mut input).await.unwrap();
    assert_eq!(result.rows_added, 1);
}

#[tokio::test]
async fn test_semicolon_delimited_import() {
    let dao = MemoryDao::new();
    let mut input = "name;age\n\"Doe; John\";30\n".as_bytes();
    let options = CsvImportOptions::default().with_delimiter(';');
    let result = import_csv_with_options(&dao, "people", &mut input, &options)
        .await
        .unwrap();
    assert_eq!(result.rows_added, 1);
    assert_eq!(dao.rows.lock()[0].get("name"), Some(&json!("Doe; John")));
}
