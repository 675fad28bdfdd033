#![cfg(feature = "sqlite")]

//! End-to-end behaviour of the relational DAO against on-disk SQLite

mod common;

use common::SqliteFixture;
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value as Json, json};
use tessera_drivers::{
    DaoConfig, DaoError, FilterCriteria, FilteringField, QueryOrder, RowCount, RowRecord,
    RowsQuery, TableSettings,
};

fn record(value: Json) -> RowRecord {
    match value {
        Json::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

async fn users_fixture() -> anyhow::Result<SqliteFixture> {
    let fixture = SqliteFixture::new(DaoConfig::default()).await?;
    fixture
        .run(&["CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT
            )"])
        .await?;
    Ok(fixture)
}

/// `items` with rows chosen to separate every filter criterion
async fn items_fixture(config: DaoConfig) -> anyhow::Result<SqliteFixture> {
    let fixture = SqliteFixture::new(config).await?;
    fixture
        .run(&[
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, qty INTEGER, note TEXT)",
            "INSERT INTO items (name, qty, note) VALUES ('apple', 5, 'x')",
            "INSERT INTO items (name, qty, note) VALUES ('banana', 10, '')",
            "INSERT INTO items (name, qty, note) VALUES ('cherry', 15, NULL)",
            "INSERT INTO items (name, qty, note) VALUES ('avocado', 10, 'ripe')",
        ])
        .await?;
    Ok(fixture)
}

async fn seed_numbers(fixture: &SqliteFixture, count: usize) -> anyhow::Result<()> {
    fixture
        .run(&["CREATE TABLE numbers (id INTEGER PRIMARY KEY, label TEXT)"])
        .await?;
    for n in 1..=count {
        fixture
            .dao
            .add_row_in_table("numbers", &record(json!({ "label": format!("n{n:03}") })))
            .await?;
    }
    Ok(())
}

fn names(rows: &[RowRecord]) -> Vec<String> {
    rows.iter()
        .map(|r| r.get("name").and_then(Json::as_str).unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_insert_get_delete_round_trip() -> anyhow::Result<()> {
    let fixture = users_fixture().await?;
    let dao = &fixture.dao;
    let settings = TableSettings::default();

    let key = dao
        .add_row_in_table("users", &record(json!({ "name": "Vasia", "email": "a@b.com" })))
        .await?;
    assert_eq!(key, record(json!({ "id": 1 })));

    let row = dao.get_row_by_primary_key("users", &key, &settings).await?;
    assert_eq!(
        row,
        Some(record(json!({ "id": 1, "name": "Vasia", "email": "a@b.com" })))
    );

    assert_eq!(dao.delete_row_in_table("users", &key).await?, key);
    assert_eq!(dao.get_row_by_primary_key("users", &key, &settings).await?, None);

    let err = dao.delete_row_in_table("users", &key).await.unwrap_err();
    assert!(matches!(err, DaoError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_explicit_key_is_echoed() -> anyhow::Result<()> {
    let fixture = users_fixture().await?;
    let key = fixture
        .dao
        .add_row_in_table("users", &record(json!({ "id": 77, "name": "Petia" })))
        .await?;
    assert_eq!(key, record(json!({ "id": 77 })));
    Ok(())
}

#[tokio::test]
async fn test_update_returns_key_and_applies_values() -> anyhow::Result<()> {
    let fixture = users_fixture().await?;
    let dao = &fixture.dao;
    let key = dao
        .add_row_in_table("users", &record(json!({ "name": "Vasia" })))
        .await?;

    let updated = dao
        .update_row_in_table("users", &record(json!({ "email": "v@b.com" })), &key)
        .await?;
    assert_eq!(updated, key);

    let row = dao
        .get_row_by_primary_key("users", &key, &TableSettings::default())
        .await?
        .unwrap();
    assert_eq!(row.get("email"), Some(&json!("v@b.com")));

    let err = dao
        .update_row_in_table("users", &record(json!({ "nickname": "v" })), &key)
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn test_available_fields_restrict_rows() -> anyhow::Result<()> {
    let fixture = users_fixture().await?;
    let key = fixture
        .dao
        .add_row_in_table("users", &record(json!({ "name": "Vasia", "email": "a@b.com" })))
        .await?;

    let settings = TableSettings {
        list_fields: vec!["name".into()],
        excluded_fields: vec!["email".into()],
        ..Default::default()
    };
    let row = fixture
        .dao
        .get_row_by_primary_key("users", &key, &settings)
        .await?
        .unwrap();
    let columns: Vec<&str> = row.keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["name", "id"]);
    Ok(())
}

#[tokio::test]
async fn test_pagination_over_42_rows() -> anyhow::Result<()> {
    let fixture = SqliteFixture::new(DaoConfig::default()).await?;
    seed_numbers(&fixture, 42).await?;
    let settings = TableSettings::default();

    let first = fixture
        .dao
        .get_rows_from_table("numbers", &settings, &RowsQuery::new().page(1, 20))
        .await?;
    assert_eq!(first.data.len(), 20);
    assert_eq!(first.pagination.total, 42);
    assert_eq!(first.pagination.last_page, 3);
    assert_eq!(first.pagination.per_page, 20);
    assert_eq!(first.pagination.current_page, 1);
    assert!(!first.large_dataset);
    assert!(!first.is_estimated_total);

    let last = fixture
        .dao
        .get_rows_from_table("numbers", &settings, &RowsQuery::new().page(3, 20))
        .await?;
    assert_eq!(last.data.len(), 2);
    assert_eq!(last.data[0].get("label"), Some(&json!("n041")));
    Ok(())
}

#[tokio::test]
async fn test_list_per_page_and_ordering_settings() -> anyhow::Result<()> {
    let fixture = SqliteFixture::new(DaoConfig::default()).await?;
    seed_numbers(&fixture, 12).await?;
    let settings = TableSettings {
        ordering_field: Some("label".into()),
        ordering: Some(QueryOrder::Desc),
        list_per_page: Some(5),
        ..Default::default()
    };

    let found = fixture
        .dao
        .get_rows_from_table("numbers", &settings, &RowsQuery::new())
        .await?;
    assert_eq!(found.pagination.per_page, 5);
    assert_eq!(found.pagination.last_page, 3);
    assert_eq!(found.data[0].get("label"), Some(&json!("n012")));
    Ok(())
}

#[tokio::test]
async fn test_empty_table_has_no_pages() -> anyhow::Result<()> {
    let fixture = users_fixture().await?;
    let found = fixture
        .dao
        .get_rows_from_table("users", &TableSettings::default(), &RowsQuery::new())
        .await?;
    assert!(found.data.is_empty());
    assert_eq!(found.pagination.total, 0);
    assert_eq!(found.pagination.last_page, 0);
    Ok(())
}

#[rstest]
#[case::eq(FilterCriteria::Eq, "qty", json!(10), vec!["banana", "avocado"])]
#[case::gt(FilterCriteria::Gt, "qty", json!(10), vec!["cherry"])]
#[case::lt(FilterCriteria::Lt, "qty", json!(10), vec!["apple"])]
#[case::gte(FilterCriteria::Gte, "qty", json!(10), vec!["banana", "cherry", "avocado"])]
#[case::lte(FilterCriteria::Lte, "qty", json!(10), vec!["apple", "banana", "avocado"])]
#[case::startswith(FilterCriteria::StartsWith, "name", json!("a"), vec!["apple", "avocado"])]
#[case::endswith(FilterCriteria::EndsWith, "name", json!("o"), vec!["avocado"])]
#[case::contains(FilterCriteria::Contains, "name", json!("an"), vec!["banana"])]
#[case::icontains(FilterCriteria::IContains, "name", json!("an"), vec!["apple", "cherry", "avocado"])]
#[case::empty(FilterCriteria::Empty, "note", Json::Null, vec!["cherry"])]
#[case::eq_null(FilterCriteria::Eq, "note", Json::Null, vec!["cherry"])]
#[tokio::test]
async fn test_filter_criteria(
    #[case] criteria: FilterCriteria,
    #[case] field: &str,
    #[case] value: Json,
    #[case] expected: Vec<&str>,
) -> anyhow::Result<()> {
    let fixture = items_fixture(DaoConfig::default()).await?;
    let settings = TableSettings {
        ordering_field: Some("id".into()),
        ..Default::default()
    };
    let query = RowsQuery::new().filter(FilteringField::new(field, criteria, value));

    let found = fixture.dao.get_rows_from_table("items", &settings, &query).await?;
    assert_eq!(names(&found.data), expected);
    assert_eq!(found.pagination.total, expected.len() as u64);
    Ok(())
}

#[tokio::test]
async fn test_unknown_filters_are_skipped() -> anyhow::Result<()> {
    let fixture = items_fixture(DaoConfig::default()).await?;
    let mut bogus = FilteringField::new("qty", FilterCriteria::Eq, 5);
    bogus.criteria = "between".into();
    let query = RowsQuery::new()
        .filter(bogus)
        .filter(FilteringField::new("colour", FilterCriteria::Eq, "red"));

    let found = fixture
        .dao
        .get_rows_from_table("items", &TableSettings::default(), &query)
        .await?;
    assert_eq!(found.pagination.total, 4);
    Ok(())
}

#[tokio::test]
async fn test_search_is_prefix_and_combines_with_filters() -> anyhow::Result<()> {
    let fixture = items_fixture(DaoConfig::default()).await?;
    let settings = TableSettings {
        search_fields: vec!["name".into()],
        ordering_field: Some("id".into()),
        ..Default::default()
    };

    let found = fixture
        .dao
        .get_rows_from_table("items", &settings, &RowsQuery::new().search("A"))
        .await?;
    assert_eq!(names(&found.data), vec!["apple", "avocado"]);

    let narrowed = RowsQuery::new()
        .search("a")
        .filter(FilteringField::new("qty", FilterCriteria::Gte, 10));
    let found = fixture.dao.get_rows_from_table("items", &settings, &narrowed).await?;
    assert_eq!(names(&found.data), vec!["avocado"]);

    // Without search fields every available column is searched
    let found = fixture
        .dao
        .get_rows_from_table("items", &TableSettings::default(), &RowsQuery::new().search("rip"))
        .await?;
    assert_eq!(names(&found.data), vec!["avocado"]);
    Ok(())
}

#[tokio::test]
async fn test_autocomplete_short_circuits_listing() -> anyhow::Result<()> {
    let fixture = items_fixture(DaoConfig::default().with_autocomplete_row_limit(1)).await?;
    let query = RowsQuery::new().autocomplete(vec!["name".into()], "a");

    let found = fixture
        .dao
        .get_rows_from_table("items", &TableSettings::default(), &query)
        .await?;
    assert_eq!(found.data.len(), 1);
    assert_eq!(found.pagination.total, 0);
    assert_eq!(found.pagination.last_page, 0);
    assert!(!found.large_dataset);
    Ok(())
}

#[rstest]
#[case::below(9, false)]
#[case::at(10, true)]
#[case::above(11, true)]
#[tokio::test]
async fn test_large_dataset_threshold(
    #[case] rows: usize,
    #[case] large: bool,
) -> anyhow::Result<()> {
    let fixture = SqliteFixture::new(DaoConfig::default().with_large_dataset_threshold(10)).await?;
    seed_numbers(&fixture, rows).await?;

    let found = fixture
        .dao
        .get_rows_from_table("numbers", &TableSettings::default(), &RowsQuery::new())
        .await?;
    assert_eq!(found.large_dataset, large);
    assert_eq!(found.pagination.total, rows as u64);
    assert!(!found.is_estimated_total);
    Ok(())
}

#[tokio::test]
async fn test_sparse_rowids_are_counted_exactly() -> anyhow::Result<()> {
    let fixture =
        SqliteFixture::new(DaoConfig::default().with_large_dataset_threshold(1_000)).await?;
    fixture
        .run(&[
            "CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT)",
            "INSERT INTO t (id, label) VALUES (1, 'first'), (5000, 'far')",
        ])
        .await?;

    let found = fixture
        .dao
        .get_rows_from_table("t", &TableSettings::default(), &RowsQuery::new())
        .await?;
    assert_eq!(found.data.len(), 2);
    assert_eq!(found.pagination.total, 2);
    assert_eq!(found.pagination.last_page, 1);
    assert!(!found.large_dataset);
    assert!(!found.is_estimated_total);
    Ok(())
}

#[tokio::test]
async fn test_count_rows_is_exact_when_filtered() -> anyhow::Result<()> {
    let fixture = items_fixture(DaoConfig::default()).await?;
    let query = RowsQuery::new().filter(FilteringField::new("qty", FilterCriteria::Eq, 10));
    let count = fixture
        .dao
        .count_rows("items", &TableSettings::default(), &query)
        .await?;
    assert_eq!(count, RowCount::Exact(2));
    Ok(())
}

#[tokio::test]
async fn test_stream_pages_through_all_rows() -> anyhow::Result<()> {
    let fixture = SqliteFixture::new(DaoConfig::default().with_stream_page_size(3)).await?;
    seed_numbers(&fixture, 8).await?;

    let stream = fixture
        .dao
        .clone()
        .get_table_rows_stream("numbers", &TableSettings::default(), &RowsQuery::new())
        .await?;
    let rows: Vec<RowRecord> = stream.try_collect().await?;
    let labels: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get("label").and_then(Json::as_str))
        .collect();
    assert_eq!(labels.len(), 8);
    assert_eq!(labels.first(), Some(&"n001"));
    assert_eq!(labels.last(), Some(&"n008"));
    Ok(())
}

#[tokio::test]
async fn test_stream_refuses_large_dataset() -> anyhow::Result<()> {
    let fixture = SqliteFixture::new(DaoConfig::default().with_large_dataset_threshold(5)).await?;
    seed_numbers(&fixture, 6).await?;

    let result = fixture
        .dao
        .clone()
        .get_table_rows_stream("numbers", &TableSettings::default(), &RowsQuery::new())
        .await;
    let Err(err) = result else {
        panic!("stream over a large table should be refused");
    };
    assert!(matches!(err, DaoError::LargeDataset(_)));
    Ok(())
}

#[tokio::test]
async fn test_bulk_operations_tolerate_partial_failure() -> anyhow::Result<()> {
    let fixture = items_fixture(DaoConfig::default()).await?;
    let dao = &fixture.dao;
    let keys = vec![
        record(json!({ "id": 1 })),
        record(json!({ "id": 99 })),
        record(json!({ "id": 3 })),
    ];

    let rows = dao
        .bulk_get_rows_from_table_by_primary_keys("items", &keys, &TableSettings::default())
        .await?;
    assert_eq!(names(&rows), vec!["apple", "cherry"]);

    let updated = dao
        .bulk_update_rows_in_table("items", &record(json!({ "qty": 0 })), &keys)
        .await?;
    assert_eq!(updated.len(), 3);

    let deleted = dao.bulk_delete_rows_in_table("items", &keys).await?;
    assert_eq!(deleted, 2);

    let left = dao
        .get_rows_from_table("items", &TableSettings::default(), &RowsQuery::new())
        .await?;
    assert_eq!(left.pagination.total, 2);
    Ok(())
}

#[tokio::test]
async fn test_introspection() -> anyhow::Result<()> {
    let fixture = SqliteFixture::new(DaoConfig::default()).await?;
    fixture
        .run(&[
            "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE books (
                id INTEGER PRIMARY KEY,
                author_id INTEGER NOT NULL REFERENCES authors(id),
                title VARCHAR(200),
                price DECIMAL(10,2)
            )",
            "CREATE VIEW cheap_books AS SELECT * FROM books WHERE price < 10",
        ])
        .await?;
    let dao = &fixture.dao;

    let structure = dao.get_table_structure("books").await?;
    let columns: Vec<&str> = structure.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(columns, vec!["id", "author_id", "title", "price"]);
    assert!(structure[0].is_auto_increment);
    assert!(!structure[1].allow_null);
    assert_eq!(structure[2].character_maximum_length, Some(200));
    assert_eq!(structure[3].numeric_scale, Some(2));

    let pks = dao.get_table_primary_columns("books").await?;
    assert_eq!(pks.len(), 1);
    assert_eq!(pks[0].column_name, "id");

    let fks = dao.get_table_foreign_keys("books").await?;
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].referenced_table_name, "authors");

    let referenced = dao.get_referenced_table_names_and_columns("authors").await?;
    assert_eq!(referenced.len(), 1);
    assert_eq!(referenced[0].referenced_by[0].table_name, "books");

    let tables = dao.get_tables_from_db().await?;
    let listed: Vec<(&str, bool)> = tables
        .iter()
        .map(|t| (t.table_name.as_str(), t.is_view))
        .collect();
    assert_eq!(
        listed,
        vec![("authors", false), ("books", false), ("cheap_books", true)]
    );
    assert!(dao.is_view("cheap_books").await?);
    assert!(!dao.is_view("books").await?);
    assert!(!dao.is_view("missing").await?);
    Ok(())
}

#[tokio::test]
async fn test_structure_is_cached_until_invalidated() -> anyhow::Result<()> {
    let fixture = users_fixture().await?;
    let before = fixture.dao.get_table_structure("users").await?;
    fixture
        .run(&["ALTER TABLE users ADD COLUMN age INTEGER"])
        .await?;
    assert_eq!(fixture.dao.get_table_structure("users").await?.len(), before.len());

    let fingerprint = SqliteFixture::params_for(&fixture.path).fingerprint();
    fixture
        .factory
        .caches()
        .invalidate_table(&fingerprint, "users");
    assert_eq!(fixture.dao.get_table_structure("users").await?.len(), before.len() + 1);
    Ok(())
}

#[tokio::test]
async fn test_validate_settings() -> anyhow::Result<()> {
    let fixture = SqliteFixture::new(DaoConfig::default()).await?;
    fixture
        .run(&[
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)",
            "CREATE TABLE codes (code TEXT PRIMARY KEY, label TEXT)",
            "CREATE TABLE log (line TEXT)",
        ])
        .await?;
    let dao = &fixture.dao;

    let valid = TableSettings {
        search_fields: vec!["name".into()],
        readonly_fields: vec!["id".into()],
        ordering_field: Some("name".into()),
        ..Default::default()
    };
    assert!(dao.validate_settings(&valid, "users").await?.is_empty());

    let invalid = TableSettings {
        search_fields: vec!["nickname".into()],
        excluded_fields: vec!["ghost".into()],
        ordering_field: Some("created_at".into()),
        ..Default::default()
    };
    let errors = dao.validate_settings(&invalid, "users").await?;
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("nickname"));

    let readonly_key = TableSettings {
        readonly_fields: vec!["code".into()],
        ..Default::default()
    };
    let errors = dao.validate_settings(&readonly_key, "codes").await?;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("code"));

    let errors = dao.validate_settings(&TableSettings::default(), "log").await?;
    assert_eq!(errors, vec!["Table \"log\" has no primary key".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_import_csv_coerces_and_counts_failures() -> anyhow::Result<()> {
    let fixture = SqliteFixture::new(DaoConfig::default()).await?;
    fixture
        .run(&["CREATE TABLE people (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                age INTEGER,
                active BOOLEAN
            )"])
        .await?;

    let csv = "name,age,active\r\nAlice,30,yes\r\n\"Smith, Bob\",41,0\r\nCarol,not-a-number,1\r\n";
    let mut reader = csv.as_bytes();
    let result = fixture.dao.import_csv_in_table("people", &mut reader).await?;
    assert_eq!(result.rows_processed, 3);
    assert_eq!(result.rows_added, 2);
    assert_eq!(result.error_count, 1);

    let rows = fixture
        .dao
        .execute_raw_query("SELECT name, typeof(age) AS age_type, active FROM people ORDER BY id")
        .await?;
    assert_eq!(rows[0].get("age_type"), Some(&json!("integer")));
    assert_eq!(rows[1].get("name"), Some(&json!("Smith, Bob")));
    Ok(())
}

#[tokio::test]
async fn test_import_csv_rejects_unknown_headers() -> anyhow::Result<()> {
    let fixture = users_fixture().await?;
    let mut reader = "name,nickname\nVasia,v\n".as_bytes();
    let err = fixture
        .dao
        .import_csv_in_table("users", &mut reader)
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Configuration(_)));

    let found = fixture
        .dao
        .get_rows_from_table("users", &TableSettings::default(), &RowsQuery::new())
        .await?;
    assert_eq!(found.pagination.total, 0);
    Ok(())
}

#[tokio::test]
async fn test_execute_raw_query() -> anyhow::Result<()> {
    let fixture = items_fixture(DaoConfig::default()).await?;

    let rows = fixture
        .dao
        .execute_raw_query("SELECT COUNT(*) AS n FROM items")
        .await?;
    assert_eq!(rows, vec![record(json!({ "n": 4 }))]);

    let rows = fixture
        .dao
        .execute_raw_query("UPDATE items SET qty = 0 WHERE qty = 10")
        .await?;
    assert_eq!(rows, vec![record(json!({ "affected_rows": 2 }))]);
    Ok(())
}

#[tokio::test]
async fn test_connect_reports_success_and_failure() -> anyhow::Result<()> {
    let fixture = users_fixture().await?;
    let ok = fixture.dao.test_connect().await;
    assert!(ok.result);

    let missing = fixture.path.join("no_such_dir").join("db.sqlite");
    let broken = fixture.factory.create(SqliteFixture::params_for(&missing))?;
    let failed = broken.test_connect().await;
    assert!(!failed.result);
    assert!(!failed.message.is_empty());
    Ok(())
}
