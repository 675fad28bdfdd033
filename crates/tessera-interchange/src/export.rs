//! Lazy row export

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};

use tessera_core::{DaoError, Result, RowStream, RowsQuery, TableDao, TableSettings};

struct Cursor {
    dao: Arc<dyn TableDao>,
    table: String,
    settings: TableSettings,
    query: RowsQuery,
    offset: u64,
    exhausted: bool,
}

/// Rows matching `query`, fetched one page at a time as the stream is polled.
///
/// The row-count strategy runs first; a large dataset on an adapter that
/// cannot stream it cheaply is refused with [`DaoError::LargeDataset`].
/// Nothing is held open between pages, so dropping the stream early is free.
pub async fn stream_rows(
    dao: Arc<dyn TableDao>,
    table: &str,
    settings: &TableSettings,
    query: &RowsQuery,
) -> Result<RowStream> {
    let count = dao.count_rows(table, settings, query).await?;
    let threshold = dao.config().large_dataset_threshold();
    if count.is_large_dataset(threshold) && !dao.capabilities().streams_large_tables {
        return Err(DaoError::LargeDataset(format!(
            "table \"{}\" holds about {} rows, above the streaming limit of {}",
            table,
            count.value(),
            threshold
        )));
    }

    let page_size = dao.config().stream_page_size().max(1);
    tracing::debug!(table, total = count.value(), page_size, "starting row stream");

    let cursor = Cursor {
        dao,
        table: table.to_string(),
        settings: settings.clone(),
        query: query.clone(),
        offset: 0,
        exhausted: false,
    };
    let pages = stream::try_unfold(cursor, move |mut cursor| async move {
        if cursor.exhausted {
            return Ok(None);
        }
        let rows = cursor
            .dao
            .fetch_rows(
                &cursor.table,
                &cursor.settings,
                &cursor.query,
                cursor.offset,
                page_size,
            )
            .await?;
        let fetched = rows.len() as u64;
        if fetched == 0 {
            return Ok(None);
        }
        cursor.exhausted = fetched < page_size;
        cursor.offset += fetched;
        Ok::<_, DaoError>(Some((
            stream::iter(rows.into_iter().map(Ok::<_, DaoError>)),
            cursor,
        )))
    });

    Ok(pages.try_flatten().boxed())
}
