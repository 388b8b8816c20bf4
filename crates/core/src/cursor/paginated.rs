use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::entity::{Lazy, Schema};
use crate::store::{PageKey, Query, QueryDocument, Result, SharedStore, StoreError};

use super::Cursor;

enum Slot<T> {
    Entity(T),
    /// A row whose document failed to decode, reported once in its place.
    Undecodable(StoreError),
    /// End of data. Always the last slot once present.
    Exhausted,
}

/// Cursor over one filtered, ordered query, fetched a page at a time.
///
/// Pages are decoded into already-loaded entities and appended to a buffer
/// that only grows. A page shorter than the page size marks the end of the
/// data for good: the cursor never looks for rows written afterwards.
///
/// A row that fails to decode keeps its place in the order. The first call
/// that reaches it returns the decode error and moves past it, so rows on
/// either side are still delivered.
pub struct PaginatedCursor<S: Schema> {
    store: SharedStore,
    query: Query,
    page_size: usize,
    buffer: Vec<Slot<Lazy<S>>>,
    position: usize,
    last_key: Option<PageKey>,
    first_page: Option<JoinHandle<Result<Vec<QueryDocument>>>>,
}

impl<S: Schema> PaginatedCursor<S> {
    /// Opens a cursor and starts fetching its first page right away.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is 0 or if called outside a Tokio runtime.
    pub fn new(store: SharedStore, query: Query, page_size: usize) -> Self {
        assert!(page_size > 0, "page_size must be > 0");
        debug_assert_eq!(query.collection(), S::COLLECTION);

        let first_page = {
            let store = Arc::clone(&store);
            let query = query.clone();
            tokio::spawn(async move { store.query_page(&query, None, page_size).await })
        };
        tracing::debug!(
            entity = S::ENTITY,
            collection = query.collection(),
            page_size,
            "Cursor opened"
        );

        Self {
            store,
            query,
            page_size,
            buffer: Vec::new(),
            position: 0,
            last_key: None,
            first_page: Some(first_page),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of entities fetched so far, consumed or not.
    pub fn buffered(&self) -> usize {
        self.buffer
            .iter()
            .filter(|slot| matches!(slot, Slot::Entity(_)))
            .count()
    }

    /// Returns true once a short page has been seen.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.buffer.last(), Some(Slot::Exhausted))
    }

    /// Makes sure the buffer has a slot at the current position.
    ///
    /// Waits for the first page if it is still in flight, then fetches the
    /// page after the last key seen if the buffer is still short. A failed
    /// fetch buffers nothing, so calling again retries the same page.
    pub async fn advance(&mut self) -> Result<()> {
        if let Some(first_page) = self.first_page.take() {
            let rows = first_page.await.map_err(|err| {
                StoreError::Unavailable(format!("first page fetch did not complete: {err}"))
            })??;
            self.append_page(rows);
        }

        if self.position < self.buffer.len() {
            return Ok(());
        }

        tracing::debug!(
            entity = S::ENTITY,
            buffered = self.buffer.len(),
            "Fetching next page"
        );
        let rows = self
            .store
            .query_page(&self.query, self.last_key.as_ref(), self.page_size)
            .await?;
        self.append_page(rows);
        Ok(())
    }

    fn append_page(&mut self, rows: Vec<QueryDocument>) {
        let short = rows.len() < self.page_size;

        if let Some(row) = rows.last() {
            self.last_key = Some(row.page_key.clone());
        }
        for row in rows {
            let slot = match Lazy::with_data(
                Arc::clone(&self.store),
                Some(row.reference.clone()),
                &row.data,
            ) {
                Ok(entity) => Slot::Entity(entity),
                Err(err) => {
                    tracing::warn!(
                        entity = S::ENTITY,
                        reference = %row.reference,
                        error = %err,
                        "Skipping undecodable document"
                    );
                    Slot::Undecodable(err)
                }
            };
            self.buffer.push(slot);
        }

        if short {
            self.buffer.push(Slot::Exhausted);
            tracing::debug!(
                entity = S::ENTITY,
                total = self.buffered(),
                "Cursor exhausted"
            );
        }
    }
}

#[async_trait]
impl<S: Schema> Cursor for PaginatedCursor<S> {
    type Item = Lazy<S>;

    async fn peek_next(&mut self) -> Result<Option<Lazy<S>>> {
        if self.position >= self.buffer.len() {
            self.advance().await?;
        }

        match self.buffer.get(self.position) {
            Some(Slot::Entity(entity)) => Ok(Some(entity.clone())),
            Some(Slot::Undecodable(err)) => {
                let err = err.clone();
                self.position += 1;
                Err(err)
            }
            Some(Slot::Exhausted) | None => Ok(None),
        }
    }

    async fn poll_next(&mut self) -> Result<Option<Lazy<S>>> {
        let next = self.peek_next().await?;
        if next.is_some() {
            self.position += 1;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        Direction, DocumentData, DocumentStore, FieldReader, InMemoryStore, Reference,
    };
    use serde_json::json;

    struct PointSchema;

    impl Schema for PointSchema {
        const COLLECTION: &'static str = "points";
        const ENTITY: &'static str = "Point";

        type Fields = i64;

        fn decode(_store: &SharedStore, data: &DocumentData) -> Result<i64> {
            FieldReader::new(Self::ENTITY, data).integer("value")
        }
    }

    async fn store_with(values: &[i64]) -> (InMemoryStore, SharedStore) {
        let memory = InMemoryStore::new();
        for (index, value) in values.iter().enumerate() {
            memory
                .set_document(
                    &Reference::new("points", format!("p{index:03}")),
                    json!({ "value": value }).as_object().cloned().unwrap(),
                )
                .await
                .unwrap();
        }
        let store: SharedStore = Arc::new(memory.clone());
        (memory, store)
    }

    fn descending() -> Query {
        Query::new("points").order_by("value", Direction::Descending)
    }

    fn value(point: &Lazy<PointSchema>) -> i64 {
        *point.loaded().unwrap()
    }

    async fn drain(cursor: &mut PaginatedCursor<PointSchema>) -> Vec<i64> {
        let mut values = Vec::new();
        while let Some(point) = cursor.poll_next().await.unwrap() {
            values.push(value(&point));
        }
        values
    }

    #[tokio::test]
    async fn test_empty_collection_is_exhausted_immediately() {
        let (memory, store) = store_with(&[]).await;
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 3);

        assert!(cursor.peek_next().await.unwrap().is_none());
        assert!(!cursor.has_next().await.unwrap());
        assert!(cursor.is_exhausted());
        assert_eq!(memory.stats().queries, 1);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_extra_fetch() {
        let (memory, store) = store_with(&[1, 2, 3]).await;
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 3);

        for expected in [3, 2, 1] {
            assert!(cursor.has_next().await.unwrap());
            let point = cursor.poll_next().await.unwrap().unwrap();
            assert_eq!(value(&point), expected);
        }
        assert_eq!(memory.stats().queries, 1);
        assert!(!cursor.is_exhausted());

        assert!(!cursor.has_next().await.unwrap());
        assert_eq!(memory.stats().queries, 2);
        assert!(cursor.poll_next().await.unwrap().is_none());
        assert_eq!(memory.stats().queries, 2);
    }

    #[tokio::test]
    async fn test_pages_through_in_query_order() {
        let values: Vec<i64> = (1..=10).collect();
        let (memory, store) = store_with(&values).await;
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 4);

        let drained = drain(&mut cursor).await;

        assert_eq!(drained, (1..=10).rev().collect::<Vec<_>>());
        // 4 + 4 + 2 (short page ends it).
        assert_eq!(memory.stats().queries, 3);
        assert_eq!(cursor.buffered(), 10);
    }

    #[tokio::test]
    async fn test_peek_is_idempotent() {
        let (memory, store) = store_with(&[7, 9]).await;
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 5);

        let first = cursor.peek_next().await.unwrap().unwrap();
        let second = cursor.peek_next().await.unwrap().unwrap();

        assert!(first.same_document(&second));
        assert_eq!(value(&first), 9);
        assert_eq!(memory.stats().queries, 1);

        let polled = cursor.poll_next().await.unwrap().unwrap();
        assert!(polled.same_document(&first));
        assert_eq!(value(&cursor.peek_next().await.unwrap().unwrap()), 7);
    }

    #[tokio::test]
    async fn test_entities_arrive_loaded() {
        let (memory, store) = store_with(&[4, 5]).await;
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 5);

        let point = cursor.poll_next().await.unwrap().unwrap();
        assert!(point.is_materialized());
        assert_eq!(*point.fields().await.unwrap(), 5);
        assert_eq!(memory.stats().gets, 0);
    }

    #[tokio::test]
    async fn test_first_page_is_fetched_eagerly() {
        let (memory, store) = store_with(&[1]).await;
        let _cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 2);

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while memory.stats().queries == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_exhaustion_is_permanent() {
        let (memory, store) = store_with(&[1]).await;
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 2);
        assert_eq!(drain(&mut cursor).await, vec![1]);

        memory
            .set_document(
                &Reference::new("points", "late"),
                json!({ "value": 0 }).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        assert!(!cursor.has_next().await.unwrap());
        assert_eq!(memory.stats().queries, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_can_be_retried() {
        let values: Vec<i64> = (1..=4).collect();
        let (memory, store) = store_with(&values).await;
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 2);
        assert_eq!(cursor.next_page(2).await.unwrap().len(), 2);

        memory.set_unavailable(true);
        assert!(matches!(
            cursor.poll_next().await,
            Err(StoreError::Unavailable(_))
        ));

        memory.set_unavailable(false);
        let rest: Vec<i64> = cursor
            .next_page(10)
            .await
            .unwrap()
            .iter()
            .map(value)
            .collect();
        assert_eq!(rest, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_undecodable_row_is_reported_once_and_stepped_over() {
        let (memory, store) = store_with(&[3, 1]).await;
        memory
            .set_document(
                &Reference::new("points", "bad"),
                json!({ "value": 2.5 }).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 5);

        let first = cursor.poll_next().await.unwrap().unwrap();
        assert_eq!(value(&first), 3);

        assert!(matches!(
            cursor.poll_next().await,
            Err(StoreError::InvalidData(_))
        ));

        assert_eq!(drain(&mut cursor).await, vec![1]);
        assert_eq!(cursor.buffered(), 2);
        assert_eq!(memory.stats().queries, 1);
    }

    #[tokio::test]
    async fn test_undecodable_row_does_not_block_later_pages() {
        let (memory, store) = store_with(&[4, 3, 1]).await;
        memory
            .set_document(
                &Reference::new("points", "bad"),
                json!({ "value": 2.5 }).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 2);

        assert_eq!(cursor.next_page(2).await.unwrap().len(), 2);
        assert!(cursor.peek_next().await.is_err());

        assert_eq!(drain(&mut cursor).await, vec![1]);
        // 2 + 2 (one undecodable) + 0.
        assert_eq!(memory.stats().queries, 3);
    }

    #[tokio::test]
    async fn test_failed_first_page_is_retried() {
        let (memory, store) = store_with(&[1, 2]).await;
        memory.set_unavailable(true);
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, descending(), 5);

        assert!(cursor.peek_next().await.is_err());

        memory.set_unavailable(false);
        assert_eq!(drain(&mut cursor).await, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_filters_are_applied() {
        let (_, store) = store_with(&[1, 2, 3, 4, 5]).await;
        let query = descending().filter("value", crate::store::FilterOp::Lt, 3);
        let mut cursor = PaginatedCursor::<PointSchema>::new(store, query, 1);

        assert_eq!(drain(&mut cursor).await, vec![2, 1]);
    }

    #[test]
    #[should_panic(expected = "page_size must be > 0")]
    fn test_zero_page_size_panics() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let _ = PaginatedCursor::<PointSchema>::new(store, descending(), 0);
    }
}
