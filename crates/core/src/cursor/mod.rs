//! Ordered, lazily advancing read cursors.
//!
//! [`PaginatedCursor`] pages through one query. [`MergeCursor`] combines any
//! number of cursors sharing a sort key into one globally ordered cursor,
//! pulling from its inputs only as items are consumed.
//!
//! Cursors are single-consumer: every method takes `&mut self`, so calls on
//! one instance can never overlap.

mod merge;
mod paginated;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;

use crate::store::Result;

pub use merge::{KeyFn, MergeCursor};
pub use paginated::PaginatedCursor;

/// Pull interface shared by leaf and merge cursors.
#[async_trait]
pub trait Cursor: Send {
    type Item: Clone + Send;

    /// Returns the next item without consuming it; `None` once exhausted.
    ///
    /// Calling this repeatedly returns the same item and fetches nothing new.
    async fn peek_next(&mut self) -> Result<Option<Self::Item>>;

    /// Returns the next item and moves past it; `None` once exhausted.
    async fn poll_next(&mut self) -> Result<Option<Self::Item>>;

    async fn has_next(&mut self) -> Result<bool> {
        Ok(self.peek_next().await?.is_some())
    }

    /// Polls up to `limit` items. A short result means the cursor is exhausted.
    async fn next_page(&mut self, limit: usize) -> Result<Vec<Self::Item>> {
        let mut page = Vec::with_capacity(limit);
        while page.len() < limit {
            match self.poll_next().await? {
                Some(item) => page.push(item),
                None => break,
            }
        }
        Ok(page)
    }
}

/// Type-erased cursor, the form merge cursors take their inputs in.
pub type BoxCursor<T> = Box<dyn Cursor<Item = T>>;

/// Drains a cursor as a stream. The stream ends after the first error.
pub fn into_stream<C>(mut cursor: C) -> impl Stream<Item = Result<C::Item>>
where
    C: Cursor + 'static,
{
    try_stream! {
        while let Some(item) = cursor.poll_next().await? {
            yield item;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Cursor over a fixed list, counting how often it was polled.
    pub struct VecCursor {
        items: VecDeque<i64>,
        pub polls: Arc<AtomicUsize>,
    }

    impl VecCursor {
        pub fn new(items: impl IntoIterator<Item = i64>) -> Self {
            Self {
                items: items.into_iter().collect(),
                polls: Default::default(),
            }
        }

        pub fn boxed(items: impl IntoIterator<Item = i64>) -> BoxCursor<i64> {
            Box::new(Self::new(items))
        }
    }

    #[async_trait]
    impl Cursor for VecCursor {
        type Item = i64;

        async fn peek_next(&mut self) -> Result<Option<i64>> {
            Ok(self.items.front().copied())
        }

        async fn poll_next(&mut self) -> Result<Option<i64>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.pop_front())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::VecCursor;
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_next_page_stops_at_exhaustion() {
        let mut cursor = VecCursor::new([5, 4, 3]);

        assert_eq!(cursor.next_page(2).await.unwrap(), vec![5, 4]);
        assert_eq!(cursor.next_page(2).await.unwrap(), vec![3]);
        assert!(cursor.next_page(2).await.unwrap().is_empty());
        assert!(!cursor.has_next().await.unwrap());
    }

    #[tokio::test]
    async fn test_into_stream_yields_every_item() {
        let stream = into_stream(VecCursor::new([3, 2, 1]));
        tokio::pin!(stream);

        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.unwrap());
        }

        assert_eq!(items, vec![3, 2, 1]);
    }
}
