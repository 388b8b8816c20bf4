use std::sync::Arc;

use async_trait::async_trait;

use crate::store::Result;

use super::{BoxCursor, Cursor};

/// Extracts the sort key a [`MergeCursor`] orders by.
pub type KeyFn<E, K> = Arc<dyn Fn(&E) -> K + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Merges cursors that are each sorted by descending key into one cursor
/// sorted by descending key.
///
/// Inputs are arranged in a balanced binary tree at construction, so each
/// item passes through `O(log k)` comparisons for `k` inputs. Every node keeps
/// a single lookahead slot and only ever polls the side that won, so the work
/// done is proportional to the number of items consumed. Ties go to the left
/// input.
pub struct MergeCursor<E, K> {
    left: Option<BoxCursor<E>>,
    right: Option<BoxCursor<E>>,
    pending: Option<(Side, E)>,
    key: KeyFn<E, K>,
}

impl<E, K> MergeCursor<E, K>
where
    E: Clone + Send + 'static,
    K: Ord + Send + 'static,
{
    /// Builds a merge tree over `cursors`, ordered by `key`.
    pub fn new<F>(cursors: Vec<BoxCursor<E>>, key: F) -> Self
    where
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        Self::build(cursors, Arc::new(key))
    }

    fn build(mut cursors: Vec<BoxCursor<E>>, key: KeyFn<E, K>) -> Self {
        if cursors.len() < 2 {
            let mut inputs = cursors.into_iter();
            return Self {
                left: inputs.next(),
                right: None,
                pending: None,
                key,
            };
        }

        let upper = cursors.split_off(cursors.len() / 2);
        let left = Self::build(cursors, Arc::clone(&key));
        let right = Self::build(upper, Arc::clone(&key));

        Self {
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
            pending: None,
            key,
        }
    }

    fn child(&mut self, side: Side) -> Option<&mut BoxCursor<E>> {
        match side {
            Side::Left => self.left.as_mut(),
            Side::Right => self.right.as_mut(),
        }
    }
}

async fn peek_child<E>(child: Option<&mut BoxCursor<E>>) -> Result<Option<E>>
where
    E: Clone + Send,
{
    match child {
        Some(cursor) => cursor.peek_next().await,
        None => Ok(None),
    }
}

#[async_trait]
impl<E, K> Cursor for MergeCursor<E, K>
where
    E: Clone + Send + 'static,
    K: Ord + Send + 'static,
{
    type Item = E;

    async fn peek_next(&mut self) -> Result<Option<E>> {
        if let Some((_, winner)) = &self.pending {
            return Ok(Some(winner.clone()));
        }

        let left = peek_child(self.left.as_mut()).await?;
        let right = peek_child(self.right.as_mut()).await?;

        let (side, winner) = match (left, right) {
            (None, None) => return Ok(None),
            (Some(left), None) => (Side::Left, left),
            (None, Some(right)) => (Side::Right, right),
            (Some(left), Some(right)) => {
                if (self.key)(&left) >= (self.key)(&right) {
                    (Side::Left, left)
                } else {
                    (Side::Right, right)
                }
            }
        };

        self.pending = Some((side, winner.clone()));
        Ok(Some(winner))
    }

    async fn poll_next(&mut self) -> Result<Option<E>> {
        if self.pending.is_none() {
            self.peek_next().await?;
        }

        let Some((side, _)) = self.pending.take() else {
            return Ok(None);
        };

        match self.child(side) {
            Some(cursor) => cursor.poll_next().await,
            None => Ok(None),
        }
    }
}
