use std::sync::Arc;

use async_trait::async_trait;

use super::{DocumentData, PageKey, Query, QueryDocument, Reference, Result, StoreError};

/// Default number of attempts [`run_transaction`] makes before giving up on
/// conflicting concurrent writes.
pub const DEFAULT_TRANSACTION_ATTEMPTS: usize = 5;

/// Shared handle to the document store, passed into every entity and cursor.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Remote document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Gets a document by reference. `None` means the document does not exist.
    async fn get_document(&self, reference: &Reference) -> Result<Option<DocumentData>>;

    /// Runs one page of a query.
    ///
    /// Returns at most `limit` rows strictly after `start_after`. Fewer than
    /// `limit` rows means nothing further matched when the page was read.
    async fn query_page(
        &self,
        query: &Query,
        start_after: Option<&PageKey>,
        limit: usize,
    ) -> Result<Vec<QueryDocument>>;

    /// Creates or replaces a document outside of any transaction.
    async fn set_document(&self, reference: &Reference, data: DocumentData) -> Result<()>;

    /// Opens a transaction.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Attempts [`run_transaction`] makes on conflicting writes.
    fn max_transaction_attempts(&self) -> usize {
        DEFAULT_TRANSACTION_ATTEMPTS
    }
}

/// Read/write handle scoped to one transaction.
///
/// All reads must happen before the first write. Writes are buffered and
/// applied atomically by [`Transaction::commit`], which fails with
/// [`StoreError::Conflict`] if any document read here changed in the meantime.
#[async_trait]
pub trait Transaction: Send {
    /// Reads a document and records the version observed.
    async fn get(&mut self, reference: &Reference) -> Result<Option<DocumentData>>;

    /// Creates or replaces a document.
    fn set(&mut self, reference: &Reference, data: DocumentData);

    /// Merges top-level fields into an existing document.
    fn update(&mut self, reference: &Reference, fields: DocumentData);

    /// Deletes a document.
    fn delete(&mut self, reference: &Reference);

    /// Returns true if any write has been buffered.
    fn has_writes(&self) -> bool;

    /// Applies all buffered writes atomically.
    async fn commit(&mut self) -> Result<()>;
}

/// Work executed inside a transaction. May run more than once on conflicts.
#[async_trait]
pub trait TransactionBody: Send {
    type Output: Send;

    async fn run(&mut self, tx: &mut dyn Transaction) -> Result<Self::Output>;
}

/// Runs `body` in a transaction, retrying on [`StoreError::Conflict`].
///
/// Each attempt opens a fresh transaction and re-runs the body from scratch,
/// so bodies must re-read whatever state they depend on. Errors other than
/// conflicts abort immediately without writing anything.
pub async fn run_transaction<B>(store: &dyn DocumentStore, body: &mut B) -> Result<B::Output>
where
    B: TransactionBody,
{
    let max_attempts = store.max_transaction_attempts().max(1);
    let mut attempt = 1;

    loop {
        let mut tx = store.begin_transaction().await?;
        let output = body.run(tx.as_mut()).await?;
        let wrote = tx.has_writes();

        match tx.commit().await {
            Ok(()) => {
                tracing::trace!(attempt, wrote, "Transaction finished");
                return Ok(output);
            }
            Err(StoreError::Conflict(reason)) if attempt < max_attempts => {
                tracing::warn!(attempt, max_attempts, %reason, "Transaction conflict, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
