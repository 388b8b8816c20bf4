//! In-memory document store.
//!
//! Stores documents in a `HashMap` behind `Arc<RwLock<_>>`. Transactions use
//! optimistic concurrency: every read records the document version it saw,
//! and commit rejects the transaction if any of those versions moved.
//!
//! The store keeps operation counters and a few fault switches so tests can
//! assert how many round trips a component made and how it reacts to failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    DocumentData, DocumentStore, PageKey, Query, QueryDocument, Reference, Result, StoreError,
    Transaction, DEFAULT_TRANSACTION_ATTEMPTS,
};

/// Version recorded for a document that did not exist when read.
const ABSENT: u64 = 0;

#[derive(Debug, Clone)]
struct StoredDocument {
    data: DocumentData,
    version: u64,
}

/// Operation counts observed by an [`InMemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// `get_document` calls.
    pub gets: usize,
    /// `query_page` calls.
    pub queries: usize,
    /// Transactions opened.
    pub transactions: usize,
    /// Commits that wrote at least one document.
    pub commits: usize,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicUsize,
    queries: AtomicUsize,
    transactions: AtomicUsize,
    commits: AtomicUsize,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    conflicts: AtomicUsize,
}

/// In-memory storage backend.
///
/// Cloning is cheap and every clone sees the same documents.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    documents: Arc<RwLock<HashMap<Reference, StoredDocument>>>,
    clock: Arc<AtomicU64>,
    counters: Arc<Counters>,
    faults: Arc<Faults>,
    latency: Option<Duration>,
    max_attempts: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(AtomicU64::new(ABSENT)),
            counters: Arc::new(Counters::default()),
            faults: Arc::new(Faults::default()),
            latency: None,
            max_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
        }
    }

    /// Delays every operation by `latency`, simulating a network round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Sets how many attempts a conflicting transaction gets.
    pub fn with_max_transaction_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Returns the operation counts so far.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            gets: self.counters.gets.load(Ordering::SeqCst),
            queries: self.counters.queries.load(Ordering::SeqCst),
            transactions: self.counters.transactions.load(Ordering::SeqCst),
            commits: self.counters.commits.load(Ordering::SeqCst),
        }
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` writing commits fail with [`StoreError::Conflict`].
    pub fn fail_next_commits(&self, count: usize) {
        self.faults.conflicts.store(count, Ordering::SeqCst);
    }

    /// Reads a document without counting it as a store operation.
    pub async fn peek_document(&self, reference: &Reference) -> Option<DocumentData> {
        let documents = self.documents.read().await;
        documents.get(reference).map(|doc| doc.data.clone())
    }

    /// Returns the number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Returns true if no documents are stored.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn round_trip(&self) -> Result<()> {
        self.check_available()?;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    fn next_version(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take_injected_conflict(&self) -> bool {
        self.faults
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(&self, reference: &Reference) -> Result<Option<DocumentData>> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let documents = self.documents.read().await;
        Ok(documents.get(reference).map(|doc| doc.data.clone()))
    }

    async fn query_page(
        &self,
        query: &Query,
        start_after: Option<&PageKey>,
        limit: usize,
    ) -> Result<Vec<QueryDocument>> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let documents = self.documents.read().await;
        let candidates = documents
            .iter()
            .filter(|(reference, _)| reference.collection() == query.collection())
            .map(|(reference, doc)| (reference.clone(), doc.data.clone()));

        Ok(query.select_page(candidates, start_after, limit))
    }

    async fn set_document(&self, reference: &Reference, data: DocumentData) -> Result<()> {
        self.round_trip().await?;

        let version = self.next_version();
        let mut documents = self.documents.write().await;
        documents.insert(reference.clone(), StoredDocument { data, version });
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.counters.transactions.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            observed: HashMap::new(),
            writes: Vec::new(),
        }))
    }

    fn max_transaction_attempts(&self) -> usize {
        self.max_attempts
    }
}

#[derive(Debug, Clone)]
enum Write {
    Set(Reference, DocumentData),
    Update(Reference, DocumentData),
    Delete(Reference),
}

impl Write {
    fn reference(&self) -> &Reference {
        match self {
            Write::Set(reference, _) | Write::Update(reference, _) | Write::Delete(reference) => {
                reference
            }
        }
    }
}

struct MemoryTransaction {
    store: InMemoryStore,
    observed: HashMap<Reference, u64>,
    writes: Vec<Write>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, reference: &Reference) -> Result<Option<DocumentData>> {
        if !self.writes.is_empty() {
            return Err(StoreError::TransactionFailed(
                "all reads must happen before the first write".to_string(),
            ));
        }
        self.store.round_trip().await?;

        let documents = self.store.documents.read().await;
        let stored = documents.get(reference);
        self.observed.insert(
            reference.clone(),
            stored.map_or(ABSENT, |doc| doc.version),
        );
        Ok(stored.map(|doc| doc.data.clone()))
    }

    fn set(&mut self, reference: &Reference, data: DocumentData) {
        self.writes.push(Write::Set(reference.clone(), data));
    }

    fn update(&mut self, reference: &Reference, fields: DocumentData) {
        self.writes.push(Write::Update(reference.clone(), fields));
    }

    fn delete(&mut self, reference: &Reference) {
        self.writes.push(Write::Delete(reference.clone()));
    }

    fn has_writes(&self) -> bool {
        !self.writes.is_empty()
    }

    async fn commit(&mut self) -> Result<()> {
        let writes = std::mem::take(&mut self.writes);
        let observed = std::mem::take(&mut self.observed);
        if writes.is_empty() {
            return Ok(());
        }
        self.store.round_trip().await?;

        if self.store.take_injected_conflict() {
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }

        let mut documents = self.store.documents.write().await;

        for (reference, seen) in &observed {
            let current = documents.get(reference).map_or(ABSENT, |doc| doc.version);
            if current != *seen {
                return Err(StoreError::Conflict(format!(
                    "{reference} changed since it was read"
                )));
            }
        }

        // Stage every touched document so a failing write leaves the store untouched.
        let mut staged: HashMap<Reference, Option<DocumentData>> = HashMap::new();
        for write in &writes {
            let reference = write.reference();
            if !staged.contains_key(reference) {
                let current = documents.get(reference).map(|doc| doc.data.clone());
                staged.insert(reference.clone(), current);
            }
        }

        for write in writes {
            match write {
                Write::Set(reference, data) => {
                    staged.insert(reference, Some(data));
                }
                Write::Update(reference, fields) => match staged.get_mut(&reference) {
                    Some(Some(data)) => data.extend(fields),
                    _ => return Err(StoreError::NotFound { reference }),
                },
                Write::Delete(reference) => {
                    staged.insert(reference, None);
                }
            }
        }

        for (reference, data) in staged {
            match data {
                Some(data) => {
                    let version = self.store.next_version();
                    documents.insert(reference, StoredDocument { data, version });
                }
                None => {
                    documents.remove(&reference);
                }
            }
        }

        self.store.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
