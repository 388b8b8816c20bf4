//! SQLite document store.
//!
//! Implements `DocumentStore` from `routebook_core::store` on top of SQLite.

use std::collections::HashMap;

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use routebook_core::store::{
    DocumentData, DocumentStore, PageKey, Query, QueryDocument, Reference, Result, StoreError,
    Transaction, DEFAULT_TRANSACTION_ATTEMPTS,
};

use super::error::{map_json_error, map_tokio_rusqlite_error, wrap_json};
use super::schema;

/// Version recorded for a document that did not exist when read.
const ABSENT: i64 = 0;

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

fn encode(data: &DocumentData) -> Result<String> {
    serde_json::to_string(data).map_err(map_json_error)
}

fn decode(body: &str) -> Result<DocumentData> {
    serde_json::from_str(body).map_err(map_json_error)
}

fn tick(conn: &rusqlite::Connection) -> rusqlite::Result<i64> {
    conn.query_row(schema::TICK_CLOCK, [], |row| row.get(0))
}

fn upsert(conn: &rusqlite::Connection, reference: &Reference, body: &str) -> rusqlite::Result<()> {
    let version = tick(conn)?;
    conn.execute(
        schema::UPSERT_DOCUMENT,
        rusqlite::params![reference.collection(), reference.id(), body, version],
    )?;
    Ok(())
}

/// SQLite-based document store.
///
/// Transactions are optimistic: reads record the version they saw and the
/// commit re-checks those versions inside one SQLite transaction before
/// applying any write.
///
/// Queries are evaluated in process by `Query::select_page`: every page loads
/// and decodes the whole collection, so draining a cursor over `N` documents
/// costs `O(N² / page_size)` row reads. Suited to demo-sized data sets.
pub struct SqliteStore {
    conn: Connection,
    max_attempts: usize,
}

impl SqliteStore {
    /// Creates a new store with a file-based database.
    ///
    /// The database file will be created if it doesn't exist.
    /// Schema tables are created automatically.
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::init_schema(&conn).await?;
        tracing::debug!(path, "SQLite store opened");

        Ok(Self::from_connection(conn))
    }

    /// Creates a new store with an in-memory database.
    ///
    /// Useful for testing - data is lost when the connection is dropped.
    #[allow(dead_code)]
    pub async fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            max_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
        }
    }

    /// Sets how many times a conflicting transaction is attempted.
    pub fn with_max_transaction_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Initialize the database schema.
    async fn init_schema(conn: &Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(schema::CREATE_TABLES)
                .map_err(wrap_err)?;
            Ok(())
        })
        .await
        .map_err(map_tokio_rusqlite_error)
    }

    /// Reads a document body and its version.
    async fn read(&self, reference: &Reference) -> Result<Option<(DocumentData, i64)>> {
        let collection = reference.collection().to_string();
        let id = reference.id().to_string();

        let row = self
            .conn
            .call(move |conn| {
                conn.query_row(schema::SELECT_DOCUMENT, [&collection, &id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .optional()
                .map_err(wrap_err)
            })
            .await
            .map_err(map_tokio_rusqlite_error)?;

        row.map(|(body, version)| Ok((decode(&body)?, version)))
            .transpose()
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_document(&self, reference: &Reference) -> Result<Option<DocumentData>> {
        Ok(self.read(reference).await?.map(|(data, _)| data))
    }

    /// Reads every document of the query's collection, then selects the page.
    async fn query_page(
        &self,
        query: &Query,
        start_after: Option<&PageKey>,
        limit: usize,
    ) -> Result<Vec<QueryDocument>> {
        let collection = query.collection().to_string();

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_COLLECTION)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map([&collection], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(wrap_err)?;

                let mut documents = Vec::new();
                for row_result in rows {
                    documents.push(row_result.map_err(wrap_err)?);
                }
                Ok(documents)
            })
            .await
            .map_err(map_tokio_rusqlite_error)?;

        let candidates = rows
            .into_iter()
            .map(|(id, body)| Ok((Reference::new(query.collection(), id), decode(&body)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(query.select_page(candidates, start_after, limit))
    }

    async fn set_document(&self, reference: &Reference, data: DocumentData) -> Result<()> {
        let body = encode(&data)?;
        let target = reference.clone();

        self.conn
            .call(move |conn| upsert(conn, &target, &body).map_err(wrap_err))
            .await
            .map_err(map_tokio_rusqlite_error)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(SqliteTransaction {
            conn: self.conn.clone(),
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

/// What a commit found once it held the database.
enum CommitOutcome {
    Applied,
    Conflict(Reference),
    Missing(Reference),
}

struct SqliteTransaction {
    conn: Connection,
    observed: HashMap<Reference, i64>,
    writes: Vec<Write>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn get(&mut self, reference: &Reference) -> Result<Option<DocumentData>> {
        if !self.writes.is_empty() {
            return Err(StoreError::TransactionFailed(
                "all reads must happen before the first write".to_string(),
            ));
        }

        let collection = reference.collection().to_string();
        let id = reference.id().to_string();
        let row = self
            .conn
            .call(move |conn| {
                conn.query_row(schema::SELECT_DOCUMENT, [&collection, &id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .optional()
                .map_err(wrap_err)
            })
            .await
            .map_err(map_tokio_rusqlite_error)?;

        let version = row.as_ref().map_or(ABSENT, |(_, version)| *version);
        self.observed.insert(reference.clone(), version);
        row.map(|(body, _)| decode(&body)).transpose()
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
        let count = writes.len();

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;

                for (reference, seen) in &observed {
                    let current = tx
                        .query_row(
                            schema::SELECT_VERSION,
                            [reference.collection(), reference.id()],
                            |row| row.get::<_, i64>(0),
                        )
                        .optional()
                        .map_err(wrap_err)?
                        .unwrap_or(ABSENT);
                    if current != *seen {
                        return Ok(CommitOutcome::Conflict(reference.clone()));
                    }
                }

                for write in &writes {
                    match write {
                        Write::Set(reference, data) => {
                            let body = serde_json::to_string(data).map_err(wrap_json)?;
                            upsert(&tx, reference, &body).map_err(wrap_err)?;
                        }
                        Write::Update(reference, fields) => {
                            let existing = tx
                                .query_row(
                                    schema::SELECT_DOCUMENT,
                                    [reference.collection(), reference.id()],
                                    |row| row.get::<_, String>(0),
                                )
                                .optional()
                                .map_err(wrap_err)?;
                            let Some(existing) = existing else {
                                return Ok(CommitOutcome::Missing(reference.clone()));
                            };
                            let mut data: DocumentData =
                                serde_json::from_str(&existing).map_err(wrap_json)?;
                            data.extend(fields.clone());
                            let body = serde_json::to_string(&data).map_err(wrap_json)?;
                            upsert(&tx, reference, &body).map_err(wrap_err)?;
                        }
                        Write::Delete(reference) => {
                            tx.execute(
                                schema::DELETE_DOCUMENT,
                                [reference.collection(), reference.id()],
                            )
                            .map_err(wrap_err)?;
                        }
                    }
                }

                tx.commit().map_err(wrap_err)?;
                Ok(CommitOutcome::Applied)
            })
            .await
            .map_err(map_tokio_rusqlite_error)?;

        match outcome {
            CommitOutcome::Applied => {
                tracing::debug!(writes = count, "Transaction committed");
                Ok(())
            }
            CommitOutcome::Conflict(reference) => Err(StoreError::Conflict(format!(
                "{reference} changed since it was read"
            ))),
            CommitOutcome::Missing(reference) => Err(StoreError::NotFound { reference }),
        }
    }
}
