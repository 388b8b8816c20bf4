//! SQLite storage backend implementation.
//!
//! Every document lives in one `documents` table as a JSON body plus a
//! version number. Queries load the collection and page through it with the
//! same selection rules as the in-memory store. `rusqlite` does the
//! synchronous work and `tokio-rusqlite` runs it off the async runtime.

mod error;
mod schema;
mod store;

pub use store::SqliteStore;
