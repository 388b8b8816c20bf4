//! Storage backend implementations.
//!
//! The in-memory backend lives in `routebook_core::store` so library tests can
//! use it. This module holds the backends that only the binary needs. The
//! backend is selected at compile time via feature flags.
//!
//! # Feature Flags
//!
//! - `memory` (default): `InMemoryStore`, seeded with demo data at startup
//! - `sqlite`: SQLite storage backend using `rusqlite` and `tokio-rusqlite`
//!
//! Build with SQLite:
//! ```bash
//! cargo build -p routebook --no-default-features --features sqlite
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
