//! Client-side data access for routebook.
//!
//! - [`store`]: the document store contract, queries, transactions and an
//!   in-memory backend.
//! - [`entity`]: lazily materialized typed views of single documents.
//! - [`cursor`]: paginated and merged ordered cursors.
//! - [`model`]: users and routes.
//! - [`client`]: the context application code is handed at startup.

pub mod client;
pub mod cursor;
pub mod entity;
pub mod model;
pub mod store;

pub use client::{Client, FeedCursor, DEFAULT_PAGE_SIZE};
