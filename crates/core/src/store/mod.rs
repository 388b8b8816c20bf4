mod document;
mod error;
mod memory;
mod query;
mod reference;
mod traits;

pub use document::{
    field_at, references_value, timestamp_value, DocumentData, FieldReader, QueryDocument,
};
pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, StoreStats};
pub use query::{compare_values, Direction, Filter, FilterOp, OrderBy, PageKey, Query};
pub use reference::Reference;
pub use traits::{
    run_transaction, DocumentStore, SharedStore, Transaction, TransactionBody,
    DEFAULT_TRANSACTION_ATTEMPTS,
};
