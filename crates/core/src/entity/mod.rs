//! Lazily materialized entities.
//!
//! An entity is a typed view of one remote document. It is created either
//! from a bare [`Reference`](crate::store::Reference), in which case the
//! document is fetched on first field access, or from data a query already
//! returned, in which case no fetch ever happens.

mod lazy;

pub use lazy::{Lazy, Schema};
