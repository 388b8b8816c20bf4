//! Climbers and the routes they set and like.
//!
//! Both entity kinds are [`Lazy`] handles. Relationship fields decode into
//! reference-only handles, so following a chain of users or routes fetches
//! one document per hop, only when asked.

mod edge;
mod route;
mod user;

use std::sync::Arc;

use crate::entity::{Lazy, Schema};
use crate::store::{DocumentData, Reference, Result, SharedStore, StoreError};

pub use route::{recency_key, NewRoute, Route, RouteFields, RouteSchema, ROUTES};
pub use user::{NewUser, User, UserFields, UserSchema, USERS};

/// Builds a reference-only handle for a relationship field, rejecting
/// references into the wrong collection.
fn related<S: Schema>(store: &SharedStore, reference: Reference) -> Result<Lazy<S>> {
    if reference.collection() != S::COLLECTION {
        return Err(StoreError::InvalidData(format!(
            "expected a {} reference, got {reference}",
            S::ENTITY
        )));
    }
    Ok(Lazy::from_reference(Arc::clone(store), reference))
}

/// Loads data a committed mutation read into `entity`.
///
/// The write has already happened, so data that fails to decode only drops
/// the loaded state; the next field access fetches and reports the error.
fn mirror<S: Schema>(entity: &Lazy<S>, data: &DocumentData) {
    if let Err(err) = entity.apply(data) {
        tracing::warn!(
            entity = S::ENTITY,
            reference = ?entity.reference(),
            error = %err,
            "Committed document did not decode"
        );
        entity.invalidate();
    }
}

fn related_all<S: Schema>(
    store: &SharedStore,
    references: Vec<Reference>,
) -> Result<Vec<Lazy<S>>> {
    references
        .into_iter()
        .map(|reference| related(store, reference))
        .collect()
}
