//! Entry point for application code.
//!
//! A [`Client`] is built once at startup around the store handle and passed
//! (or cloned) into whatever needs to read or write routebook data.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cursor::{BoxCursor, MergeCursor, PaginatedCursor};
use crate::entity::{Lazy, Schema};
use crate::model::{recency_key, NewRoute, NewUser, Route, RouteSchema, User, ROUTES, USERS};
use crate::store::{Direction, DocumentData, Query, Reference, Result, SharedStore};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Cursor over several users' routes, newest first.
pub type FeedCursor = MergeCursor<Route, Option<DateTime<Utc>>>;

/// Store handle plus read settings shared by every entity and cursor.
#[derive(Clone)]
pub struct Client {
    store: SharedStore,
    page_size: usize,
}

impl Client {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the page size cursors fetch with. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reference-only handle; nothing is fetched until a field is read.
    pub fn user(&self, id: impl Into<String>) -> User {
        User::from_id(Arc::clone(&self.store), id)
    }

    /// Reference-only handle; nothing is fetched until a field is read.
    pub fn route(&self, id: impl Into<String>) -> Route {
        Route::from_id(Arc::clone(&self.store), id)
    }

    /// Creates a user with a generated id.
    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        self.insert_user(Uuid::new_v4().to_string(), user).await
    }

    /// Creates or replaces the user stored under `id`.
    pub async fn insert_user(&self, id: impl Into<String>, user: NewUser) -> Result<User> {
        let reference = Reference::new(USERS, id);
        self.insert(reference, user.into_data()).await
    }

    /// Creates a route with a generated id.
    pub async fn create_route(&self, route: NewRoute) -> Result<Route> {
        self.insert_route(Uuid::new_v4().to_string(), route).await
    }

    /// Creates or replaces the route stored under `id`.
    pub async fn insert_route(&self, id: impl Into<String>, route: NewRoute) -> Result<Route> {
        let reference = Reference::new(ROUTES, id);
        self.insert(reference, route.into_data()).await
    }

    async fn insert<S: Schema>(
        &self,
        reference: Reference,
        data: DocumentData,
    ) -> Result<Lazy<S>> {
        self.store.set_document(&reference, data.clone()).await?;
        tracing::debug!(entity = S::ENTITY, %reference, "Document created");
        Lazy::with_data(Arc::clone(&self.store), Some(reference), &data)
    }

    /// Routes set by `setter`, newest first.
    pub fn routes_by_setter(&self, setter: &User) -> Result<PaginatedCursor<RouteSchema>> {
        let setter = setter.require_reference()?;
        let query = Query::new(ROUTES)
            .where_eq("setter", setter.to_value())
            .order_by("created_at", Direction::Descending);
        Ok(PaginatedCursor::new(
            Arc::clone(&self.store),
            query,
            self.page_size,
        ))
    }

    /// Every route, newest first.
    pub fn recent_routes(&self) -> PaginatedCursor<RouteSchema> {
        let query = Query::new(ROUTES).order_by("created_at", Direction::Descending);
        PaginatedCursor::new(Arc::clone(&self.store), query, self.page_size)
    }

    /// Routes set by everyone `user` follows, newest first.
    ///
    /// Loads `user` if needed, then opens one cursor per followed user and
    /// merges them. Each of those cursors starts fetching right away.
    pub async fn feed(&self, user: &User) -> Result<FeedCursor> {
        let following = user.following().await?;
        let cursors = following
            .iter()
            .map(|followed| {
                self.routes_by_setter(followed)
                    .map(|cursor| Box::new(cursor) as BoxCursor<Route>)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(user = ?user.id(), sources = cursors.len(), "Feed opened");
        Ok(MergeCursor::new(cursors, recency_key))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
