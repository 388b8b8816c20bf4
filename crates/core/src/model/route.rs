use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entity::{Lazy, Schema};
use crate::store::{
    references_value, run_transaction, timestamp_value, DocumentData, FieldReader, Reference,
    Result, SharedStore, Transaction, TransactionBody,
};

use super::edge::{field_update, toggle, EdgeChange, EdgeSide};
use super::user::LIKED_ROUTES;
use super::{mirror, related, related_all, User, UserSchema};

/// Collection route documents live in.
pub const ROUTES: &str = "routes";

pub(crate) const SETTER: &str = "setter";
pub(crate) const CREATED_AT: &str = "created_at";
pub(crate) const LIKES: &str = "likes";

/// Decoding rules for route documents.
pub struct RouteSchema;

/// Fields of a route document.
#[derive(Debug, Clone)]
pub struct RouteFields {
    pub name: String,
    pub grade: String,
    /// `None` when nobody is credited with setting the route.
    pub setter: Option<User>,
    pub created_at: DateTime<Utc>,
    /// Users who liked the route, oldest first.
    pub likes: Vec<User>,
}

impl Schema for RouteSchema {
    const COLLECTION: &'static str = ROUTES;
    const ENTITY: &'static str = "Route";

    type Fields = RouteFields;

    fn decode(store: &SharedStore, data: &DocumentData) -> Result<RouteFields> {
        let fields = FieldReader::new(Self::ENTITY, data);
        Ok(RouteFields {
            name: fields.string("name")?,
            grade: fields.string("grade")?,
            setter: fields
                .reference(SETTER)?
                .map(|reference| related::<UserSchema>(store, reference))
                .transpose()?,
            created_at: fields.timestamp(CREATED_AT)?,
            likes: related_all(store, fields.references(LIKES)?)?,
        })
    }
}

/// A climbing route.
pub type Route = Lazy<RouteSchema>;

/// Merge key that orders routes newest first.
///
/// Routes coming out of a query are already loaded, so this never fetches.
/// An unloaded route sorts after every loaded one.
pub fn recency_key(route: &Route) -> Option<DateTime<Utc>> {
    route.loaded().map(|fields| fields.created_at)
}

/// Data for a route that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoute {
    pub name: String,
    pub grade: String,
    pub setter: Option<Reference>,
    pub created_at: DateTime<Utc>,
}

impl NewRoute {
    /// A route with no setter, created now.
    pub fn new(name: impl Into<String>, grade: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grade: grade.into(),
            setter: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_setter(mut self, setter: Reference) -> Self {
        self.setter = Some(setter);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Initial document: no likes yet.
    pub fn into_data(self) -> DocumentData {
        let mut data = DocumentData::new();
        data.insert("name".to_string(), Value::from(self.name));
        data.insert("grade".to_string(), Value::from(self.grade));
        data.insert(
            SETTER.to_string(),
            self.setter.as_ref().map_or(Value::Null, Reference::to_value),
        );
        data.insert(CREATED_AT.to_string(), timestamp_value(self.created_at));
        data.insert(LIKES.to_string(), Value::Array(Vec::new()));
        data
    }
}

impl Lazy<RouteSchema> {
    pub async fn name(&self) -> Result<String> {
        Ok(self.fields().await?.name.clone())
    }

    pub async fn grade(&self) -> Result<String> {
        Ok(self.fields().await?.grade.clone())
    }

    /// The setter, or `Ok(None)` if the route has none.
    pub async fn setter(&self) -> Result<Option<User>> {
        Ok(self.fields().await?.setter.clone())
    }

    pub async fn created_at(&self) -> Result<DateTime<Utc>> {
        Ok(self.fields().await?.created_at)
    }

    pub async fn likes(&self) -> Result<Vec<User>> {
        Ok(self.fields().await?.likes.clone())
    }

    /// Records that `user` likes this route. Returns false if they already did.
    pub async fn like(&self, user: &User) -> Result<bool> {
        self.change_like(user, true).await
    }

    /// Removes a like. Returns false, writing nothing, if there was none.
    pub async fn unlike(&self, user: &User) -> Result<bool> {
        self.change_like(user, false).await
    }

    async fn change_like(&self, user: &User, like: bool) -> Result<bool> {
        let route = EdgeSide::new(
            self.require_reference()?.clone(),
            RouteSchema::ENTITY,
            LIKES,
        );
        let liker = EdgeSide::new(
            user.require_reference()?.clone(),
            UserSchema::ENTITY,
            LIKED_ROUTES,
        );
        let mut change = if like {
            EdgeChange::link(route, liker)
        } else {
            EdgeChange::unlink(route, liker)
        };

        let outcome = run_transaction(self.store().as_ref(), &mut change).await?;
        mirror(self, &outcome.source);
        mirror(user, &outcome.target);

        tracing::debug!(
            route = ?self.id(),
            user = ?user.id(),
            like,
            changed = outcome.changed,
            "Route like updated"
        );
        Ok(outcome.changed)
    }

    /// Deletes the route and removes it from every liker's liked routes in
    /// one transaction. Returns false if the route was already gone.
    ///
    /// The handle is left unloaded, so later field access fails with
    /// `NotFound`.
    pub async fn delete(&self) -> Result<bool> {
        let mut deletion = DeleteRoute {
            route: self.require_reference()?.clone(),
        };

        let deleted = run_transaction(self.store().as_ref(), &mut deletion).await?;
        self.invalidate();

        tracing::debug!(route = ?self.id(), deleted, "Route deleted");
        Ok(deleted)
    }
}

struct DeleteRoute {
    route: Reference,
}

#[async_trait]
impl TransactionBody for DeleteRoute {
    type Output = bool;

    async fn run(&mut self, tx: &mut dyn Transaction) -> Result<bool> {
        let Some(route) = tx.get(&self.route).await? else {
            return Ok(false);
        };
        let likers = FieldReader::new(RouteSchema::ENTITY, &route).references(LIKES)?;

        let mut updates = Vec::new();
        for liker in likers {
            // A liker that no longer exists has nothing to clean up.
            let Some(mut user) = tx.get(&liker).await? else {
                continue;
            };
            let mut liked =
                FieldReader::new(UserSchema::ENTITY, &user).references(LIKED_ROUTES)?;
            if toggle(&mut liked, &self.route, false) {
                user.insert(LIKED_ROUTES.to_string(), references_value(&liked));
                updates.push((liker, field_update(LIKED_ROUTES, &user)));
            }
        }

        for (liker, update) in updates {
            tx.update(&liker, update);
        }
        tx.delete(&self.route);
        Ok(true)
    }
}
