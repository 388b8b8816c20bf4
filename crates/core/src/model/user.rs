use serde_json::Value;

use crate::entity::{Lazy, Schema};
use crate::store::{
    run_transaction, DocumentData, FieldReader, Result, SharedStore, StoreError,
};

use super::edge::{EdgeChange, EdgeSide};
use super::{mirror, related_all, Route, RouteSchema};

/// Collection user documents live in.
pub const USERS: &str = "users";

pub(crate) const FOLLOWING: &str = "following";
pub(crate) const FOLLOWERS: &str = "followers";
pub(crate) const LIKED_ROUTES: &str = "liked_routes";

/// Decoding rules for user documents.
pub struct UserSchema;

/// Fields of a user document.
#[derive(Debug, Clone)]
pub struct UserFields {
    pub display_name: String,
    pub email: String,
    /// Users this user follows.
    pub following: Vec<User>,
    pub followers: Vec<User>,
    pub liked_routes: Vec<Route>,
}

impl Schema for UserSchema {
    const COLLECTION: &'static str = USERS;
    const ENTITY: &'static str = "User";

    type Fields = UserFields;

    fn decode(store: &SharedStore, data: &DocumentData) -> Result<UserFields> {
        let fields = FieldReader::new(Self::ENTITY, data);
        Ok(UserFields {
            display_name: fields.string("display_name")?,
            email: fields.string("email")?,
            following: related_all(store, fields.references(FOLLOWING)?)?,
            followers: related_all(store, fields.references(FOLLOWERS)?)?,
            liked_routes: related_all::<RouteSchema>(store, fields.references(LIKED_ROUTES)?)?,
        })
    }
}

/// A climber.
pub type User = Lazy<UserSchema>;

/// Data for a user that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub display_name: String,
    pub email: String,
}

impl NewUser {
    pub fn new(display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            email: email.into(),
        }
    }

    /// Initial document: no relationships yet.
    pub fn into_data(self) -> DocumentData {
        let mut data = DocumentData::new();
        data.insert("display_name".to_string(), Value::from(self.display_name));
        data.insert("email".to_string(), Value::from(self.email));
        data.insert(FOLLOWING.to_string(), Value::Array(Vec::new()));
        data.insert(FOLLOWERS.to_string(), Value::Array(Vec::new()));
        data.insert(LIKED_ROUTES.to_string(), Value::Array(Vec::new()));
        data
    }
}

impl Lazy<UserSchema> {
    pub async fn display_name(&self) -> Result<String> {
        Ok(self.fields().await?.display_name.clone())
    }

    pub async fn email(&self) -> Result<String> {
        Ok(self.fields().await?.email.clone())
    }

    pub async fn following(&self) -> Result<Vec<User>> {
        Ok(self.fields().await?.following.clone())
    }

    pub async fn followers(&self) -> Result<Vec<User>> {
        Ok(self.fields().await?.followers.clone())
    }

    pub async fn liked_routes(&self) -> Result<Vec<Route>> {
        Ok(self.fields().await?.liked_routes.clone())
    }

    /// Checks the loaded state; fetches this user if needed, never `other`.
    pub async fn is_following(&self, other: &User) -> Result<bool> {
        let fields = self.fields().await?;
        Ok(fields.following.iter().any(|user| user.same_document(other)))
    }

    /// Starts following `target`. Returns false if already following.
    pub async fn follow(&self, target: &User) -> Result<bool> {
        self.change_follow(target, true).await
    }

    /// Stops following `target`. Returns false, writing nothing, if not
    /// following.
    pub async fn unfollow(&self, target: &User) -> Result<bool> {
        self.change_follow(target, false).await
    }

    async fn change_follow(&self, target: &User, follow: bool) -> Result<bool> {
        let source = self.require_reference()?.clone();
        let other = target.require_reference()?.clone();
        if source == other {
            return Err(StoreError::InvalidData(format!(
                "{source} cannot follow itself"
            )));
        }

        let source = EdgeSide::new(source, UserSchema::ENTITY, FOLLOWING);
        let other = EdgeSide::new(other, UserSchema::ENTITY, FOLLOWERS);
        let mut change = if follow {
            EdgeChange::link(source, other)
        } else {
            EdgeChange::unlink(source, other)
        };

        let outcome = run_transaction(self.store().as_ref(), &mut change).await?;
        mirror(self, &outcome.source);
        mirror(target, &outcome.target);

        tracing::debug!(
            user = ?self.id(),
            target = ?target.id(),
            follow,
            changed = outcome.changed,
            "Follow relationship updated"
        );
        Ok(outcome.changed)
    }
}
