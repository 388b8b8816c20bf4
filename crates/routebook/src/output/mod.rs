//! Output views and formatting.
//!
//! Views are plain serializable snapshots of entities, so both output formats
//! render the same data.

pub mod pretty;

use chrono::{DateTime, Utc};
use routebook_core::entity::{Lazy, Schema};
use routebook_core::model::{Route, User};
use routebook_core::store::Result;
use serde::Serialize;

use crate::cli::OutputFormat;

/// Format a value as JSON.
pub fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Format a value for output.
pub fn format_output<T: Serialize>(
    value: &T,
    format: OutputFormat,
    pretty: impl FnOnce(&T) -> String,
) -> String {
    match format {
        OutputFormat::Json => format_json(value),
        OutputFormat::Pretty => pretty(value),
    }
}

fn id_of<S: Schema>(entity: &Lazy<S>) -> String {
    entity.id().unwrap_or_default().to_string()
}

fn ids_of<S: Schema>(entities: &[Lazy<S>]) -> Vec<String> {
    entities.iter().map(id_of).collect()
}

/// A user with relationships shown as ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub following: Vec<String>,
    pub followers: Vec<String>,
    pub liked_routes: Vec<String>,
}

impl UserView {
    /// Loads the user if needed. Related users and routes are not fetched.
    pub async fn load(user: &User) -> Result<Self> {
        let fields = user.fields().await?;
        Ok(Self {
            id: id_of(user),
            display_name: fields.display_name.clone(),
            email: fields.email.clone(),
            following: ids_of(&fields.following),
            followers: ids_of(&fields.followers),
            liked_routes: ids_of(&fields.liked_routes),
        })
    }
}

/// A route with its setter shown as an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteView {
    pub id: String,
    pub name: String,
    pub grade: String,
    pub setter: Option<String>,
    pub created_at: DateTime<Utc>,
    pub likes: usize,
}

impl RouteView {
    /// Loads the route if needed. The setter is not fetched.
    pub async fn load(route: &Route) -> Result<Self> {
        let fields = route.fields().await?;
        Ok(Self {
            id: id_of(route),
            name: fields.name.clone(),
            grade: fields.grade.clone(),
            setter: fields.setter.as_ref().map(id_of),
            created_at: fields.created_at,
            likes: fields.likes.len(),
        })
    }

    pub async fn load_all(routes: &[Route]) -> Result<Vec<Self>> {
        let mut views = Vec::with_capacity(routes.len());
        for route in routes {
            views.push(Self::load(route).await?);
        }
        Ok(views)
    }
}

/// One page of routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteList {
    pub title: String,
    pub routes: Vec<RouteView>,
    /// True if the cursor had more routes past this page.
    pub more: bool,
}

/// Result of a relationship change or deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeView {
    pub action: &'static str,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// False if the change was a no-op.
    pub changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_output_ignores_pretty_formatter() {
        let change = ChangeView {
            action: "follow",
            subject: "alice".to_string(),
            object: Some("bob".to_string()),
            changed: true,
        };

        let json = format_output(&change, OutputFormat::Json, |_| unreachable!());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["action"], "follow");
        assert_eq!(value["changed"], true);
    }

    #[test]
    fn test_missing_object_is_omitted_from_json() {
        let change = ChangeView {
            action: "delete-route",
            subject: "crimp-city".to_string(),
            object: None,
            changed: false,
        };

        let value: serde_json::Value = serde_json::from_str(&format_json(&change)).unwrap();

        assert!(value.get("object").is_none());
    }
}
