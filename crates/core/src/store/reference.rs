use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Result, StoreError};

/// Handle to one remote document: a collection name plus a document id.
///
/// References are plain values. Any number of entity wrappers may hold the
/// same reference at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    collection: String,
    id: String,
}

impl Reference {
    /// Creates a reference to `collection/id`.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Parses a `collection/id` path.
    pub fn parse(path: &str) -> Result<Self> {
        match path.split_once('/') {
            Some((collection, id))
                if !collection.is_empty() && !id.is_empty() && !id.contains('/') =>
            {
                Ok(Self::new(collection, id))
            }
            _ => Err(StoreError::InvalidData(format!(
                "Malformed document path: {path}"
            ))),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the `collection/id` path.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    /// Returns the path as a JSON string, the form relationship fields are stored in.
    pub fn to_value(&self) -> Value {
        Value::String(self.path())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_round_trip() {
        let reference = Reference::new("users", "alice");
        assert_eq!(reference.path(), "users/alice");
        assert_eq!(Reference::parse("users/alice").unwrap(), reference);
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        for path in ["users", "users/", "/alice", "users/alice/extra", ""] {
            assert!(
                matches!(Reference::parse(path), Err(StoreError::InvalidData(_))),
                "expected {path:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(Reference::new("routes", "r1"), Reference::new("routes", "r1"));
        assert_ne!(Reference::new("routes", "r1"), Reference::new("users", "r1"));
    }

    #[test]
    fn test_display_and_value() {
        let reference = Reference::new("routes", "r1");
        assert_eq!(reference.to_string(), "routes/r1");
        assert_eq!(reference.to_value(), Value::String("routes/r1".to_string()));
    }
}
