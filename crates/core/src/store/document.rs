use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::{PageKey, Reference, Result, StoreError};

/// Raw field data of one document.
pub type DocumentData = serde_json::Map<String, Value>;

/// One row of a query page: the document, its data, and the key to resume after it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDocument {
    pub reference: Reference,
    pub data: DocumentData,
    pub page_key: PageKey,
}

/// Looks up a dotted field path (`"stats.likes"`) in document data.
pub fn field_at<'a>(data: &'a DocumentData, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Converts a timestamp into the stored representation (UTC milliseconds).
pub fn timestamp_value(timestamp: DateTime<Utc>) -> Value {
    Value::from(timestamp.timestamp_millis())
}

/// Typed field access over raw document data.
///
/// Errors name the entity being decoded so a bad document is easy to find.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    entity: &'static str,
    data: &'a DocumentData,
}

impl<'a> FieldReader<'a> {
    pub fn new(entity: &'static str, data: &'a DocumentData) -> Self {
        Self { entity, data }
    }

    fn present(&self, name: &str) -> Option<&'a Value> {
        self.data.get(name).filter(|value| !value.is_null())
    }

    fn missing(&self, name: &str) -> StoreError {
        StoreError::InvalidData(format!("{} document missing field `{name}`", self.entity))
    }

    fn wrong_type(&self, name: &str, expected: &str) -> StoreError {
        StoreError::InvalidData(format!(
            "{} field `{name}` is not {expected}",
            self.entity
        ))
    }

    pub fn string(&self, name: &str) -> Result<String> {
        self.optional_string(name)?
            .ok_or_else(|| self.missing(name))
    }

    pub fn optional_string(&self, name: &str) -> Result<Option<String>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.wrong_type(name, "a string")),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64> {
        let value = self.present(name).ok_or_else(|| self.missing(name))?;
        value
            .as_i64()
            .ok_or_else(|| self.wrong_type(name, "an integer"))
    }

    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        let millis = self.integer(name)?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| self.wrong_type(name, "a valid timestamp"))
    }

    /// Reads an optional relationship. A missing key or `null` is an absent
    /// relationship, not an error.
    pub fn reference(&self, name: &str) -> Result<Option<Reference>> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(path)) => Reference::parse(path).map(Some),
            Some(_) => Err(self.wrong_type(name, "a document path")),
        }
    }

    /// Reads an ordered list of relationships. A missing key is an empty list.
    pub fn references(&self, name: &str) -> Result<Vec<Reference>> {
        match self.present(name) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(path) => Reference::parse(path),
                    _ => Err(self.wrong_type(name, "a list of document paths")),
                })
                .collect(),
            Some(_) => Err(self.wrong_type(name, "a list of document paths")),
        }
    }
}

/// Encodes references as the JSON array a reference-list field stores.
pub fn references_value<'r>(references: impl IntoIterator<Item = &'r Reference>) -> Value {
    Value::Array(references.into_iter().map(Reference::to_value).collect())
}
