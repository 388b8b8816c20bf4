use async_trait::async_trait;
use serde_json::Value;

use crate::store::{
    references_value, DocumentData, FieldReader, Reference, Result, StoreError, Transaction,
    TransactionBody,
};

/// One end of a two-sided relationship.
#[derive(Debug, Clone)]
pub(crate) struct EdgeSide {
    pub reference: Reference,
    pub entity: &'static str,
    /// Reference-list field holding the other end.
    pub field: &'static str,
}

impl EdgeSide {
    pub fn new(reference: Reference, entity: &'static str, field: &'static str) -> Self {
        Self {
            reference,
            entity,
            field,
        }
    }
}

/// Fresh data of both documents after an [`EdgeChange`] ran.
#[derive(Debug)]
pub(crate) struct EdgeOutcome {
    pub source: DocumentData,
    pub target: DocumentData,
    /// False when the relationship was already in the requested state.
    pub changed: bool,
}

/// Adds or removes a relationship that both documents record.
///
/// Each run re-reads both documents, applies the change to the fresh lists,
/// and only writes the sides whose list actually changed.
#[derive(Debug)]
pub(crate) struct EdgeChange {
    source: EdgeSide,
    target: EdgeSide,
    link: bool,
}

impl EdgeChange {
    pub fn link(source: EdgeSide, target: EdgeSide) -> Self {
        Self {
            source,
            target,
            link: true,
        }
    }

    pub fn unlink(source: EdgeSide, target: EdgeSide) -> Self {
        Self {
            source,
            target,
            link: false,
        }
    }
}

#[async_trait]
impl TransactionBody for EdgeChange {
    type Output = EdgeOutcome;

    async fn run(&mut self, tx: &mut dyn Transaction) -> Result<EdgeOutcome> {
        let mut source = read_existing(tx, &self.source.reference).await?;
        let mut target = read_existing(tx, &self.target.reference).await?;

        let (source_side, target_side) = (&self.source, &self.target);
        let source_changed =
            set_member(&mut source, source_side, &target_side.reference, self.link)?;
        let target_changed =
            set_member(&mut target, target_side, &source_side.reference, self.link)?;

        if source_changed {
            tx.update(
                &source_side.reference,
                field_update(source_side.field, &source),
            );
        }
        if target_changed {
            tx.update(
                &target_side.reference,
                field_update(target_side.field, &target),
            );
        }

        Ok(EdgeOutcome {
            source,
            target,
            changed: source_changed || target_changed,
        })
    }
}

/// Reads a document inside a transaction, failing with `NotFound` if it is gone.
pub(crate) async fn read_existing(
    tx: &mut dyn Transaction,
    reference: &Reference,
) -> Result<DocumentData> {
    tx.get(reference)
        .await?
        .ok_or_else(|| StoreError::not_found(reference))
}

/// Adds `member` to, or removes it from, the side's list inside `data`.
///
/// Returns whether the list changed.
fn set_member(
    data: &mut DocumentData,
    side: &EdgeSide,
    member: &Reference,
    present: bool,
) -> Result<bool> {
    let mut members = FieldReader::new(side.entity, data).references(side.field)?;
    if !toggle(&mut members, member, present) {
        return Ok(false);
    }
    data.insert(side.field.to_string(), references_value(&members));
    Ok(true)
}

pub(crate) fn toggle(members: &mut Vec<Reference>, member: &Reference, present: bool) -> bool {
    let before = members.len();
    if present {
        if !members.contains(member) {
            members.push(member.clone());
        }
    } else {
        members.retain(|existing| existing != member);
    }
    members.len() != before
}

/// Builds an update touching only `field`, copied from `data`.
pub(crate) fn field_update(field: &str, data: &DocumentData) -> DocumentData {
    let mut update = DocumentData::new();
    update.insert(
        field.to_string(),
        data.get(field).cloned().unwrap_or(Value::Null),
    );
    update
}
