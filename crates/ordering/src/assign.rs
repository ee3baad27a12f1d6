use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use shared::domain::{MemberId, ParentId, PivotAttributes, PivotRow};

use crate::{OrderingError, ScopeTransaction};

/// The member(s) handed to an attach call.
#[derive(Debug, Clone)]
pub enum MemberSelection {
    Single(MemberId),
    /// Assigned consecutive orders in iteration order.
    Ordered(Vec<NewMember>),
    /// Has no defined iteration order and is always rejected.
    Unordered(HashSet<MemberId>),
}

impl MemberSelection {
    pub fn ids(ids: impl IntoIterator<Item = MemberId>) -> Self {
        Self::Ordered(ids.into_iter().map(NewMember::new).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMember {
    pub member_id: MemberId,
    pub attributes: Option<PivotAttributes>,
}

impl NewMember {
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            attributes: None,
        }
    }

    pub fn with_attributes(member_id: MemberId, attributes: PivotAttributes) -> Self {
        Self {
            member_id,
            attributes: Some(attributes),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignedMember {
    pub member_id: MemberId,
    pub sort_order: u32,
    pub attributes: PivotAttributes,
}

impl AssignedMember {
    pub fn into_row(self, parent_id: ParentId, attached_at: DateTime<Utc>) -> PivotRow {
        PivotRow {
            parent_id,
            member_id: self.member_id,
            sort_order: self.sort_order,
            attributes: self.attributes,
            attached_at,
        }
    }
}

/// Appends the selection to the end of a scope that currently holds
/// `current_count` rows.
///
/// `attributes` applies to every member; per-member attributes are layered on
/// top of it. No persistence happens here.
pub fn assign_orders(
    current_count: u32,
    selection: MemberSelection,
    attributes: &PivotAttributes,
) -> Result<Vec<AssignedMember>, OrderingError> {
    let members = match selection {
        MemberSelection::Single(member_id) => vec![NewMember::new(member_id)],
        MemberSelection::Ordered(members) => members,
        MemberSelection::Unordered(_) => {
            return Err(OrderingError::Validation(
                "expected an ordered list of members but got an unordered collection".into(),
            ))
        }
    };

    if members.is_empty() {
        return Err(OrderingError::Validation(
            "at least one member is required".into(),
        ));
    }

    let mut seen = BTreeSet::new();
    for member in &members {
        if !seen.insert(member.member_id) {
            return Err(OrderingError::Validation(format!(
                "member {} appears more than once",
                member.member_id
            )));
        }
    }

    let mut assigned = Vec::with_capacity(members.len());
    for (offset, member) in (1u32..).zip(members) {
        let sort_order = current_count.checked_add(offset).ok_or_else(|| {
            OrderingError::Validation("scope cannot hold any more members".into())
        })?;
        let mut merged = attributes.clone();
        if let Some(own) = member.attributes {
            merged.extend(own);
        }
        assigned.push(AssignedMember {
            member_id: member.member_id,
            sort_order,
            attributes: merged,
        });
    }
    Ok(assigned)
}

/// Assigns orders against the live scope and inserts the new rows.
pub async fn attach_in_scope<T: ScopeTransaction>(
    tx: &mut T,
    selection: MemberSelection,
    attributes: &PivotAttributes,
) -> Result<Vec<PivotRow>, OrderingError> {
    let count = tx.count().await?;
    let assigned = assign_orders(count, selection, attributes)?;

    for member in &assigned {
        if tx.find_member(member.member_id).await?.is_some() {
            return Err(OrderingError::Validation(format!(
                "member {} is already attached to {}",
                member.member_id,
                tx.scope()
            )));
        }
    }

    let parent_id = tx.scope().parent_id;
    let attached_at = Utc::now();
    let mut rows = Vec::with_capacity(assigned.len());
    for member in assigned {
        let row = member.into_row(parent_id, attached_at);
        tx.insert_row(&row).await?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
#[path = "tests/assign_tests.rs"]
mod tests;
