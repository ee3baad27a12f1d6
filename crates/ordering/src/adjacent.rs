use shared::domain::{MemberId, PivotRow};

use crate::{OrderingError, ScopeTransaction};

/// Direction of travel along a scope's order chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjacency {
    /// The row whose order is one lower.
    Previous,
    /// The row whose order is one higher.
    Next,
}

impl Adjacency {
    fn neighbour_order(self, sort_order: u32) -> Option<u32> {
        match self {
            Self::Previous => sort_order.checked_sub(1).filter(|order| *order > 0),
            Self::Next => sort_order.checked_add(1),
        }
    }
}

/// A reference row given either as a loaded row or by its member id.
#[derive(Debug, Clone, Copy)]
pub enum RowRef<'a> {
    Row(&'a PivotRow),
    Member(MemberId),
}

impl<'a> From<&'a PivotRow> for RowRef<'a> {
    fn from(value: &'a PivotRow) -> Self {
        Self::Row(value)
    }
}

impl From<MemberId> for RowRef<'_> {
    fn from(value: MemberId) -> Self {
        Self::Member(value)
    }
}

/// Finds the row directly before or after `reference` in the same scope.
///
/// `Ok(None)` marks the boundary of the list and is how shift cascades stop.
pub async fn adjacent_row<T>(
    tx: &mut T,
    reference: RowRef<'_>,
    adjacency: Adjacency,
) -> Result<Option<PivotRow>, OrderingError>
where
    T: ScopeTransaction,
{
    let sort_order = match reference {
        RowRef::Row(row) => row.sort_order,
        RowRef::Member(member_id) => {
            tx.find_member(member_id)
                .await?
                .ok_or_else(|| {
                    OrderingError::ScopeConsistency(format!(
                        "member {member_id} is not attached to {}",
                        tx.scope()
                    ))
                })?
                .sort_order
        }
    };

    let Some(neighbour) = adjacency.neighbour_order(sort_order) else {
        return Ok(None);
    };
    Ok(tx.row_at(neighbour).await?)
}
