use shared::domain::{MemberId, PivotRow};
use tracing::debug;

use crate::{adjacent_row, Adjacency, OrderingError, RowRef, ScopeTransaction};

/// How a cascade adjusts each row it visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Increment,
    Decrement,
}

impl Shift {
    fn apply(self, sort_order: u32) -> Option<u32> {
        match self {
            Self::Increment => sort_order.checked_add(1),
            Self::Decrement => sort_order.checked_sub(1).filter(|order| *order > 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedShift {
    pub member_id: MemberId,
    pub from: u32,
    pub to: u32,
}

/// Renumbers a run of neighbouring rows by one slot.
///
/// Starting at a row, the cascade follows `traversal` until it reaches the end
/// of the scope or a row whose order equals `until_order`; that row and
/// everything beyond it are left alone. Each visited row is moved by `shift`,
/// and the writes are issued farthest row first so the last write lands on
/// the starting row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftCascade {
    pub shift: Shift,
    pub traversal: Adjacency,
    pub until_order: Option<u32>,
}

impl ShiftCascade {
    pub fn new(shift: Shift, traversal: Adjacency) -> Self {
        Self {
            shift,
            traversal,
            until_order: None,
        }
    }

    pub fn until(mut self, sort_order: u32) -> Self {
        self.until_order = Some(sort_order);
        self
    }

    /// Walks the adjacency chain from `start` and returns the shifts to apply,
    /// farthest row first.
    pub async fn plan<T: ScopeTransaction>(
        &self,
        tx: &mut T,
        start: PivotRow,
    ) -> Result<Vec<PlannedShift>, OrderingError> {
        let mut visited = Vec::new();
        let mut current = Some(start);

        while let Some(row) = current {
            if self.until_order == Some(row.sort_order) {
                break;
            }
            let to = self.shift.apply(row.sort_order).ok_or_else(|| {
                OrderingError::ScopeConsistency(format!(
                    "member {} cannot move below order {}",
                    row.member_id, row.sort_order
                ))
            })?;
            current = adjacent_row(tx, RowRef::Row(&row), self.traversal).await?;
            visited.push(PlannedShift {
                member_id: row.member_id,
                from: row.sort_order,
                to,
            });
        }

        visited.reverse();
        Ok(visited)
    }

    /// Plans the cascade and persists every shift in order.
    pub async fn run<T: ScopeTransaction>(
        &self,
        tx: &mut T,
        start: PivotRow,
    ) -> Result<Vec<PlannedShift>, OrderingError> {
        let shifts = self.plan(tx, start).await?;
        for shift in &shifts {
            debug!(
                member_id = %shift.member_id,
                from = shift.from,
                to = shift.to,
                "shifting pivot row"
            );
            tx.write_order(shift.member_id, shift.to)
                .await
                .map_err(|source| OrderingError::CascadeInterrupted {
                    member_id: shift.member_id,
                    source,
                })?;
        }
        Ok(shifts)
    }
}

#[cfg(test)]
#[path = "tests/cascade_tests.rs"]
mod tests;
