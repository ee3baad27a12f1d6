use shared::domain::{MemberId, PivotRow};
use tracing::debug;

use crate::{
    adjacent_row, Adjacency, OrderingError, PlannedShift, RowRef, ScopeTransaction, Shift,
    ShiftCascade,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DetachOutcome {
    pub removed: PivotRow,
    pub shifted: Vec<PlannedShift>,
}

/// Closes the gap left by `member_id` and removes its row.
pub async fn detach_in_scope<T: ScopeTransaction>(
    tx: &mut T,
    member_id: MemberId,
) -> Result<DetachOutcome, OrderingError> {
    let removed = tx.find_member(member_id).await?.ok_or_else(|| {
        OrderingError::ScopeConsistency(format!(
            "member {member_id} is not attached to {}",
            tx.scope()
        ))
    })?;

    let shifted = match adjacent_row(tx, RowRef::Row(&removed), Adjacency::Next).await? {
        Some(successor) => {
            ShiftCascade::new(Shift::Decrement, Adjacency::Next)
                .run(tx, successor)
                .await?
        }
        None => Vec::new(),
    };

    if !tx.delete_row(member_id).await? {
        return Err(OrderingError::ScopeConsistency(format!(
            "member {member_id} vanished from {} while detaching",
            tx.scope()
        )));
    }
    debug!(
        scope = %tx.scope(),
        %member_id,
        sort_order = removed.sort_order,
        shifted = shifted.len(),
        "detached pivot row"
    );

    Ok(DetachOutcome { removed, shifted })
}
