use shared::domain::MemberId;
use tracing::debug;

use crate::{Adjacency, OrderingError, PlannedShift, ScopeTransaction, Shift, ShiftCascade};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderOutcome {
    pub member_id: MemberId,
    pub from: u32,
    pub to: u32,
    pub shifted: Vec<PlannedShift>,
}

impl ReorderOutcome {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// The cascade that makes room for a row moving from `old_order` to
/// `new_order`, or `None` when it stays put.
///
/// Moving toward the front pushes the rows in `new..old` back by one; moving
/// toward the back pulls the rows in `old+1..=new` forward by one. Either way
/// the walk starts at the row occupying `new_order` and stops at the moved row.
pub fn cascade_for_move(old_order: u32, new_order: u32) -> Option<ShiftCascade> {
    if old_order == new_order {
        return None;
    }
    let cascade = if old_order > new_order {
        ShiftCascade::new(Shift::Increment, Adjacency::Next)
    } else {
        ShiftCascade::new(Shift::Decrement, Adjacency::Previous)
    };
    Some(cascade.until(old_order))
}

/// Moves `member_id` to `position`, shifting the rows in between.
pub async fn reorder_in_scope<T: ScopeTransaction>(
    tx: &mut T,
    member_id: MemberId,
    position: u32,
) -> Result<ReorderOutcome, OrderingError> {
    if position == 0 {
        return Err(OrderingError::Validation(
            "position must be 1 or greater".into(),
        ));
    }

    let moved = tx.find_member(member_id).await?.ok_or_else(|| {
        OrderingError::ScopeConsistency(format!(
            "member {member_id} is not attached to {}",
            tx.scope()
        ))
    })?;
    let target = tx.row_at(position).await?.ok_or_else(|| {
        OrderingError::ScopeConsistency(format!(
            "no member occupies position {position} in {}",
            tx.scope()
        ))
    })?;

    let Some(cascade) = cascade_for_move(moved.sort_order, position) else {
        return Ok(ReorderOutcome {
            member_id,
            from: moved.sort_order,
            to: position,
            shifted: Vec::new(),
        });
    };

    debug!(
        scope = %tx.scope(),
        %member_id,
        from = moved.sort_order,
        to = position,
        "reordering pivot row"
    );
    let shifted = cascade.run(tx, target).await?;
    tx.write_order(member_id, position).await?;

    Ok(ReorderOutcome {
        member_id,
        from: moved.sort_order,
        to: position,
        shifted,
    })
}
