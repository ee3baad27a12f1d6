//! Order maintenance for sortable many-to-many associations.
//!
//! Every pivot row of a scope (one parent, one relation) carries a `sort_order`
//! and the orders of a scope with `N` rows are always exactly `1..=N`. The
//! handlers in this crate compute the renumbering required by attach, reorder
//! and detach; [`OrderedAssociation`] runs them against a [`PivotStore`] inside
//! one transaction per mutation.

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{MemberId, PivotRow, ScopeKey};

pub mod adjacent;
pub mod assign;
pub mod association;
mod cache;
pub mod cascade;
pub mod detach;
pub mod error;
pub mod locks;
#[cfg(test)]
mod memory;
pub mod reorder;

pub use adjacent::{adjacent_row, Adjacency, RowRef};
pub use assign::{assign_orders, MemberSelection, NewMember};
pub use association::{OrderedAssociation, RelationConfig};
pub use cascade::{PlannedShift, Shift, ShiftCascade};
pub use error::OrderingError;

/// Persistence seam for pivot rows.
#[async_trait]
pub trait PivotStore: Send + Sync {
    type Scope: ScopeTransaction;

    /// Opens a unit of work covering a single scope. Dropping the returned
    /// value without calling [`ScopeTransaction::commit`] discards its writes.
    async fn begin_scope(&self, scope: &ScopeKey) -> Result<Self::Scope>;

    /// Reads a scope outside of any transaction, ascending by order.
    async fn load_scope(&self, scope: &ScopeKey) -> Result<Vec<PivotRow>>;
}

#[async_trait]
pub trait ScopeTransaction: Send {
    fn scope(&self) -> &ScopeKey;

    async fn count(&mut self) -> Result<u32>;

    /// All rows of the scope ascending by order.
    async fn ordered_rows(&mut self) -> Result<Vec<PivotRow>>;

    async fn find_member(&mut self, member_id: MemberId) -> Result<Option<PivotRow>>;

    async fn row_at(&mut self, sort_order: u32) -> Result<Option<PivotRow>>;

    async fn insert_row(&mut self, row: &PivotRow) -> Result<()>;

    async fn write_order(&mut self, member_id: MemberId, sort_order: u32) -> Result<()>;

    /// Returns `false` when the member was not attached.
    async fn delete_row(&mut self, member_id: MemberId) -> Result<bool>;

    async fn commit(self) -> Result<()>;
}

/// Checks that the orders of `rows` are exactly `1..=rows.len()`.
pub fn check_contiguity(rows: &[PivotRow]) -> std::result::Result<(), OrderingError> {
    let mut orders: Vec<u32> = rows.iter().map(|row| row.sort_order).collect();
    orders.sort_unstable();
    for (index, order) in orders.iter().enumerate() {
        let expected = index as u32 + 1;
        if *order != expected {
            return Err(OrderingError::ScopeConsistency(format!(
                "expected order {expected} at slot {index}, found {order}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
