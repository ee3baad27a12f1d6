use std::sync::Arc;

use shared::domain::{MemberId, ParentId, PivotAttributes, PivotRow, RelationSummary, ScopeKey};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    adjacent_row,
    assign::attach_in_scope,
    cache::{MembershipCache, DEFAULT_CAPACITY},
    check_contiguity,
    detach::{detach_in_scope, DetachOutcome},
    locks::ScopeLocks,
    reorder::{reorder_in_scope, ReorderOutcome},
    Adjacency, MemberSelection, OrderingError, PivotStore, RowRef, ScopeTransaction,
};

/// Declares one sortable relation of one parent entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationConfig {
    pub parent_entity_type: String,
    pub relation_name: String,
}

impl RelationConfig {
    pub fn new(
        parent_entity_type: impl Into<String>,
        relation_name: impl Into<String>,
    ) -> Result<Self, OrderingError> {
        let parent_entity_type = parent_entity_type.into().trim().to_string();
        let relation_name = relation_name.into().trim().to_string();
        if parent_entity_type.is_empty() {
            return Err(OrderingError::Configuration(
                "parent_entity_type must be specified for a sortable relation".into(),
            ));
        }
        if relation_name.is_empty() {
            return Err(OrderingError::Configuration(format!(
                "relation_name must be specified for sortable relations of {parent_entity_type}"
            )));
        }
        Ok(Self {
            parent_entity_type,
            relation_name,
        })
    }

    pub fn summary(&self) -> RelationSummary {
        RelationSummary {
            parent_entity_type: self.parent_entity_type.clone(),
            relation_name: self.relation_name.clone(),
        }
    }
}

/// Keeps the members of one sortable relation in a contiguous order.
///
/// Every mutation holds the scope's lock, runs inside a single store
/// transaction, and is checked for contiguity before it commits. A failure at
/// any step drops the transaction, so the scope keeps its previous order.
#[derive(Debug, Clone)]
pub struct OrderedAssociation<S> {
    config: RelationConfig,
    store: S,
    locks: Arc<ScopeLocks>,
    members: Arc<RwLock<MembershipCache>>,
}

impl<S: PivotStore> OrderedAssociation<S> {
    pub fn new(config: RelationConfig, store: S) -> Self {
        Self {
            config,
            store,
            locks: Arc::new(ScopeLocks::new()),
            members: Arc::new(RwLock::new(MembershipCache::new(DEFAULT_CAPACITY))),
        }
    }

    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn scope(&self, parent_id: ParentId) -> ScopeKey {
        ScopeKey::new(
            &self.config.parent_entity_type,
            &self.config.relation_name,
            parent_id,
        )
    }

    /// Appends members to the end of the parent's order and returns the new rows.
    pub async fn attach(
        &self,
        parent_id: ParentId,
        selection: MemberSelection,
        attributes: &PivotAttributes,
    ) -> Result<Vec<PivotRow>, OrderingError> {
        let scope = self.scope(parent_id);
        let _guard = self.locks.acquire(&scope).await;
        let mut tx = self.store.begin_scope(&scope).await?;

        let attached = attach_in_scope(&mut tx, selection, attributes).await?;
        self.finish(tx).await?;

        info!(
            %scope,
            attached = attached.len(),
            first_order = attached.first().map(|row| row.sort_order),
            "attached members"
        );
        Ok(attached)
    }

    /// Moves a member to `position` (1-based), shifting the members in between.
    pub async fn reorder(
        &self,
        parent_id: ParentId,
        member_id: MemberId,
        position: u32,
    ) -> Result<ReorderOutcome, OrderingError> {
        let scope = self.scope(parent_id);
        let _guard = self.locks.acquire(&scope).await;
        let mut tx = self.store.begin_scope(&scope).await?;

        let outcome = reorder_in_scope(&mut tx, member_id, position).await?;
        if outcome.is_noop() {
            return Ok(outcome);
        }
        self.finish(tx).await?;

        info!(
            %scope,
            %member_id,
            from = outcome.from,
            to = outcome.to,
            shifted = outcome.shifted.len(),
            "reordered member"
        );
        Ok(outcome)
    }

    /// Removes members one at a time in the given order, closing each gap.
    pub async fn detach(
        &self,
        parent_id: ParentId,
        member_ids: &[MemberId],
    ) -> Result<Vec<DetachOutcome>, OrderingError> {
        if member_ids.is_empty() {
            return Err(OrderingError::Validation(
                "at least one member is required".into(),
            ));
        }

        let scope = self.scope(parent_id);
        let _guard = self.locks.acquire(&scope).await;
        let mut tx = self.store.begin_scope(&scope).await?;

        let mut outcomes = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            outcomes.push(detach_in_scope(&mut tx, *member_id).await?);
        }
        self.finish(tx).await?;

        info!(%scope, detached = outcomes.len(), "detached members");
        Ok(outcomes)
    }

    /// The parent's members ascending by order.
    pub async fn ordered_members(&self, parent_id: ParentId) -> Result<Vec<PivotRow>, OrderingError> {
        if let Some(rows) = self.members.read().await.get(parent_id) {
            return Ok(rows.to_vec());
        }

        let scope = self.scope(parent_id);
        let _guard = self.locks.acquire(&scope).await;
        let rows = self.store.load_scope(&scope).await?;
        self.members.write().await.insert(parent_id, rows.clone());
        Ok(rows)
    }

    pub async fn adjacent(
        &self,
        parent_id: ParentId,
        member_id: MemberId,
        adjacency: Adjacency,
    ) -> Result<Option<PivotRow>, OrderingError> {
        let scope = self.scope(parent_id);
        let mut tx = self.store.begin_scope(&scope).await?;
        adjacent_row(&mut tx, RowRef::Member(member_id), adjacency).await
    }

    /// Checks the stored scope against the contiguity invariant.
    pub async fn verify(&self, parent_id: ParentId) -> Result<(), OrderingError> {
        let scope = self.scope(parent_id);
        let rows = self.store.load_scope(&scope).await?;
        check_contiguity(&rows).inspect_err(|error| {
            warn!(%scope, %error, "scope failed contiguity check");
        })
    }

    async fn finish(&self, mut tx: S::Scope) -> Result<(), OrderingError> {
        let rows = tx.ordered_rows().await?;
        check_contiguity(&rows)?;
        let parent_id = tx.scope().parent_id;
        tx.commit().await?;
        self.members.write().await.invalidate(parent_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/association_tests.rs"]
mod tests;
