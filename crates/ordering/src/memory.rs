//! A process-local [`PivotStore`] backed by a map of scopes.
//!
//! Each transaction works on a copy of its scope and publishes it on commit,
//! so an abandoned transaction leaves the stored rows untouched.

use std::{collections::HashMap, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use shared::domain::{MemberId, PivotRow, ScopeKey};
use tokio::sync::Mutex;

use crate::{PivotStore, ScopeTransaction};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    scopes: Arc<Mutex<HashMap<ScopeKey, Vec<PivotRow>>>>,
    writes_until_failure: Arc<Mutex<Option<usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the order write after the next `writes` successful ones fail.
    pub async fn fail_writes_after(&self, writes: usize) {
        *self.writes_until_failure.lock().await = Some(writes);
    }

    /// Replaces a scope's rows wholesale, bypassing every check.
    pub async fn seed(&self, scope: &ScopeKey, rows: Vec<PivotRow>) {
        self.scopes.lock().await.insert(scope.clone(), rows);
    }
}

#[async_trait]
impl PivotStore for MemoryStore {
    type Scope = MemoryScope;

    async fn begin_scope(&self, scope: &ScopeKey) -> Result<MemoryScope> {
        let rows = self
            .scopes
            .lock()
            .await
            .get(scope)
            .cloned()
            .unwrap_or_default();
        Ok(MemoryScope {
            key: scope.clone(),
            rows,
            store: self.clone(),
        })
    }

    async fn load_scope(&self, scope: &ScopeKey) -> Result<Vec<PivotRow>> {
        let mut rows = self
            .scopes
            .lock()
            .await
            .get(scope)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|row| row.sort_order);
        Ok(rows)
    }
}

#[derive(Debug)]
pub struct MemoryScope {
    key: ScopeKey,
    rows: Vec<PivotRow>,
    store: MemoryStore,
}

#[async_trait]
impl ScopeTransaction for MemoryScope {
    fn scope(&self) -> &ScopeKey {
        &self.key
    }

    async fn count(&mut self) -> Result<u32> {
        Ok(u32::try_from(self.rows.len())?)
    }

    async fn ordered_rows(&mut self) -> Result<Vec<PivotRow>> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|row| row.sort_order);
        Ok(rows)
    }

    async fn find_member(&mut self, member_id: MemberId) -> Result<Option<PivotRow>> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.member_id == member_id)
            .cloned())
    }

    async fn row_at(&mut self, sort_order: u32) -> Result<Option<PivotRow>> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.sort_order == sort_order)
            .cloned())
    }

    async fn insert_row(&mut self, row: &PivotRow) -> Result<()> {
        if self.rows.iter().any(|r| r.member_id == row.member_id) {
            bail!("member {} already attached to {}", row.member_id, self.key);
        }
        self.rows.push(row.clone());
        Ok(())
    }

    async fn write_order(&mut self, member_id: MemberId, sort_order: u32) -> Result<()> {
        {
            let mut remaining = self.store.writes_until_failure.lock().await;
            if let Some(left) = remaining.as_mut() {
                if *left == 0 {
                    *remaining = None;
                    bail!("injected write failure for member {member_id}");
                }
                *left -= 1;
            }
        }
        let Some(row) = self.rows.iter_mut().find(|row| row.member_id == member_id) else {
            bail!("member {member_id} not attached to {}", self.key);
        };
        row.sort_order = sort_order;
        Ok(())
    }

    async fn delete_row(&mut self, member_id: MemberId) -> Result<bool> {
        let before = self.rows.len();
        self.rows.retain(|row| row.member_id != member_id);
        Ok(self.rows.len() != before)
    }

    async fn commit(self) -> Result<()> {
        let mut scopes = self.store.scopes.lock().await;
        if self.rows.is_empty() {
            scopes.remove(&self.key);
        } else {
            scopes.insert(self.key, self.rows);
        }
        Ok(())
    }
}
