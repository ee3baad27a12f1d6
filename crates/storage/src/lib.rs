use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ordering::{PivotStore, ScopeTransaction};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::debug;

use shared::domain::{MemberId, ParentId, PivotAttributes, PivotRow, ScopeKey};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const ROW_COLUMNS: &str = "member_id, sort_order, attributes, attached_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        // Every connection to `sqlite::memory:` opens its own empty database,
        // so an in-memory store keeps exactly one connection alive.
        let (pool_options, connect_options) = if is_memory_url(database_url) {
            let pool_options = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            (pool_options, connect_options)
        } else {
            (
                SqlitePoolOptions::new().max_connections(5),
                connect_options.journal_mode(SqliteJournalMode::Wal),
            )
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Parents that currently have at least one member in the relation.
    pub async fn parents_with_members(
        &self,
        parent_type: &str,
        relation_name: &str,
    ) -> Result<Vec<ParentId>> {
        let rows = sqlx::query(
            "SELECT DISTINCT parent_id FROM relation_pivots
             WHERE parent_type = ? AND relation_name = ?
             ORDER BY parent_id ASC",
        )
        .bind(parent_type)
        .bind(relation_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| ParentId(r.get::<i64, _>(0)))
            .collect())
    }

    /// Writes an order value without any bookkeeping. Only meant for repairing
    /// or reproducing damaged scopes.
    pub async fn force_order(
        &self,
        scope: &ScopeKey,
        member_id: MemberId,
        sort_order: u32,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE relation_pivots SET sort_order = ?
             WHERE parent_type = ? AND relation_name = ? AND parent_id = ? AND member_id = ?",
        )
        .bind(i64::from(sort_order))
        .bind(scope.parent_type.as_str())
        .bind(scope.relation_name.as_str())
        .bind(scope.parent_id.0)
        .bind(member_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }
}

#[async_trait]
impl PivotStore for Storage {
    type Scope = SqliteScope;

    async fn begin_scope(&self, scope: &ScopeKey) -> Result<SqliteScope> {
        // Take the write lock up front. A deferred transaction that reads
        // first cannot wait for another writer when it later upgrades.
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .with_context(|| format!("failed to open transaction for {scope}"))?;
        Ok(SqliteScope {
            key: scope.clone(),
            tx,
        })
    }

    async fn load_scope(&self, scope: &ScopeKey) -> Result<Vec<PivotRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM relation_pivots
             WHERE parent_type = ? AND relation_name = ? AND parent_id = ?
             ORDER BY sort_order ASC, member_id ASC"
        ))
        .bind(scope.parent_type.as_str())
        .bind(scope.relation_name.as_str())
        .bind(scope.parent_id.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load {scope}"))?;

        rows.iter()
            .map(|row| pivot_row(row, scope.parent_id))
            .collect()
    }
}

/// One transaction over a single scope. Dropping it without committing rolls
/// every write back.
pub struct SqliteScope {
    key: ScopeKey,
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl ScopeTransaction for SqliteScope {
    fn scope(&self) -> &ScopeKey {
        &self.key
    }

    async fn count(&mut self) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM relation_pivots
             WHERE parent_type = ? AND relation_name = ? AND parent_id = ?",
        )
        .bind(self.key.parent_type.as_str())
        .bind(self.key.relation_name.as_str())
        .bind(self.key.parent_id.0)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(u32::try_from(count)?)
    }

    async fn ordered_rows(&mut self) -> Result<Vec<PivotRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM relation_pivots
             WHERE parent_type = ? AND relation_name = ? AND parent_id = ?
             ORDER BY sort_order ASC, member_id ASC"
        ))
        .bind(self.key.parent_type.as_str())
        .bind(self.key.relation_name.as_str())
        .bind(self.key.parent_id.0)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| pivot_row(row, self.key.parent_id))
            .collect()
    }

    async fn find_member(&mut self, member_id: MemberId) -> Result<Option<PivotRow>> {
        let row = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM relation_pivots
             WHERE parent_type = ? AND relation_name = ? AND parent_id = ? AND member_id = ?"
        ))
        .bind(self.key.parent_type.as_str())
        .bind(self.key.relation_name.as_str())
        .bind(self.key.parent_id.0)
        .bind(member_id.0)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| pivot_row(&row, self.key.parent_id))
            .transpose()
    }

    async fn row_at(&mut self, sort_order: u32) -> Result<Option<PivotRow>> {
        let row = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM relation_pivots
             WHERE parent_type = ? AND relation_name = ? AND parent_id = ? AND sort_order = ?
             ORDER BY member_id ASC
             LIMIT 1"
        ))
        .bind(self.key.parent_type.as_str())
        .bind(self.key.relation_name.as_str())
        .bind(self.key.parent_id.0)
        .bind(i64::from(sort_order))
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| pivot_row(&row, self.key.parent_id))
            .transpose()
    }

    async fn insert_row(&mut self, row: &PivotRow) -> Result<()> {
        let attributes =
            serde_json::to_string(&row.attributes).context("failed to encode pivot attributes")?;
        sqlx::query(
            "INSERT INTO relation_pivots (parent_type, relation_name, parent_id, member_id, sort_order, attributes, attached_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.key.parent_type.as_str())
        .bind(self.key.relation_name.as_str())
        .bind(row.parent_id.0)
        .bind(row.member_id.0)
        .bind(i64::from(row.sort_order))
        .bind(attributes)
        .bind(row.attached_at)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("failed to attach member {} to {}", row.member_id, self.key))?;
        Ok(())
    }

    async fn write_order(&mut self, member_id: MemberId, sort_order: u32) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE relation_pivots SET sort_order = ?
             WHERE parent_type = ? AND relation_name = ? AND parent_id = ? AND member_id = ?",
        )
        .bind(i64::from(sort_order))
        .bind(self.key.parent_type.as_str())
        .bind(self.key.relation_name.as_str())
        .bind(self.key.parent_id.0)
        .bind(member_id.0)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if updated != 1 {
            bail!(
                "expected to update one pivot row for member {member_id} in {}, updated {updated}",
                self.key
            );
        }
        Ok(())
    }

    async fn delete_row(&mut self, member_id: MemberId) -> Result<bool> {
        let deleted = sqlx::query(
            "DELETE FROM relation_pivots
             WHERE parent_type = ? AND relation_name = ? AND parent_id = ? AND member_id = ?",
        )
        .bind(self.key.parent_type.as_str())
        .bind(self.key.relation_name.as_str())
        .bind(self.key.parent_id.0)
        .bind(member_id.0)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();
        Ok(deleted > 0)
    }

    async fn commit(self) -> Result<()> {
        debug!(scope = %self.key, "committing scope transaction");
        self.tx
            .commit()
            .await
            .with_context(|| format!("failed to commit {}", self.key))
    }
}

fn pivot_row(row: &SqliteRow, parent_id: ParentId) -> Result<PivotRow> {
    let raw_attributes = row.try_get::<String, _>("attributes")?;
    let attributes: PivotAttributes = serde_json::from_str(&raw_attributes)
        .with_context(|| format!("invalid pivot attributes '{raw_attributes}'"))?;
    Ok(PivotRow {
        parent_id,
        member_id: MemberId(row.try_get::<i64, _>("member_id")?),
        sort_order: u32::try_from(row.try_get::<i64, _>("sort_order")?)
            .context("stored sort_order out of range")?,
        attributes,
        attached_at: row.try_get::<DateTime<Utc>, _>("attached_at")?,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

/// Turns a bare file path or a single-colon `sqlite:` url into a
/// `sqlite://` url. Backslashes become forward slashes; other urls pass
/// through unchanged.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw = raw_database_url.trim();
    if is_memory_url(raw) || raw.contains("://") {
        return raw.to_string();
    }
    let path = raw.strip_prefix("sqlite:").unwrap_or(raw);
    format!("sqlite://{}", path.replace('\\', "/"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .filter(|parent| !parent.as_os_str().is_empty())
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
