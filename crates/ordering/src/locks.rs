use std::{collections::HashMap, sync::Arc};

use shared::domain::ScopeKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes mutations per scope within one process.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    inner: Mutex<HashMap<ScopeKey, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, scope: &ScopeKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            // Drop entries nobody is holding or waiting on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(scope.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
