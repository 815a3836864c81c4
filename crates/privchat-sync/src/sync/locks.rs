//! 序号空间锁表
//!
//! 每个序号空间一把异步锁，分配与追加日志在锁内完成；
//! 不同用户 / 频道互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::Scope;

/// 锁表超过该大小时清理空闲条目
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Default)]
pub struct ScopeLocks {
    locks: Mutex<HashMap<Scope, Arc<AsyncMutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, scope: Scope) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            if locks.len() >= PRUNE_THRESHOLD {
                // 只有表本身持有引用的条目没有持锁者也没有等待者
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(scope)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// 按固定顺序（用户在前，频道按 id 升序）锁住多个空间
    pub async fn lock_all(&self, scopes: &[Scope]) -> Vec<OwnedMutexGuard<()>> {
        let mut ordered = scopes.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for scope in ordered {
            guards.push(self.lock(scope).await);
        }
        guards
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
