//! 更新日志
//!
//! 只追加、可按范围查询的更新记录存储。每个用户、每个频道各自一个
//! 排序空间，键为 `[空间标记][id 大端][pts 大端]`，sled 的字典序即为
//! pts 升序。

use sled::{Batch, Tree};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::storage::{Storage, UPDATE_LOG_TREE};
use crate::types::{Scope, Update, UpdateRecord};

const USER_TAG: u8 = b'u';
const CHANNEL_TAG: u8 = b'c';

fn scope_prefix(scope: Scope) -> [u8; 9] {
    let (tag, id) = match scope {
        Scope::User(id) => (USER_TAG, id),
        Scope::Channel(id) => (CHANNEL_TAG, id),
    };
    let mut prefix = [0u8; 9];
    prefix[0] = tag;
    prefix[1..].copy_from_slice(&id.to_be_bytes());
    prefix
}

fn record_key(scope: Scope, pts: u64) -> [u8; 17] {
    let mut key = [0u8; 17];
    key[..9].copy_from_slice(&scope_prefix(scope));
    key[9..].copy_from_slice(&pts.to_be_bytes());
    key
}

#[derive(Debug, Clone)]
pub struct UpdateLog {
    tree: Tree,
}

impl UpdateLog {
    pub fn new(storage: &Storage) -> Result<Self> {
        Ok(Self {
            tree: storage.tree(UPDATE_LOG_TREE)?,
        })
    }

    /// 追加一条记录
    pub fn append(&self, scope: Scope, pts: u64, pts_count: u64, update: Update, created_at: i64) -> Result<()> {
        self.append_batch(vec![UpdateRecord {
            scope,
            pts,
            pts_count,
            update,
            created_at,
        }])
    }

    /// 原子追加多条记录（同一个 sled batch）
    pub fn append_batch(&self, records: Vec<UpdateRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::default();
        for record in &records {
            if record.pts == 0 || record.pts_count == 0 {
                return Err(SyncError::Storage(format!(
                    "拒绝写入无效记录: scope={:?}, pts={}, pts_count={}",
                    record.scope, record.pts, record.pts_count
                )));
            }
            let bytes = bincode::serialize(record)?;
            batch.insert(&record_key(record.scope, record.pts)[..], bytes);
        }
        self.tree.apply_batch(batch)?;

        debug!("追加更新日志: {} 条", records.len());
        Ok(())
    }

    /// 返回 `pts > after` 的所有记录，按 pts 升序
    ///
    /// 续查的起点是最后一条记录的 pts（即 `after` 加上结果的 `pts_count`
    /// 之和），不是 `after` 加上记录条数：删除批次只有一条记录却占多个序号。
    pub fn query_greater_than(&self, scope: Scope, after: u64) -> Result<Vec<UpdateRecord>> {
        let start = match after.checked_add(1) {
            Some(start) => start,
            None => return Ok(Vec::new()),
        };
        let lower = record_key(scope, start);
        let upper = record_key(scope, u64::MAX);

        let mut records = Vec::new();
        for item in self.tree.range(lower..=upper) {
            let (_, value) = item?;
            records.push(bincode::deserialize::<UpdateRecord>(&value)?);
        }
        Ok(records)
    }
}
