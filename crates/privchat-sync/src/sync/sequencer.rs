/// 序号分配器
///
/// 职责：
/// - 为每个用户、每个频道分配单调递增的 pts
/// - 维护每个用户的 qts / seq
/// - 记录每个连接的水位，用于判断重连客户端是否需要补齐
///
/// 分配绝不静默失败：后端不可用时立即返回 `SyncError::Allocation`，
/// 调用方必须丢弃整次更新。

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sled::Tree;
use tracing::{debug, error, warn};

use crate::error::{Result, SyncError};
use crate::storage::{
    Storage, CHANNEL_PTS_TREE, CONNECTION_STATE_TREE, USER_PTS_TREE, USER_QTS_TREE, USER_SEQ_TREE,
};
use crate::types::{ChannelId, ConnectionKey, UserId};

/// 用户序号状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub pts: u64,
    pub qts: u64,
    pub seq: u64,
}

/// 连接水位
///
/// `stalled` 为真表示曾有推送没送到，水位停在丢失记录之前，
/// 推送成功不再推进，直到客户端补齐后显式 `set_connection_watermark`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionWatermark {
    pub pts: u64,
    pub qts: u64,
    pub updated_at: i64,
    pub stalled: bool,
}

#[async_trait]
pub trait Sequencer: Debug + Send + Sync {
    /// 推进并返回用户的新 pts
    async fn next_pts(&self, user_id: UserId) -> Result<u64>;
    /// 推进并返回频道的新 pts
    async fn next_channel_pts(&self, channel_id: ChannelId) -> Result<u64>;
    /// 推进并返回用户的新 seq
    async fn next_seq(&self, user_id: UserId) -> Result<u64>;
    /// 读取用户当前状态（不推进）
    async fn current_state(&self, user_id: UserId) -> Result<SequenceState>;
    /// 读取频道当前 pts（不推进）
    async fn current_channel_pts(&self, channel_id: ChannelId) -> Result<u64>;
    /// 客户端确认的水位，覆盖写入并解除暂停
    async fn set_connection_watermark(&self, key: ConnectionKey, pts: u64, qts: u64) -> Result<()>;
    /// 更新已送达后推进水位；只前进，暂停中的连接不动。返回是否推进
    async fn advance_connection_watermark(&self, key: ConnectionKey, pts: u64, qts: u64) -> Result<bool>;
    /// 推送丢失：水位退到 `floor` 以下并暂停推进
    async fn stall_connection_watermark(&self, key: ConnectionKey, floor: u64) -> Result<()>;
    async fn get_connection_watermark(&self, key: ConnectionKey) -> Result<Option<ConnectionWatermark>>;
}

/// 基于 sled 的分配器
///
/// 计数器是 8 字节大端 u64，用 `update_and_fetch`（CAS）原子推进，
/// 不同空间之间没有共享锁。
#[derive(Debug, Clone)]
pub struct SledSequencer {
    user_pts: Tree,
    user_qts: Tree,
    user_seq: Tree,
    channel_pts: Tree,
    connection_state: Tree,
}

impl SledSequencer {
    pub fn new(storage: &Storage) -> Result<Self> {
        Ok(Self {
            user_pts: storage.tree(USER_PTS_TREE)?,
            user_qts: storage.tree(USER_QTS_TREE)?,
            user_seq: storage.tree(USER_SEQ_TREE)?,
            channel_pts: storage.tree(CHANNEL_PTS_TREE)?,
            connection_state: storage.tree(CONNECTION_STATE_TREE)?,
        })
    }

    fn advance(tree: &Tree, id: u64) -> Result<u64> {
        let mut overflow = false;
        let updated = tree
            .update_and_fetch(id.to_be_bytes(), |old| {
                let current = old.map(decode_counter).unwrap_or(0);
                match current.checked_add(1) {
                    Some(next) => Some(next.to_be_bytes().to_vec()),
                    None => {
                        overflow = true;
                        old.map(|bytes| bytes.to_vec())
                    }
                }
            })
            .map_err(|e| SyncError::Allocation(format!("推进计数器失败: {}", e)))?;

        if overflow {
            return Err(SyncError::Allocation(format!("计数器溢出: id={}", id)));
        }

        updated
            .map(|bytes| decode_counter(&bytes))
            .ok_or_else(|| SyncError::Allocation(format!("计数器丢失: id={}", id)))
    }

    /// 原子读改写连接水位；`change` 返回 `None` 表示保持不变
    fn update_watermark<F>(&self, key: ConnectionKey, mut change: F) -> Result<()>
    where
        F: FnMut(Option<ConnectionWatermark>) -> Option<ConnectionWatermark>,
    {
        let mut failure: Option<SyncError> = None;
        self.connection_state.update_and_fetch(key.to_be_bytes(), |old| {
            failure = None;
            let current = old.and_then(|bytes| bincode::deserialize::<ConnectionWatermark>(bytes).ok());
            match change(current) {
                Some(next) => match bincode::serialize(&next) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        failure = Some(e.into());
                        old.map(|bytes| bytes.to_vec())
                    }
                },
                None => old.map(|bytes| bytes.to_vec()),
            }
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn read(tree: &Tree, id: u64) -> Result<u64> {
        let value = tree
            .get(id.to_be_bytes())
            .map_err(|e| SyncError::Allocation(format!("读取计数器失败: {}", e)))?;
        Ok(value.map(|bytes| decode_counter(&bytes)).unwrap_or(0))
    }
}

fn decode_counter(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[8 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    u64::from_be_bytes(buf)
}

#[async_trait]
impl Sequencer for SledSequencer {
    async fn next_pts(&self, user_id: UserId) -> Result<u64> {
        let pts = Self::advance(&self.user_pts, user_id).map_err(|e| {
            error!("分配用户 pts 失败: user_id={}, error={}", user_id, e);
            e
        })?;
        debug!("分配用户 pts: user_id={}, pts={}", user_id, pts);
        Ok(pts)
    }

    async fn next_channel_pts(&self, channel_id: ChannelId) -> Result<u64> {
        let pts = Self::advance(&self.channel_pts, channel_id).map_err(|e| {
            error!("分配频道 pts 失败: channel_id={}, error={}", channel_id, e);
            e
        })?;
        debug!("分配频道 pts: channel_id={}, pts={}", channel_id, pts);
        Ok(pts)
    }

    async fn next_seq(&self, user_id: UserId) -> Result<u64> {
        Self::advance(&self.user_seq, user_id)
    }

    async fn current_state(&self, user_id: UserId) -> Result<SequenceState> {
        Ok(SequenceState {
            pts: Self::read(&self.user_pts, user_id)?,
            qts: Self::read(&self.user_qts, user_id)?,
            seq: Self::read(&self.user_seq, user_id)?,
        })
    }

    async fn current_channel_pts(&self, channel_id: ChannelId) -> Result<u64> {
        Self::read(&self.channel_pts, channel_id)
    }

    async fn set_connection_watermark(&self, key: ConnectionKey, pts: u64, qts: u64) -> Result<()> {
        let watermark = ConnectionWatermark {
            pts,
            qts,
            updated_at: chrono::Utc::now().timestamp(),
            stalled: false,
        };
        let bytes = bincode::serialize(&watermark)?;
        self.connection_state.insert(key.to_be_bytes(), bytes)?;
        debug!("更新连接水位: connection_key={}, pts={}, qts={}", key, pts, qts);
        Ok(())
    }

    async fn advance_connection_watermark(&self, key: ConnectionKey, pts: u64, qts: u64) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let mut advanced = false;
        self.update_watermark(key, |current| {
            advanced = false;
            match current {
                Some(watermark) if watermark.stalled || watermark.pts >= pts => None,
                _ => {
                    advanced = true;
                    Some(ConnectionWatermark {
                        pts,
                        qts,
                        updated_at: now,
                        stalled: false,
                    })
                }
            }
        })?;
        if advanced {
            debug!("推进连接水位: connection_key={}, pts={}", key, pts);
        }
        Ok(advanced)
    }

    async fn stall_connection_watermark(&self, key: ConnectionKey, floor: u64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.update_watermark(key, |current| {
            let watermark = current.unwrap_or_default();
            Some(ConnectionWatermark {
                pts: watermark.pts.min(floor),
                qts: watermark.qts,
                updated_at: now,
                stalled: true,
            })
        })?;
        warn!("连接水位暂停推进: connection_key={}, floor={}", key, floor);
        Ok(())
    }

    async fn get_connection_watermark(&self, key: ConnectionKey) -> Result<Option<ConnectionWatermark>> {
        match self.connection_state.get(key.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn temp_sequencer() -> SledSequencer {
        let storage = Storage::open(&SyncConfig::builder().temporary(true).build())
            .await
            .unwrap();
        SledSequencer::new(&storage).unwrap()
    }

    #[tokio::test]
    async fn test_next_pts_monotonic() {
        let seq = temp_sequencer().await;
        assert_eq!(seq.next_pts(1).await.unwrap(), 1);
        assert_eq!(seq.next_pts(1).await.unwrap(), 2);
        assert_eq!(seq.next_pts(2).await.unwrap(), 1);
        assert_eq!(seq.current_state(1).await.unwrap().pts, 2);
    }

    #[tokio::test]
    async fn test_channel_space_independent() {
        let seq = temp_sequencer().await;
        seq.next_pts(5).await.unwrap();
        seq.next_pts(5).await.unwrap();
        assert_eq!(seq.next_channel_pts(5).await.unwrap(), 1);
        assert_eq!(seq.current_channel_pts(5).await.unwrap(), 1);
        assert_eq!(seq.current_channel_pts(6).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_no_gaps_no_duplicates() {
        let seq = Arc::new(temp_sequencer().await);
        for _ in 0..7 {
            seq.next_pts(42).await.unwrap();
        }
        let prior = seq.current_state(42).await.unwrap().pts;

        let mut handles = Vec::new();
        for _ in 0..200 {
            let seq = seq.clone();
            handles.push(tokio::spawn(async move { seq.next_pts(42).await.unwrap() }));
        }
        let mut values = HashSet::new();
        for handle in handles {
            assert!(values.insert(handle.await.unwrap()));
        }

        let expected: HashSet<u64> = (prior + 1..=prior + 200).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_connection_watermark() {
        let seq = temp_sequencer().await;
        assert_eq!(seq.get_connection_watermark(77).await.unwrap(), None);
        seq.set_connection_watermark(77, 10, 2).await.unwrap();
        let watermark = seq.get_connection_watermark(77).await.unwrap().unwrap();
        assert_eq!((watermark.pts, watermark.qts), (10, 2));
    }

    #[tokio::test]
    async fn test_advance_only_moves_forward() {
        let seq = temp_sequencer().await;
        assert!(seq.advance_connection_watermark(7, 4, 0).await.unwrap());
        assert!(!seq.advance_connection_watermark(7, 3, 0).await.unwrap());
        assert!(seq.advance_connection_watermark(7, 6, 0).await.unwrap());
        assert_eq!(seq.get_connection_watermark(7).await.unwrap().unwrap().pts, 6);
    }

    #[tokio::test]
    async fn test_stall_holds_watermark_until_set() {
        let seq = temp_sequencer().await;
        seq.advance_connection_watermark(8, 5, 0).await.unwrap();
        seq.stall_connection_watermark(8, 3).await.unwrap();

        // 之后的送达不能越过丢失的记录
        assert!(!seq.advance_connection_watermark(8, 9, 0).await.unwrap());
        let watermark = seq.get_connection_watermark(8).await.unwrap().unwrap();
        assert_eq!((watermark.pts, watermark.stalled), (3, true));

        seq.set_connection_watermark(8, 9, 0).await.unwrap();
        assert!(seq.advance_connection_watermark(8, 10, 0).await.unwrap());
        assert!(!seq.get_connection_watermark(8).await.unwrap().unwrap().stalled);
    }

    #[tokio::test]
    async fn test_stall_unknown_connection_starts_from_zero() {
        let seq = temp_sequencer().await;
        seq.stall_connection_watermark(9, 4).await.unwrap();
        let watermark = seq.get_connection_watermark(9).await.unwrap().unwrap();
        assert_eq!((watermark.pts, watermark.stalled), (0, true));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::builder().data_dir(dir.path().join("db")).build();
        {
            let storage = Storage::open(&config).await.unwrap();
            let seq = SledSequencer::new(&storage).unwrap();
            for _ in 0..3 {
                seq.next_pts(1).await.unwrap();
            }
            storage.flush().await.unwrap();
        }
        let storage = Storage::open(&config).await.unwrap();
        let seq = SledSequencer::new(&storage).unwrap();
        assert_eq!(seq.next_pts(1).await.unwrap(), 4);
    }

    #[test]
    fn test_decode_counter() {
        assert_eq!(decode_counter(&7u64.to_be_bytes()), 7);
        assert_eq!(decode_counter(&[1, 0]), 256);
    }
}
