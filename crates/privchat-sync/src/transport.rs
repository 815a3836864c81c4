//! Shard 投递通道

use std::collections::HashSet;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{Result, SyncError};
use crate::types::{ClientUpdatesState, ConnectionKey, SessionId, ShardId};

/// 推送信封，每次分发创建，发送后丢弃
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEnvelope {
    pub connection_key: ConnectionKey,
    pub session_id: SessionId,
    pub state: ClientUpdatesState,
    pub payload: Bytes,
}

#[async_trait]
pub trait ShardTransport: Debug + Send + Sync {
    /// 把信封交给编号为 `shard_id` 的 shard
    async fn send_to_shard(&self, shard_id: ShardId, envelope: PushEnvelope) -> Result<()>;
}

/// 进程内记录型投递通道（测试与演示）
///
/// 可以让某些 shard 固定失败，也可以关闭闸门让投递挂起。
#[derive(Debug)]
pub struct InMemoryShardTransport {
    delivered: Mutex<Vec<(ShardId, PushEnvelope)>>,
    failing_shards: Mutex<HashSet<ShardId>>,
    gate: watch::Sender<bool>,
}

impl Default for InMemoryShardTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryShardTransport {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            delivered: Mutex::new(Vec::new()),
            failing_shards: Mutex::new(HashSet::new()),
            gate,
        }
    }

    pub fn fail_shard(&self, shard_id: ShardId) {
        self.failing_shards.lock().insert(shard_id);
    }

    /// 关闭闸门，之后的投递会挂起直到 `open`
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    pub fn delivered(&self) -> Vec<(ShardId, PushEnvelope)> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl ShardTransport for InMemoryShardTransport {
    async fn send_to_shard(&self, shard_id: ShardId, envelope: PushEnvelope) -> Result<()> {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| SyncError::Delivery("transport closed".to_string()))?;

        if self.failing_shards.lock().contains(&shard_id) {
            return Err(SyncError::Delivery(format!("shard {} unreachable", shard_id)));
        }
        self.delivered.lock().push((shard_id, envelope));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn envelope(connection_key: ConnectionKey) -> PushEnvelope {
        PushEnvelope {
            connection_key,
            session_id: 1,
            state: ClientUpdatesState::default(),
            payload: Bytes::from_static(b"payload"),
        }
    }

    #[tokio::test]
    async fn test_records_and_fails() {
        let transport = InMemoryShardTransport::new();
        transport.fail_shard(2);
        transport.send_to_shard(1, envelope(10)).await.unwrap();
        assert!(matches!(
            transport.send_to_shard(2, envelope(20)).await,
            Err(SyncError::Delivery(_))
        ));
        assert_eq!(transport.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_hold_blocks_until_open() {
        let transport = std::sync::Arc::new(InMemoryShardTransport::new());
        transport.hold();
        let t = transport.clone();
        let pending = tokio::spawn(async move { t.send_to_shard(1, envelope(10)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(transport.delivered().is_empty());
        transport.open();
        pending.await.unwrap().unwrap();
        assert_eq!(transport.delivered().len(), 1);
    }
}
