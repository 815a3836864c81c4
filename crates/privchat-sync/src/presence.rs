//! 在线会话目录
//!
//! 同步核心不拥有会话信息，只通过 `PresenceDirectory` 查询某个用户
//! 当前在线的会话（每个会话属于一个 shard）。

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::types::{ConnectionKey, SessionId, ShardId, UserId};

/// 在线会话
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionEntry {
    pub shard_id: ShardId,
    pub connection_key: ConnectionKey,
    pub session_id: SessionId,
    pub user_id: UserId,
}

#[async_trait]
pub trait PresenceDirectory: Debug + Send + Sync {
    async fn get_user_online_sessions(&self, user_id: UserId) -> Result<Vec<SessionEntry>>;
}

/// 进程内的会话目录
#[derive(Debug, Default)]
pub struct InMemoryPresence {
    sessions: RwLock<HashMap<UserId, Vec<SessionEntry>>>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记会话；同一连接重复登记时覆盖
    pub async fn add_session(&self, entry: SessionEntry) {
        let mut sessions = self.sessions.write().await;
        let list = sessions.entry(entry.user_id).or_default();
        list.retain(|s| s.connection_key != entry.connection_key);
        list.push(entry);
        debug!(
            "登记在线会话: user_id={}, connection_key={}, shard_id={}",
            entry.user_id, entry.connection_key, entry.shard_id
        );
    }

    pub async fn remove_session(&self, user_id: UserId, connection_key: ConnectionKey) {
        let mut sessions = self.sessions.write().await;
        if let Some(list) = sessions.get_mut(&user_id) {
            list.retain(|s| s.connection_key != connection_key);
            if list.is_empty() {
                sessions.remove(&user_id);
            }
        }
    }
}

#[async_trait]
impl PresenceDirectory for InMemoryPresence {
    async fn get_user_online_sessions(&self, user_id: UserId) -> Result<Vec<SessionEntry>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(connection_key: ConnectionKey, shard_id: ShardId) -> SessionEntry {
        SessionEntry { shard_id, connection_key, session_id: connection_key * 10, user_id: 1 }
    }

    #[tokio::test]
    async fn test_add_and_remove_sessions() {
        let presence = InMemoryPresence::new();
        presence.add_session(entry(100, 1)).await;
        presence.add_session(entry(200, 2)).await;
        presence.add_session(entry(100, 3)).await;

        let sessions = presence.get_user_online_sessions(1).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.contains(&entry(100, 3)));

        presence.remove_session(1, 100).await;
        presence.remove_session(1, 200).await;
        assert!(presence.get_user_online_sessions(1).await.unwrap().is_empty());
        assert!(presence.get_user_online_sessions(2).await.unwrap().is_empty());
    }
}
