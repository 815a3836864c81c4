//! 业务处理器
//!
//! 展示业务 RPC 如何调用同步服务。消息、会话、群组的存储由调用方
//! 通过下面的 trait 注入。

pub mod messages;

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatId, ConnectionKey, MessageId, Peer, SessionId, ShardId, UserId};

pub use messages::MessagesHandler;

/// 一次业务 RPC 的调用方信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcMetadata {
    pub shard_id: ShardId,
    pub connection_key: ConnectionKey,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub client_msg_id: u64,
}

/// 消息存储
#[async_trait]
pub trait MessageStore: Debug + Send + Sync {
    /// 删除用户信箱里的消息
    async fn delete_by_message_id_list(&self, user_id: UserId, ids: &[MessageId]) -> Result<()>;

    /// 查询这些消息在对端信箱里的副本，按副本所属用户分组
    async fn get_peer_dialog_message_id_list(
        &self,
        user_id: UserId,
        ids: &[MessageId],
    ) -> Result<HashMap<UserId, Vec<MessageId>>>;
}

/// 会话（对话列表）存储
#[async_trait]
pub trait DialogStore: Debug + Send + Sync {
    /// 清零未读数并记录 read_inbox_max_id
    async fn update_unread_by_peer(&self, user_id: UserId, peer: Peer, max_id: MessageId) -> Result<()>;

    async fn get_top_message(&self, user_id: UserId, peer: Peer) -> Result<MessageId>;

    async fn update_read_outbox_max_id_by_peer(
        &self,
        user_id: UserId,
        peer: Peer,
        max_id: MessageId,
    ) -> Result<()>;
}

/// 群组成员
#[async_trait]
pub trait ChatStore: Debug + Send + Sync {
    async fn participants(&self, chat_id: ChatId) -> Result<Vec<UserId>>;
}
