//! messages.* 处理器：删除消息、标记已读

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Result, SyncError};
use crate::handlers::{ChatStore, DialogStore, MessageStore, RpcMetadata};
use crate::service::SyncService;
use crate::types::{AffectedHistory, AffectedMessages, InputPeer, MessageId, Peer, Update, UserId};

#[derive(Debug, Clone)]
pub struct MessagesHandler {
    sync: Arc<SyncService>,
    messages: Arc<dyn MessageStore>,
    dialogs: Arc<dyn DialogStore>,
    chats: Arc<dyn ChatStore>,
}

impl MessagesHandler {
    pub fn new(
        sync: Arc<SyncService>,
        messages: Arc<dyn MessageStore>,
        dialogs: Arc<dyn DialogStore>,
        chats: Arc<dyn ChatStore>,
    ) -> Self {
        Self {
            sync,
            messages,
            dialogs,
            chats,
        }
    }

    /// messages.deleteMessages
    ///
    /// `revoke` 为真时同时撤回对端信箱里的副本。
    pub async fn delete_messages(
        &self,
        md: &RpcMetadata,
        ids: Vec<MessageId>,
        revoke: bool,
    ) -> Result<AffectedMessages> {
        info!(
            "messages.deleteMessages - metadata: {:?}, ids={:?}, revoke={}",
            md, ids, revoke
        );

        let update = Update::DeleteMessages {
            messages: ids.clone(),
            pts: 0,
            pts_count: 0,
        };
        let state = self
            .sync
            .sync_one_update(md.user_id, md.connection_key, md.session_id, update)
            .await?;
        let affected = AffectedMessages {
            pts: state.pts,
            pts_count: state.pts_count,
        };

        if revoke {
            let copies = self.messages.get_peer_dialog_message_id_list(md.user_id, &ids).await?;
            for (peer_user_id, peer_ids) in copies {
                let update = Update::DeleteMessages {
                    messages: peer_ids.clone(),
                    pts: 0,
                    pts_count: 0,
                };
                if let Err(e) = self.sync.push_one_update(peer_user_id, update).await {
                    warn!("撤回推送失败: peer_user_id={}, error={}", peer_user_id, e);
                }
                self.messages.delete_by_message_id_list(peer_user_id, &peer_ids).await?;
            }
        }
        self.messages.delete_by_message_id_list(md.user_id, &ids).await?;

        info!("messages.deleteMessages - reply: {:?}", affected);
        Ok(affected)
    }

    /// messages.readHistory
    ///
    /// 结果已经通过推送带回发起连接，成功时返回 `SyncError::SuppressedReply`，
    /// 接入层不应再回复客户端。
    pub async fn read_history(
        &self,
        md: &RpcMetadata,
        peer: InputPeer,
        max_id: MessageId,
    ) -> Result<AffectedHistory> {
        info!(
            "messages.readHistory - metadata: {:?}, peer={:?}, max_id={}",
            md, peer, max_id
        );

        let peer = peer.resolve(md.user_id);
        if let Peer::Channel(channel_id) = peer {
            return Err(SyncError::Validation(format!(
                "频道不支持 messages.readHistory: channel_id={}",
                channel_id
            )));
        }

        // inbox
        self.dialogs.update_unread_by_peer(md.user_id, peer, max_id).await?;
        let inbox = Update::ReadHistoryInbox {
            peer,
            max_id,
            pts: 0,
            pts_count: 0,
        };
        self.sync
            .sync_one_update_with_echo(
                md.shard_id,
                md.connection_key,
                md.session_id,
                md.user_id,
                md.client_msg_id,
                inbox,
            )
            .await?;

        // outbox
        match peer {
            Peer::User(peer_user_id) => {
                let reader = Peer::User(md.user_id);
                self.push_read_outbox(peer_user_id, reader).await?;
            }
            Peer::Chat(chat_id) => {
                for participant in self.chats.participants(chat_id).await? {
                    if participant == md.user_id {
                        continue;
                    }
                    self.push_read_outbox(participant, Peer::Chat(chat_id)).await?;
                }
            }
            Peer::Channel(_) => {}
        }

        info!("messages.readHistory - reply: suppressed");
        Err(SyncError::SuppressedReply)
    }

    async fn push_read_outbox(&self, owner: UserId, peer: Peer) -> Result<()> {
        let top_message = self.dialogs.get_top_message(owner, peer).await?;
        self.dialogs
            .update_read_outbox_max_id_by_peer(owner, peer, top_message)
            .await?;

        let outbox = Update::ReadHistoryOutbox {
            peer,
            max_id: top_message,
            pts: 0,
            pts_count: 0,
        };
        if let Err(e) = self.sync.push_one_update(owner, outbox).await {
            warn!("推送 readHistoryOutbox 失败: user_id={}, error={}", owner, e);
        }
        Ok(())
    }
}
