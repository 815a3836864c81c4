//! 同步核心的领域类型
//!
//! 更新形状使用带标签的枚举表示：紧凑单聊消息、紧凑群聊消息、
//! 仅带日期的 short 更新、以及包含若干子更新的批量更新。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type ChatId = u64;
pub type ChannelId = u64;
pub type MessageId = u64;
/// 连接标识（一个 auth key 对应一个客户端连接）
pub type ConnectionKey = u64;
pub type SessionId = u64;
pub type ShardId = u32;

/// 会话对端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Peer {
    User(UserId),
    Chat(ChatId),
    Channel(ChannelId),
}

impl Peer {
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Peer::Channel(id) => Some(*id),
            _ => None,
        }
    }
}

/// 客户端请求里的对端（可能是"自己"）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputPeer {
    SelfPeer,
    User(UserId),
    Chat(ChatId),
    Channel(ChannelId),
}

impl InputPeer {
    /// 解析成真实对端，`SelfPeer` 映射为当前用户
    pub fn resolve(self, self_user_id: UserId) -> Peer {
        match self {
            InputPeer::SelfPeer => Peer::User(self_user_id),
            InputPeer::User(id) => Peer::User(id),
            InputPeer::Chat(id) => Peer::Chat(id),
            InputPeer::Channel(id) => Peer::Channel(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    pub entity_type: String,
    pub offset: u32,
    pub length: u32,
}

/// 转发信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FwdHeader {
    pub from_id: Option<UserId>,
    pub date: i64,
    pub channel_id: Option<ChannelId>,
    pub channel_post: Option<MessageId>,
}

/// 规范形式的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub out: bool,
    pub mentioned: bool,
    pub media_unread: bool,
    pub silent: bool,
    pub from_id: UserId,
    pub to_id: Peer,
    pub message: String,
    pub date: i64,
    pub fwd_from: Option<FwdHeader>,
    pub via_bot_id: Option<UserId>,
    pub reply_to_msg_id: Option<MessageId>,
    pub entities: Vec<MessageEntity>,
}

/// 紧凑单聊消息，`user_id` 是对方用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateShortMessage {
    pub out: bool,
    pub mentioned: bool,
    pub media_unread: bool,
    pub silent: bool,
    pub id: MessageId,
    pub user_id: UserId,
    pub message: String,
    pub pts: u64,
    pub pts_count: u64,
    pub date: i64,
    pub fwd_from: Option<FwdHeader>,
    pub via_bot_id: Option<UserId>,
    pub reply_to_msg_id: Option<MessageId>,
    pub entities: Vec<MessageEntity>,
}

/// 紧凑群聊消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateShortChatMessage {
    pub out: bool,
    pub mentioned: bool,
    pub media_unread: bool,
    pub silent: bool,
    pub id: MessageId,
    pub from_id: UserId,
    pub chat_id: ChatId,
    pub message: String,
    pub pts: u64,
    pub pts_count: u64,
    pub date: i64,
    pub fwd_from: Option<FwdHeader>,
    pub via_bot_id: Option<UserId>,
    pub reply_to_msg_id: Option<MessageId>,
    pub entities: Vec<MessageEntity>,
}

/// 仅带日期、不影响序号的 short 更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateShort {
    pub update: Update,
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebPage {
    pub id: u64,
    pub url: String,
    pub title: Option<String>,
}

/// 单条更新
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Update {
    NewMessage {
        message: Message,
        pts: u64,
        pts_count: u64,
    },
    EditMessage {
        message: Message,
        pts: u64,
        pts_count: u64,
    },
    DeleteMessages {
        messages: Vec<MessageId>,
        pts: u64,
        pts_count: u64,
    },
    ReadHistoryInbox {
        peer: Peer,
        max_id: MessageId,
        pts: u64,
        pts_count: u64,
    },
    ReadHistoryOutbox {
        peer: Peer,
        max_id: MessageId,
        pts: u64,
        pts_count: u64,
    },
    ReadMessagesContents {
        messages: Vec<MessageId>,
        pts: u64,
        pts_count: u64,
    },
    WebPage {
        webpage: WebPage,
        pts: u64,
        pts_count: u64,
    },
    NewChannelMessage {
        message: Message,
        pts: u64,
        pts_count: u64,
    },
    UserTyping {
        user_id: UserId,
        action: String,
    },
    UserStatus {
        user_id: UserId,
        online: bool,
        expires: i64,
    },
}

/// 子更新占用哪个序号空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceClass {
    /// 用户空间，占用的序号个数
    User(u64),
    /// 频道空间（仅在回声抑制广播时分配）
    Channel(ChannelId),
    /// 不带序号
    None,
}

impl Update {
    pub fn name(&self) -> &'static str {
        match self {
            Update::NewMessage { .. } => "updateNewMessage",
            Update::EditMessage { .. } => "updateEditMessage",
            Update::DeleteMessages { .. } => "updateDeleteMessages",
            Update::ReadHistoryInbox { .. } => "updateReadHistoryInbox",
            Update::ReadHistoryOutbox { .. } => "updateReadHistoryOutbox",
            Update::ReadMessagesContents { .. } => "updateReadMessagesContents",
            Update::WebPage { .. } => "updateWebPage",
            Update::NewChannelMessage { .. } => "updateNewChannelMessage",
            Update::UserTyping { .. } => "updateUserTyping",
            Update::UserStatus { .. } => "updateUserStatus",
        }
    }

    /// 序号归属；频道消息的目标不是频道时返回 `None`，由校验拦截
    pub fn sequence_class(&self) -> SequenceClass {
        match self {
            Update::NewMessage { .. }
            | Update::EditMessage { .. }
            | Update::ReadHistoryInbox { .. }
            | Update::ReadHistoryOutbox { .. }
            | Update::ReadMessagesContents { .. }
            | Update::WebPage { .. } => SequenceClass::User(1),
            Update::DeleteMessages { messages, .. } => SequenceClass::User(messages.len() as u64),
            Update::NewChannelMessage { message, .. } => match message.to_id.channel_id() {
                Some(channel_id) => SequenceClass::Channel(channel_id),
                None => SequenceClass::None,
            },
            Update::UserTyping { .. } | Update::UserStatus { .. } => SequenceClass::None,
        }
    }

    /// 当前携带的 (pts, pts_count)
    pub fn pts(&self) -> Option<(u64, u64)> {
        match self {
            Update::NewMessage { pts, pts_count, .. }
            | Update::EditMessage { pts, pts_count, .. }
            | Update::DeleteMessages { pts, pts_count, .. }
            | Update::ReadHistoryInbox { pts, pts_count, .. }
            | Update::ReadHistoryOutbox { pts, pts_count, .. }
            | Update::ReadMessagesContents { pts, pts_count, .. }
            | Update::WebPage { pts, pts_count, .. }
            | Update::NewChannelMessage { pts, pts_count, .. } => Some((*pts, *pts_count)),
            Update::UserTyping { .. } | Update::UserStatus { .. } => None,
        }
    }

    /// 写入序号；不带序号的更新忽略
    pub fn stamp(&mut self, new_pts: u64, new_pts_count: u64) {
        match self {
            Update::NewMessage { pts, pts_count, .. }
            | Update::EditMessage { pts, pts_count, .. }
            | Update::DeleteMessages { pts, pts_count, .. }
            | Update::ReadHistoryInbox { pts, pts_count, .. }
            | Update::ReadHistoryOutbox { pts, pts_count, .. }
            | Update::ReadMessagesContents { pts, pts_count, .. }
            | Update::WebPage { pts, pts_count, .. }
            | Update::NewChannelMessage { pts, pts_count, .. } => {
                *pts = new_pts;
                *pts_count = new_pts_count;
            }
            Update::UserTyping { .. } | Update::UserStatus { .. } => {}
        }
    }
}

/// 批量更新（也用作补齐查询的返回）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatesBatch {
    pub updates: Vec<Update>,
    pub users: Vec<UserId>,
    pub chats: Vec<ChatId>,
    pub date: i64,
    pub seq: u64,
}

impl UpdatesBatch {
    pub fn single(update: Update) -> Self {
        Self {
            updates: vec![update],
            ..Default::default()
        }
    }
}

/// 更新形状
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Updates {
    ShortMessage(UpdateShortMessage),
    ShortChatMessage(UpdateShortChatMessage),
    Short(UpdateShort),
    Combined(UpdatesBatch),
    /// 客户端需要自行全量拉取；同步核心不接受这种形状
    TooLong,
}

impl Updates {
    pub fn name(&self) -> &'static str {
        match self {
            Updates::ShortMessage(_) => "updateShortMessage",
            Updates::ShortChatMessage(_) => "updateShortChatMessage",
            Updates::Short(_) => "updateShort",
            Updates::Combined(_) => "updates",
            Updates::TooLong => "updatesTooLong",
        }
    }
}

/// 分发策略，每次调用互斥
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushType {
    /// 只回给发起连接（带 pts 的 RPC 结果）
    RpcResult,
    /// 广播给用户所有在线会话
    User,
    /// 广播给除发起连接外的所有会话
    UserNotMe,
    /// 语义未定义，不投递
    UserMe,
}

/// 发起请求的连接
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub shard_id: ShardId,
    pub connection_key: ConnectionKey,
    pub session_id: SessionId,
    pub client_msg_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedMessages {
    pub pts: u64,
    pub pts_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedHistory {
    pub pts: u64,
    pub pts_count: u64,
    pub offset: u32,
}

/// RPC 结果内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResultData {
    AffectedMessages(AffectedMessages),
    AffectedHistory(AffectedHistory),
    Updates(Updates),
}

impl RpcResultData {
    /// 按更新类型推导客户端期待的返回
    pub fn for_update(update: &Update) -> Self {
        match update {
            Update::ReadHistoryInbox { .. } | Update::ReadHistoryOutbox { .. } => {
                RpcResultData::AffectedHistory(AffectedHistory::default())
            }
            Update::DeleteMessages { .. } | Update::ReadMessagesContents { .. } => {
                RpcResultData::AffectedMessages(AffectedMessages::default())
            }
            other => RpcResultData::Updates(Updates::Combined(UpdatesBatch::single(other.clone()))),
        }
    }
}

/// 推给发起连接的 RPC 结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResult {
    pub req_msg_id: u64,
    pub result: RpcResultData,
}

/// 同步请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatesRequest {
    pub push_type: PushType,
    pub push_user_id: UserId,
    pub origin: Origin,
    pub updates: Updates,
    pub rpc_result: Option<RpcResultData>,
}

impl UpdatesRequest {
    pub fn new(push_type: PushType, push_user_id: UserId, origin: Origin, updates: Updates) -> Self {
        Self {
            push_type,
            push_user_id,
            origin,
            updates,
            rpc_result: None,
        }
    }

    pub fn with_rpc_result(mut self, rpc_result: RpcResultData) -> Self {
        self.rpc_result = Some(rpc_result);
        self
    }
}

/// 同步结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdatesState {
    /// 用户空间最终 pts，0 表示本次没有占用用户序号
    pub pts: u64,
    /// 本次所有子更新占用序号之和
    pub pts_count: u64,
    pub qts: u64,
    pub date: i64,
    pub seq: u64,
    /// 每个涉及频道的最终 pts
    pub channel_pts: BTreeMap<ChannelId, u64>,
}

/// `GetState` 返回的快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatesState {
    pub pts: u64,
    pub qts: u64,
    pub date: i64,
    pub seq: u64,
}

/// 序号空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    User(UserId),
    Channel(ChannelId),
}

/// 更新日志记录，写入后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub scope: Scope,
    pub pts: u64,
    pub pts_count: u64,
    pub update: Update,
    pub created_at: i64,
}
