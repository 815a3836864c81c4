//! 更新规范化
//!
//! 把紧凑形状展开成规范更新，分配序号并写入更新日志。一次请求的
//! 校验、分配、追加是一个原子单元：
//!
//! 1. 整体校验，失败时不分配任何序号
//! 2. 锁住涉及的序号空间（用户在前，频道按 id 升序）
//! 3. 分配全部序号，在内存副本上打戳
//! 4. 一个 sled batch 追加全部记录，之后才释放锁
//!
//! 分配中途失败时什么都不追加，已消耗的序号成为间隙。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Result, SyncError};
use crate::storage::Storage;
use crate::sync::locks::ScopeLocks;
use crate::sync::sequencer::Sequencer;
use crate::sync::update_log::UpdateLog;
use crate::types::{
    ClientUpdatesState, Message, Peer, PushType, Scope, SequenceClass, Update, UpdateRecord,
    UpdateShortChatMessage, UpdateShortMessage, Updates, UpdatesBatch, UpdatesRequest, UserId,
};

/// 紧凑单聊消息展开为规范消息
///
/// `user_id` 是解析方（当前推送用户），用于判断方向：
/// 发出的消息 from 为自己、to 为对方，收到的消息相反。
pub fn short_message_to_message(user_id: UserId, short: &UpdateShortMessage) -> Message {
    let (from_id, peer_id) = if short.out {
        (user_id, short.user_id)
    } else {
        (short.user_id, user_id)
    };

    Message {
        id: short.id,
        out: short.out,
        mentioned: short.mentioned,
        media_unread: short.media_unread,
        silent: short.silent,
        from_id,
        to_id: Peer::User(peer_id),
        message: short.message.clone(),
        date: short.date,
        fwd_from: short.fwd_from.clone(),
        via_bot_id: short.via_bot_id,
        reply_to_msg_id: short.reply_to_msg_id,
        entities: short.entities.clone(),
    }
}

/// 紧凑群聊消息展开为规范消息
pub fn short_chat_message_to_message(short: &UpdateShortChatMessage) -> Message {
    Message {
        id: short.id,
        out: short.out,
        mentioned: short.mentioned,
        media_unread: short.media_unread,
        silent: short.silent,
        from_id: short.from_id,
        to_id: Peer::Chat(short.chat_id),
        message: short.message.clone(),
        date: short.date,
        fwd_from: short.fwd_from.clone(),
        via_bot_id: short.via_bot_id,
        reply_to_msg_id: short.reply_to_msg_id,
        entities: short.entities.clone(),
    }
}

pub fn short_to_update_new_message(user_id: UserId, short: &UpdateShortMessage) -> Update {
    Update::NewMessage {
        message: short_message_to_message(user_id, short),
        pts: short.pts,
        pts_count: short.pts_count,
    }
}

pub fn short_chat_to_update_new_message(short: &UpdateShortChatMessage) -> Update {
    Update::NewMessage {
        message: short_chat_message_to_message(short),
        pts: short.pts,
        pts_count: short.pts_count,
    }
}

/// 规范单聊消息压缩回紧凑形式（`short_message_to_message` 的逆运算）
///
/// 消息不属于 `user_id` 的单聊时返回 `None`。
pub fn message_to_short_message(user_id: UserId, message: &Message) -> Option<UpdateShortMessage> {
    let peer_id = match message.to_id {
        Peer::User(id) => id,
        _ => return None,
    };
    let other = if message.out {
        if message.from_id != user_id {
            return None;
        }
        peer_id
    } else {
        if peer_id != user_id {
            return None;
        }
        message.from_id
    };

    Some(UpdateShortMessage {
        out: message.out,
        mentioned: message.mentioned,
        media_unread: message.media_unread,
        silent: message.silent,
        id: message.id,
        user_id: other,
        message: message.message.clone(),
        pts: 0,
        pts_count: 0,
        date: message.date,
        fwd_from: message.fwd_from.clone(),
        via_bot_id: message.via_bot_id,
        reply_to_msg_id: message.reply_to_msg_id,
        entities: message.entities.clone(),
    })
}

/// 规范群聊消息压缩回紧凑形式
pub fn message_to_short_chat_message(message: &Message) -> Option<UpdateShortChatMessage> {
    let chat_id = match message.to_id {
        Peer::Chat(id) => id,
        _ => return None,
    };

    Some(UpdateShortChatMessage {
        out: message.out,
        mentioned: message.mentioned,
        media_unread: message.media_unread,
        silent: message.silent,
        id: message.id,
        from_id: message.from_id,
        chat_id,
        message: message.message.clone(),
        pts: 0,
        pts_count: 0,
        date: message.date,
        fwd_from: message.fwd_from.clone(),
        via_bot_id: message.via_bot_id,
        reply_to_msg_id: message.reply_to_msg_id,
        entities: message.entities.clone(),
    })
}

/// 整体校验请求（分配之前）
pub fn validate(request: &UpdatesRequest) -> Result<()> {
    match &request.updates {
        Updates::TooLong => Err(SyncError::Validation(format!(
            "invalid updates data: {}",
            request.updates.name()
        ))),
        Updates::Combined(batch) => {
            for update in &batch.updates {
                match update {
                    Update::DeleteMessages { messages, .. } if messages.is_empty() => {
                        return Err(SyncError::Validation(
                            "updateDeleteMessages 的 id 列表为空".to_string(),
                        ));
                    }
                    Update::NewChannelMessage { message, .. }
                        if request.push_type == PushType::UserNotMe
                            && message.to_id.channel_id().is_none() =>
                    {
                        return Err(SyncError::Validation(format!(
                            "updateNewChannelMessage 的目标不是频道: {:?}",
                            message.to_id
                        )));
                    }
                    _ => {}
                }
            }
            Ok(())
        }
        Updates::ShortMessage(_) | Updates::ShortChatMessage(_) | Updates::Short(_) => Ok(()),
    }
}

/// 规范化结果：同步状态 + 打过戳的更新
#[derive(Debug, Clone)]
pub struct Normalized {
    pub state: ClientUpdatesState,
    pub updates: Updates,
}

#[derive(Debug)]
pub struct UpdateNormalizer {
    sequencer: Arc<dyn Sequencer>,
    log: UpdateLog,
    locks: Arc<ScopeLocks>,
    clock: Arc<dyn Clock>,
    /// 设置后每次追加都刷盘
    flush_storage: Option<Storage>,
}

impl UpdateNormalizer {
    pub fn new(
        sequencer: Arc<dyn Sequencer>,
        log: UpdateLog,
        locks: Arc<ScopeLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sequencer,
            log,
            locks,
            clock,
            flush_storage: None,
        }
    }

    pub fn with_flush(mut self, storage: Storage) -> Self {
        self.flush_storage = Some(storage);
        self
    }

    /// 处理一次同步请求
    pub async fn process(&self, request: &UpdatesRequest) -> Result<Normalized> {
        validate(request)?;

        let user_id = request.push_user_id;
        let date = self.clock.now();
        let mut updates = request.updates.clone();
        let mut state = ClientUpdatesState {
            date,
            ..Default::default()
        };

        match &mut updates {
            Updates::ShortMessage(short) => {
                let _guard = self.locks.lock(Scope::User(user_id)).await;
                let pts = self.sequencer.next_pts(user_id).await?;
                short.pts = pts;
                short.pts_count = 1;
                let record = UpdateRecord {
                    scope: Scope::User(user_id),
                    pts,
                    pts_count: 1,
                    update: short_to_update_new_message(user_id, short),
                    created_at: date,
                };
                state.qts = self.sequencer.current_state(user_id).await?.qts;
                self.commit(vec![record]).await?;
                state.pts = pts;
                state.pts_count = 1;
            }
            Updates::ShortChatMessage(short) => {
                let _guard = self.locks.lock(Scope::User(user_id)).await;
                let pts = self.sequencer.next_pts(user_id).await?;
                short.pts = pts;
                short.pts_count = 1;
                let record = UpdateRecord {
                    scope: Scope::User(user_id),
                    pts,
                    pts_count: 1,
                    update: short_chat_to_update_new_message(short),
                    created_at: date,
                };
                state.qts = self.sequencer.current_state(user_id).await?.qts;
                self.commit(vec![record]).await?;
                state.pts = pts;
                state.pts_count = 1;
            }
            Updates::Short(short) => {
                short.date = date;
            }
            Updates::Combined(batch) => {
                self.stamp_batch(request.push_type, user_id, date, batch, &mut state)
                    .await?;
            }
            Updates::TooLong => {
                return Err(SyncError::Validation(
                    "invalid updates data: updatesTooLong".to_string(),
                ));
            }
        }

        debug!(
            "规范化完成: user_id={}, shape={}, pts={}, pts_count={}",
            user_id,
            updates.name(),
            state.pts,
            state.pts_count
        );
        Ok(Normalized { state, updates })
    }

    async fn stamp_batch(
        &self,
        push_type: PushType,
        user_id: UserId,
        date: i64,
        batch: &mut UpdatesBatch,
        state: &mut ClientUpdatesState,
    ) -> Result<()> {
        // 只有回声抑制广播才分配频道序号，避免白白消耗
        let allocate_channels = push_type == PushType::UserNotMe;

        let mut scopes = Vec::new();
        for update in &batch.updates {
            match update.sequence_class() {
                SequenceClass::User(_) => scopes.push(Scope::User(user_id)),
                SequenceClass::Channel(channel_id) if allocate_channels => {
                    scopes.push(Scope::Channel(channel_id))
                }
                _ => {}
            }
        }
        let _guards = self.locks.lock_all(&scopes).await;

        let mut records = Vec::new();
        let mut total_pts_count = 0u64;
        let mut user_pts = 0u64;

        for update in batch.updates.iter_mut() {
            match update.sequence_class() {
                SequenceClass::User(count) => {
                    // 删除 N 条消息消耗 N 个序号，只记录最后一个；
                    // 日志在 (pts - N, pts) 之间留下空档，客户端按 pts_count 跳过；
                    // 补齐续查要从 after + Σpts_count 开始，不能按记录条数推算
                    let mut pts = 0;
                    for _ in 0..count {
                        pts = self.sequencer.next_pts(user_id).await?;
                    }
                    update.stamp(pts, count);
                    total_pts_count += count;
                    user_pts = pts;
                    records.push(UpdateRecord {
                        scope: Scope::User(user_id),
                        pts,
                        pts_count: count,
                        update: update.clone(),
                        created_at: date,
                    });
                }
                SequenceClass::Channel(channel_id) if allocate_channels => {
                    let pts = self.sequencer.next_channel_pts(channel_id).await?;
                    update.stamp(pts, 1);
                    total_pts_count += 1;
                    state.channel_pts.insert(channel_id, pts);
                    records.push(UpdateRecord {
                        scope: Scope::Channel(channel_id),
                        pts,
                        pts_count: 1,
                        update: update.clone(),
                        created_at: date,
                    });
                }
                _ => {}
            }
        }

        let seq = if user_pts != 0 {
            state.qts = self.sequencer.current_state(user_id).await?.qts;
            self.sequencer.next_seq(user_id).await?
        } else {
            0
        };
        batch.date = date;
        batch.seq = seq;

        self.commit(records).await?;

        state.pts = user_pts;
        state.pts_count = total_pts_count;
        state.seq = seq;
        Ok(())
    }

    async fn commit(&self, records: Vec<UpdateRecord>) -> Result<()> {
        self.log.append_batch(records)?;
        if let Some(storage) = &self.flush_storage {
            if let Err(e) = storage.flush().await {
                warn!("更新日志刷盘失败: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::SyncConfig;
    use crate::sync::sequencer::{ConnectionWatermark, SequenceState, SledSequencer};
    use crate::types::{ChannelId, ConnectionKey, FwdHeader, MessageEntity, Origin, UpdateShort};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        sequencer: Arc<SledSequencer>,
        log: UpdateLog,
        normalizer: Arc<UpdateNormalizer>,
    }

    async fn fixture() -> Fixture {
        let storage = Storage::open(&SyncConfig::builder().temporary(true).build())
            .await
            .unwrap();
        let sequencer = Arc::new(SledSequencer::new(&storage).unwrap());
        let log = UpdateLog::new(&storage).unwrap();
        let normalizer = Arc::new(UpdateNormalizer::new(
            sequencer.clone(),
            log.clone(),
            Arc::new(ScopeLocks::new()),
            Arc::new(FixedClock::new(NOW)),
        ));
        Fixture { sequencer, log, normalizer }
    }

    fn short_message(out: bool) -> UpdateShortMessage {
        UpdateShortMessage {
            out,
            mentioned: true,
            media_unread: false,
            silent: false,
            id: 501,
            user_id: 20,
            message: "你好".into(),
            pts: 0,
            pts_count: 0,
            date: 1_699_999_000,
            fwd_from: Some(FwdHeader {
                from_id: Some(30),
                date: 1_600_000_000,
                channel_id: None,
                channel_post: None,
            }),
            via_bot_id: None,
            reply_to_msg_id: Some(499),
            entities: vec![MessageEntity {
                entity_type: "bold".into(),
                offset: 0,
                length: 2,
            }],
        }
    }

    fn message(to_id: Peer) -> Message {
        Message {
            id: 7,
            out: true,
            mentioned: false,
            media_unread: false,
            silent: false,
            from_id: 10,
            to_id,
            message: "body".into(),
            date: NOW,
            fwd_from: None,
            via_bot_id: None,
            reply_to_msg_id: None,
            entities: vec![],
        }
    }

    fn request(push_type: PushType, updates: Updates) -> UpdatesRequest {
        UpdatesRequest::new(push_type, 10, Origin::default(), updates)
    }

    fn batch(updates: Vec<Update>) -> Updates {
        Updates::Combined(UpdatesBatch {
            updates,
            ..Default::default()
        })
    }

    #[test]
    fn test_short_message_direction() {
        let outgoing = short_message_to_message(10, &short_message(true));
        assert_eq!(outgoing.from_id, 10);
        assert_eq!(outgoing.to_id, Peer::User(20));

        let incoming = short_message_to_message(10, &short_message(false));
        assert_eq!(incoming.from_id, 20);
        assert_eq!(incoming.to_id, Peer::User(10));
    }

    #[test]
    fn test_short_message_round_trip_business_fields() {
        for out in [true, false] {
            let short = short_message(out);
            let expanded = short_message_to_message(10, &short);
            let back = message_to_short_message(10, &expanded).unwrap();
            assert_eq!(back, short);
        }
        // 与解析方无关的消息无法压缩
        let expanded = short_message_to_message(10, &short_message(false));
        assert!(message_to_short_message(99, &expanded).is_none());
    }

    #[test]
    fn test_short_chat_round_trip() {
        let short = UpdateShortChatMessage {
            out: false,
            mentioned: false,
            media_unread: true,
            silent: true,
            id: 8,
            from_id: 3,
            chat_id: 900,
            message: "group".into(),
            pts: 0,
            pts_count: 0,
            date: NOW,
            fwd_from: None,
            via_bot_id: Some(4),
            reply_to_msg_id: None,
            entities: vec![],
        };
        let expanded = short_chat_message_to_message(&short);
        assert_eq!(expanded.to_id, Peer::Chat(900));
        assert_eq!(message_to_short_chat_message(&expanded).unwrap(), short);
    }

    #[tokio::test]
    async fn test_short_message_allocates_once() {
        let f = fixture().await;
        let result = f
            .normalizer
            .process(&request(PushType::UserNotMe, Updates::ShortMessage(short_message(true))))
            .await
            .unwrap();

        assert_eq!((result.state.pts, result.state.pts_count), (1, 1));
        match &result.updates {
            Updates::ShortMessage(short) => assert_eq!((short.pts, short.pts_count), (1, 1)),
            other => panic!("unexpected shape: {:?}", other),
        }

        let records = f.log.query_greater_than(Scope::User(10), 0).unwrap();
        assert_eq!(records.len(), 1);
        match &records[0].update {
            Update::NewMessage { message, pts, .. } => {
                assert_eq!(*pts, 1);
                assert_eq!(message.to_id, Peer::User(20));
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_update_has_no_sequence_impact() {
        let f = fixture().await;
        let short = Updates::Short(UpdateShort {
            update: Update::UserTyping { user_id: 10, action: "typing".into() },
            date: 0,
        });
        let result = f.normalizer.process(&request(PushType::User, short)).await.unwrap();

        assert_eq!(result.state.pts, 0);
        match result.updates {
            Updates::Short(short) => assert_eq!(short.date, NOW),
            other => panic!("unexpected shape: {:?}", other),
        }
        assert_eq!(f.sequencer.current_state(10).await.unwrap().pts, 0);
    }

    #[tokio::test]
    async fn test_batch_stamps_only_sequence_bearing() {
        let f = fixture().await;
        let updates = batch(vec![
            Update::NewMessage { message: message(Peer::User(20)), pts: 0, pts_count: 0 },
            Update::UserTyping { user_id: 20, action: "typing".into() },
            Update::DeleteMessages { messages: vec![1, 2, 3], pts: 0, pts_count: 0 },
            Update::ReadHistoryOutbox { peer: Peer::User(20), max_id: 7, pts: 0, pts_count: 0 },
        ]);
        let result = f.normalizer.process(&request(PushType::UserNotMe, updates)).await.unwrap();

        assert_eq!(result.state.pts, 5);
        assert_eq!(result.state.pts_count, 5);
        assert_eq!(result.state.seq, 1);
        let batch = match result.updates {
            Updates::Combined(batch) => batch,
            other => panic!("unexpected shape: {:?}", other),
        };
        assert_eq!(batch.date, NOW);
        assert_eq!(batch.seq, 1);
        assert_eq!(batch.updates[0].pts(), Some((1, 1)));
        assert_eq!(batch.updates[1].pts(), None);
        assert_eq!(batch.updates[2].pts(), Some((4, 3)));
        assert_eq!(batch.updates[3].pts(), Some((5, 1)));

        let pts: Vec<(u64, u64)> = f
            .log
            .query_greater_than(Scope::User(10), 0)
            .unwrap()
            .iter()
            .map(|r| (r.pts, r.pts_count))
            .collect();
        assert_eq!(pts, vec![(1, 1), (4, 3), (5, 1)]);
    }

    #[tokio::test]
    async fn test_delete_batch_consumes_one_number_per_id() {
        let f = fixture().await;
        for _ in 0..10 {
            f.sequencer.next_pts(10).await.unwrap();
        }
        let updates = batch(vec![Update::DeleteMessages {
            messages: vec![101, 102, 103],
            pts: 0,
            pts_count: 0,
        }]);
        let result = f.normalizer.process(&request(PushType::UserNotMe, updates)).await.unwrap();
        assert_eq!((result.state.pts, result.state.pts_count), (13, 3));

        let records = f.log.query_greater_than(Scope::User(10), 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!((records[0].pts, records[0].pts_count), (13, 3));
    }

    #[tokio::test]
    async fn test_channel_message_only_allocates_for_user_not_me() {
        let f = fixture().await;
        let update = Update::NewChannelMessage { message: message(Peer::Channel(77)), pts: 0, pts_count: 0 };

        let result = f
            .normalizer
            .process(&request(PushType::User, batch(vec![update.clone()])))
            .await
            .unwrap();
        assert_eq!(result.state.pts_count, 0);
        assert_eq!(f.sequencer.current_channel_pts(77).await.unwrap(), 0);

        let result = f
            .normalizer
            .process(&request(PushType::UserNotMe, batch(vec![update])))
            .await
            .unwrap();
        assert_eq!(result.state.pts, 0);
        assert_eq!(result.state.pts_count, 1);
        assert_eq!(result.state.channel_pts.get(&77), Some(&1));
        assert_eq!(f.log.query_greater_than(Scope::Channel(77), 0).unwrap().len(), 1);
        assert!(f.log.query_greater_than(Scope::User(10), 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejects_without_partial_allocation() {
        let f = fixture().await;

        let too_long = f.normalizer.process(&request(PushType::User, Updates::TooLong)).await;
        assert!(matches!(too_long, Err(SyncError::Validation(_))));

        let updates = batch(vec![
            Update::NewMessage { message: message(Peer::User(20)), pts: 0, pts_count: 0 },
            Update::DeleteMessages { messages: vec![], pts: 0, pts_count: 0 },
        ]);
        let result = f.normalizer.process(&request(PushType::UserNotMe, updates)).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));

        let bad_channel = batch(vec![Update::NewChannelMessage {
            message: message(Peer::Chat(5)),
            pts: 0,
            pts_count: 0,
        }]);
        let result = f.normalizer.process(&request(PushType::UserNotMe, bad_channel)).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));

        assert_eq!(f.sequencer.current_state(10).await.unwrap().pts, 0);
        assert!(f.log.query_greater_than(Scope::User(10), 0).unwrap().is_empty());
    }

    /// 分配若干次后失败的分配器
    #[derive(Debug)]
    struct FlakySequencer {
        inner: Arc<SledSequencer>,
        remaining: AtomicU64,
    }

    #[async_trait]
    impl Sequencer for FlakySequencer {
        async fn next_pts(&self, user_id: UserId) -> Result<u64> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 0 {
                return Err(SyncError::Allocation("backend unavailable".into()));
            }
            self.inner.next_pts(user_id).await
        }
        async fn next_channel_pts(&self, channel_id: ChannelId) -> Result<u64> {
            self.inner.next_channel_pts(channel_id).await
        }
        async fn next_seq(&self, user_id: UserId) -> Result<u64> {
            self.inner.next_seq(user_id).await
        }
        async fn current_state(&self, user_id: UserId) -> Result<SequenceState> {
            self.inner.current_state(user_id).await
        }
        async fn current_channel_pts(&self, channel_id: ChannelId) -> Result<u64> {
            self.inner.current_channel_pts(channel_id).await
        }
        async fn set_connection_watermark(&self, key: ConnectionKey, pts: u64, qts: u64) -> Result<()> {
            self.inner.set_connection_watermark(key, pts, qts).await
        }
        async fn advance_connection_watermark(&self, key: ConnectionKey, pts: u64, qts: u64) -> Result<bool> {
            self.inner.advance_connection_watermark(key, pts, qts).await
        }
        async fn stall_connection_watermark(&self, key: ConnectionKey, floor: u64) -> Result<()> {
            self.inner.stall_connection_watermark(key, floor).await
        }
        async fn get_connection_watermark(&self, key: ConnectionKey) -> Result<Option<ConnectionWatermark>> {
            self.inner.get_connection_watermark(key).await
        }
    }

    #[tokio::test]
    async fn test_allocation_failure_discards_whole_update() {
        let f = fixture().await;
        let flaky = Arc::new(FlakySequencer {
            inner: f.sequencer.clone(),
            remaining: AtomicU64::new(1),
        });
        let normalizer = UpdateNormalizer::new(
            flaky,
            f.log.clone(),
            Arc::new(ScopeLocks::new()),
            Arc::new(FixedClock::new(NOW)),
        );

        let updates = batch(vec![
            Update::NewMessage { message: message(Peer::User(20)), pts: 0, pts_count: 0 },
            Update::EditMessage { message: message(Peer::User(20)), pts: 0, pts_count: 0 },
        ]);
        let result = normalizer.process(&request(PushType::UserNotMe, updates)).await;
        assert!(matches!(result, Err(SyncError::Allocation(_))));
        assert!(f.log.query_greater_than(Scope::User(10), 0).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_commit_in_order() {
        let f = fixture().await;
        let mut handles = Vec::new();
        for _ in 0..50 {
            let normalizer = f.normalizer.clone();
            handles.push(tokio::spawn(async move {
                normalizer
                    .process(&request(PushType::UserNotMe, Updates::ShortMessage(short_message(true))))
                    .await
                    .unwrap()
                    .state
                    .pts
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let pts: Vec<u64> = f
            .log
            .query_greater_than(Scope::User(10), 0)
            .unwrap()
            .iter()
            .map(|r| r.pts)
            .collect();
        assert_eq!(pts, (1..=50).collect::<Vec<u64>>());
    }
}
