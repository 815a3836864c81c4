//! 同步服务
//!
//! 对外暴露的 RPC 面。服务对象显式持有存储、在线目录、shard 通道
//! 与时钟，不存在全局实例。

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::logging::init_logging;
use crate::presence::PresenceDirectory;
use crate::storage::Storage;
use crate::sync::{
    DispatcherStatsSnapshot, PushDispatcher, ScopeLocks, Sequencer, SledSequencer, UpdateLog,
    UpdateNormalizer,
};
use crate::transport::ShardTransport;
use crate::types::{
    ChannelId, ClientUpdatesState, ConnectionKey, Origin, PushType, RpcResultData, Scope,
    SessionId, ShardId, Update, UpdateRecord, Updates, UpdatesBatch, UpdatesRequest, UpdatesState,
    UserId,
};

#[derive(Debug)]
pub struct SyncService {
    storage: Storage,
    sequencer: Arc<dyn Sequencer>,
    log: UpdateLog,
    locks: Arc<ScopeLocks>,
    normalizer: UpdateNormalizer,
    dispatcher: PushDispatcher,
    clock: Arc<dyn Clock>,
}

impl SyncService {
    /// 按配置打开存储并启动服务
    pub async fn new(
        config: SyncConfig,
        presence: Arc<dyn PresenceDirectory>,
        transport: Arc<dyn ShardTransport>,
    ) -> Result<Self> {
        Self::with_clock(config, presence, transport, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        config: SyncConfig,
        presence: Arc<dyn PresenceDirectory>,
        transport: Arc<dyn ShardTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = Storage::open(&config).await?;
        let sequencer = Arc::new(SledSequencer::new(&storage)?);
        Self::from_parts(config, storage, sequencer, presence, transport, clock)
    }

    /// 用已有的存储和分配器组装服务
    pub fn from_parts(
        config: SyncConfig,
        storage: Storage,
        sequencer: Arc<dyn Sequencer>,
        presence: Arc<dyn PresenceDirectory>,
        transport: Arc<dyn ShardTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        if config.debug_mode {
            // 已有全局订阅者时不覆盖
            init_logging(true);
        }
        let log = UpdateLog::new(&storage)?;
        let locks = Arc::new(ScopeLocks::new());

        let mut normalizer =
            UpdateNormalizer::new(sequencer.clone(), log.clone(), locks.clone(), clock.clone());
        if config.flush_on_commit {
            normalizer = normalizer.with_flush(storage.clone());
        }
        let dispatcher = PushDispatcher::start(presence, transport, sequencer.clone(), &config);

        info!("同步服务已启动: temporary={}, flush_on_commit={}", config.temporary, config.flush_on_commit);
        Ok(Self {
            storage,
            sequencer,
            log,
            locks,
            normalizer,
            dispatcher,
            clock,
        })
    }

    // ============================================================
    // 写入：分配序号 + 分发
    // ============================================================

    /// 同步一条更新，回声抑制广播给用户的其他会话
    #[instrument(skip(self, update), fields(kind = update.name()))]
    pub async fn sync_one_update(
        &self,
        user_id: UserId,
        connection_key: ConnectionKey,
        session_id: SessionId,
        update: Update,
    ) -> Result<ClientUpdatesState> {
        let origin = Origin {
            connection_key,
            session_id,
            ..Default::default()
        };
        let request = UpdatesRequest::new(
            PushType::UserNotMe,
            user_id,
            origin,
            Updates::Combined(UpdatesBatch::single(update)),
        );
        self.sync_updates_batch(request).await
    }

    /// 同步一条更新，并把带 pts 的 RPC 结果只推回发起连接
    #[instrument(skip(self, update), fields(kind = update.name()))]
    pub async fn sync_one_update_with_echo(
        &self,
        shard_id: ShardId,
        connection_key: ConnectionKey,
        session_id: SessionId,
        user_id: UserId,
        client_msg_id: u64,
        update: Update,
    ) -> Result<ClientUpdatesState> {
        let origin = Origin {
            shard_id,
            connection_key,
            session_id,
            client_msg_id,
        };
        let rpc_result = RpcResultData::for_update(&update);
        let request = UpdatesRequest::new(
            PushType::RpcResult,
            user_id,
            origin,
            Updates::Combined(UpdatesBatch::single(update)),
        )
        .with_rpc_result(rpc_result);
        self.sync_updates_batch(request).await
    }

    /// 推给用户所有会话，不返回状态
    #[instrument(skip(self, update), fields(kind = update.name()))]
    pub async fn push_one_update(&self, user_id: UserId, update: Update) -> Result<()> {
        let request = UpdatesRequest::new(
            PushType::User,
            user_id,
            Origin::default(),
            Updates::Combined(UpdatesBatch::single(update)),
        );
        self.push_updates_batch(request).await
    }

    /// syncUpdatesData
    pub async fn sync_updates_batch(&self, request: UpdatesRequest) -> Result<ClientUpdatesState> {
        info!(
            "syncUpdatesData - request: push_type={:?}, user_id={}, connection_key={}, shape={}",
            request.push_type,
            request.push_user_id,
            request.origin.connection_key,
            request.updates.name()
        );

        let normalized = self.normalizer.process(&request).await.map_err(|e| {
            error!("syncUpdatesData - 失败: user_id={}, error={}", request.push_user_id, e);
            e
        })?;
        let state = normalized.state;

        // 记录已提交；水位与推送失败都不影响调用结果
        if state.pts != 0 && request.origin.connection_key != 0 {
            if let Err(e) = self
                .sequencer
                .advance_connection_watermark(request.origin.connection_key, state.pts, state.qts)
                .await
            {
                warn!(
                    "更新发起连接水位失败: connection_key={}, error={}",
                    request.origin.connection_key, e
                );
            }
        }
        let enqueued = self.dispatcher.dispatch(&state, &request, &normalized.updates).await;

        debug!(
            "syncUpdatesData - reply: pts={}, pts_count={}, seq={}, enqueued={}",
            state.pts, state.pts_count, state.seq, enqueued
        );
        Ok(state)
    }

    /// pushUpdatesData
    pub async fn push_updates_batch(&self, request: UpdatesRequest) -> Result<()> {
        self.sync_updates_batch(request).await.map(|_| ())
    }

    // ============================================================
    // 补齐：只读查询 + 水位记录
    // ============================================================

    /// 按连接上次记录的水位拉取之后的所有更新
    #[instrument(skip(self))]
    pub async fn get_updates_since_last_known(
        &self,
        connection_key: ConnectionKey,
        user_id: UserId,
    ) -> Result<UpdatesBatch> {
        let pts = self
            .sequencer
            .get_connection_watermark(connection_key)
            .await?
            .map(|watermark| watermark.pts)
            .unwrap_or(0);
        debug!("getNewUpdatesData - watermark: connection_key={}, pts={}", connection_key, pts);
        self.get_updates_since(user_id, pts).await
    }

    #[instrument(skip(self))]
    pub async fn get_updates_since(&self, user_id: UserId, pts: u64) -> Result<UpdatesBatch> {
        let records = self.log.query_greater_than(Scope::User(user_id), pts)?;
        debug!("getUserGtPtsUpdatesData - user_id={}, pts={}, count={}", user_id, pts, records.len());
        Ok(self.batch_from(records))
    }

    #[instrument(skip(self))]
    pub async fn get_channel_updates_since(&self, channel_id: ChannelId, pts: u64) -> Result<UpdatesBatch> {
        let records = self.log.query_greater_than(Scope::Channel(channel_id), pts)?;
        debug!(
            "getChannelGtPtsUpdatesData - channel_id={}, pts={}, count={}",
            channel_id,
            pts,
            records.len()
        );
        Ok(self.batch_from(records))
    }

    /// 频道当前 pts；在空间锁内读取，读到的水位对应的记录一定已可见
    #[instrument(skip(self))]
    pub async fn get_current_channel_pts(&self, channel_id: ChannelId) -> Result<u64> {
        let _guard = self.locks.lock(Scope::Channel(channel_id)).await;
        self.sequencer.current_channel_pts(channel_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_state(&self, connection_key: ConnectionKey, user_id: UserId) -> Result<UpdatesState> {
        let state = {
            let _guard = self.locks.lock(Scope::User(user_id)).await;
            self.sequencer.current_state(user_id).await?
        };
        debug!(
            "getState - reply: connection_key={}, pts={}, seq={}",
            connection_key, state.pts, state.seq
        );
        Ok(UpdatesState {
            pts: state.pts,
            qts: state.qts,
            date: self.clock.now(),
            seq: state.seq,
        })
    }

    /// 客户端确认的水位，覆盖写入并解除推送丢失造成的暂停；不触发任何投递
    #[instrument(skip(self))]
    pub async fn set_state(&self, connection_key: ConnectionKey, pts: u64, qts: u64) -> Result<()> {
        self.sequencer.set_connection_watermark(connection_key, pts, qts).await
    }

    pub fn dispatcher_stats(&self) -> DispatcherStatsSnapshot {
        self.dispatcher.stats()
    }

    /// 停止推送循环（已入队的先投递完）并刷盘
    pub async fn shutdown(&self) -> Result<()> {
        self.dispatcher.shutdown().await;
        self.storage.flush().await?;
        info!("同步服务已关闭");
        Ok(())
    }

    fn batch_from(&self, records: Vec<UpdateRecord>) -> UpdatesBatch {
        UpdatesBatch {
            updates: records.into_iter().map(|record| record.update).collect(),
            users: Vec::new(),
            chats: Vec::new(),
            date: self.clock.now(),
            seq: 0,
        }
    }
}
