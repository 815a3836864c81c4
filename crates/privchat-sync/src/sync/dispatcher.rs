//! 推送分发器
//!
//! 解析用户在线会话 → 按 shard 分组 → 载荷只序列化一次 →
//! 每个符合策略的会话构造信封放入有界队列 → 单个后台消费者
//! 依次交给对应 shard。
//!
//! 队列满时生产者最多等待 `push_enqueue_timeout_ms`，超时丢弃并记录；
//! 投递失败不重试，记录已经落在更新日志里，客户端重连后通过补齐恢复。
//! 接收方水位只在 shard 确认送达后推进；丢失的推送会让水位退回并暂停。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::presence::{PresenceDirectory, SessionEntry};
use crate::sync::sequencer::Sequencer;
use crate::transport::{PushEnvelope, ShardTransport};
use crate::types::{ClientUpdatesState, ConnectionKey, PushType, RpcResult, RpcResultData, ShardId, Updates, UpdatesRequest};

/// 分发统计
#[derive(Debug, Default)]
pub struct DispatcherStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStatsSnapshot {
    /// 成功入队
    pub enqueued: u64,
    /// 成功交给 shard
    pub delivered: u64,
    /// shard 投递失败或载荷编码失败
    pub failed: u64,
    /// 队列满超时或已关闭
    pub dropped: u64,
}

impl DispatcherStats {
    fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct QueuedPush {
    shard_id: ShardId,
    envelope: PushEnvelope,
}

#[derive(Debug)]
pub struct PushDispatcher {
    presence: Arc<dyn PresenceDirectory>,
    sequencer: Arc<dyn Sequencer>,
    tx: mpsc::Sender<QueuedPush>,
    enqueue_timeout: Duration,
    stats: Arc<DispatcherStats>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PushDispatcher {
    /// 创建分发器并启动后台投递循环（需要在 tokio 运行时内调用）
    pub fn start(
        presence: Arc<dyn PresenceDirectory>,
        transport: Arc<dyn ShardTransport>,
        sequencer: Arc<dyn Sequencer>,
        config: &SyncConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.push_queue_capacity);
        let stats = Arc::new(DispatcherStats::default());
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(run_delivery_loop(
            rx,
            transport,
            sequencer.clone(),
            stats.clone(),
            shutdown.clone(),
        ));
        info!("推送分发器已启动: queue_capacity={}", config.push_queue_capacity);

        Self {
            presence,
            sequencer,
            tx,
            enqueue_timeout: config.push_enqueue_timeout(),
            stats,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// 按策略分发一次同步结果，返回入队的信封数
    ///
    /// 所有失败都在这里吸收，只记录日志。
    pub async fn dispatch(
        &self,
        state: &ClientUpdatesState,
        request: &UpdatesRequest,
        updates: &Updates,
    ) -> usize {
        match request.push_type {
            PushType::RpcResult => self.dispatch_rpc_result(state, request, updates).await,
            PushType::User | PushType::UserNotMe => self.broadcast(state, request, updates).await,
            PushType::UserMe => {
                // 原语义（同连接下的兄弟会话）无法确定，不投递
                warn!("USER_ME 分发策略未定义，跳过投递: user_id={}", request.push_user_id);
                0
            }
        }
    }

    async fn dispatch_rpc_result(
        &self,
        state: &ClientUpdatesState,
        request: &UpdatesRequest,
        updates: &Updates,
    ) -> usize {
        let rpc_data = match &request.rpc_result {
            Some(data) => data,
            None => {
                debug!("RPC_RESULT 请求没有携带结果，跳过: user_id={}", request.push_user_id);
                return 0;
            }
        };

        let result = match rpc_data {
            RpcResultData::AffectedMessages(affected) => {
                let mut affected = *affected;
                affected.pts = state.pts;
                affected.pts_count = state.pts_count;
                RpcResultData::AffectedMessages(affected)
            }
            RpcResultData::AffectedHistory(affected) => {
                let mut affected = *affected;
                affected.pts = state.pts;
                affected.pts_count = state.pts_count;
                RpcResultData::AffectedHistory(affected)
            }
            RpcResultData::Updates(_) => RpcResultData::Updates(updates.clone()),
        };
        let rpc_result = RpcResult {
            req_msg_id: request.origin.client_msg_id,
            result,
        };

        let payload = match codec::encode(&rpc_result) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("RPC 结果编码失败: {}", e);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return 0;
            }
        };

        let envelope = PushEnvelope {
            connection_key: request.origin.connection_key,
            session_id: request.origin.session_id,
            state: state.clone(),
            payload,
        };
        usize::from(self.enqueue(request.origin.shard_id, envelope).await)
    }

    async fn broadcast(
        &self,
        state: &ClientUpdatesState,
        request: &UpdatesRequest,
        updates: &Updates,
    ) -> usize {
        let sessions = match self.presence.get_user_online_sessions(request.push_user_id).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("查询在线会话失败: user_id={}, error={}", request.push_user_id, e);
                return 0;
            }
        };

        let mut by_shard: BTreeMap<ShardId, Vec<SessionEntry>> = BTreeMap::new();
        for entry in sessions {
            by_shard.entry(entry.shard_id).or_default().push(entry);
        }

        // 延迟序列化，没有目标会话时不编码
        let mut payload: Option<Bytes> = None;
        let mut enqueued = 0;

        for (shard_id, entries) in by_shard {
            for entry in entries {
                if request.push_type == PushType::UserNotMe
                    && entry.connection_key == request.origin.connection_key
                {
                    continue;
                }

                let bytes = match &payload {
                    Some(bytes) => bytes.clone(),
                    None => match codec::encode(updates) {
                        Ok(bytes) => {
                            payload = Some(bytes.clone());
                            bytes
                        }
                        Err(e) => {
                            warn!("更新载荷编码失败: {}", e);
                            self.stats.failed.fetch_add(1, Ordering::Relaxed);
                            return enqueued;
                        }
                    },
                };

                debug!(
                    "pushUpdatesToSession: shard_id={}, connection_key={}, pts={}",
                    shard_id, entry.connection_key, state.pts
                );
                let envelope = PushEnvelope {
                    connection_key: entry.connection_key,
                    session_id: entry.session_id,
                    state: state.clone(),
                    payload: bytes,
                };
                if self.enqueue(shard_id, envelope).await {
                    enqueued += 1;
                }
            }
        }
        enqueued
    }

    async fn enqueue(&self, shard_id: ShardId, envelope: PushEnvelope) -> bool {
        let connection_key = envelope.connection_key;
        let (pts, pts_count) = (envelope.state.pts, envelope.state.pts_count);
        let result = match self
            .tx
            .send_timeout(QueuedPush { shard_id, envelope }, self.enqueue_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(SyncError::Timeout(format!(
                "推送队列已满 {:?}",
                self.enqueue_timeout
            ))),
            Err(SendTimeoutError::Closed(_)) => Err(SyncError::ShuttingDown),
        };

        match result {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(
                    "推送入队失败，丢弃: shard_id={}, connection_key={}, error={}",
                    shard_id, connection_key, e
                );
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                stall_watermark(self.sequencer.as_ref(), connection_key, pts, pts_count).await;
                false
            }
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// 停止后台循环；已入队的信封会先投递完
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("推送循环退出异常: {}", e);
            }
            info!("推送分发器已停止: {:?}", self.stats.snapshot());
        }
    }
}

impl Drop for PushDispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_delivery_loop(
    mut rx: mpsc::Receiver<QueuedPush>,
    transport: Arc<dyn ShardTransport>,
    sequencer: Arc<dyn Sequencer>,
    stats: Arc<DispatcherStats>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            item = rx.recv() => match item {
                Some(item) => deliver(transport.as_ref(), sequencer.as_ref(), &stats, item).await,
                None => break,
            },
            _ = shutdown.cancelled() => {
                rx.close();
                while let Some(item) = rx.recv().await {
                    deliver(transport.as_ref(), sequencer.as_ref(), &stats, item).await;
                }
                break;
            }
        }
    }
    debug!("推送循环退出");
}

/// 交给 shard；只有送达后才推进接收方水位
async fn deliver(
    transport: &dyn ShardTransport,
    sequencer: &dyn Sequencer,
    stats: &DispatcherStats,
    item: QueuedPush,
) {
    let QueuedPush { shard_id, envelope } = item;
    let connection_key = envelope.connection_key;
    let (pts, pts_count, qts) = (envelope.state.pts, envelope.state.pts_count, envelope.state.qts);
    match transport.send_to_shard(shard_id, envelope).await {
        Ok(()) => {
            stats.delivered.fetch_add(1, Ordering::Relaxed);
            if pts != 0 {
                if let Err(e) = sequencer.advance_connection_watermark(connection_key, pts, qts).await {
                    warn!("推进接收方水位失败: connection_key={}, error={}", connection_key, e);
                }
            }
        }
        Err(e) => {
            // 不重试：客户端重连后通过补齐拉取
            warn!(
                "投递到 shard 失败: shard_id={}, connection_key={}, error={}",
                shard_id, connection_key, e
            );
            stats.failed.fetch_add(1, Ordering::Relaxed);
            stall_watermark(sequencer, connection_key, pts, pts_count).await;
        }
    }
}

/// 推送丢失时把水位退到这次更新之前
async fn stall_watermark(sequencer: &dyn Sequencer, connection_key: ConnectionKey, pts: u64, pts_count: u64) {
    if pts == 0 {
        return;
    }
    let floor = pts.saturating_sub(pts_count);
    if let Err(e) = sequencer.stall_connection_watermark(connection_key, floor).await {
        warn!("暂停接收方水位失败: connection_key={}, error={}", connection_key, e);
    }
}
