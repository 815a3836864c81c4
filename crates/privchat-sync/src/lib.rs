//! Privchat Sync - 即时通讯服务端的更新同步核心
//!
//! 本库负责：
//! - 为每个用户、每个频道分配严格递增的 pts 序号
//! - 把紧凑形式的更新展开、打戳并写入可按范围查询的更新日志
//! - 把同步结果推给用户其他在线会话（或只回给发起连接）
//! - 为重连客户端提供 `pts` 之后的补齐查询
//!
//! 推送是尽力而为的；更新日志才是客户端恢复状态的依据。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use privchat_sync::{InMemoryPresence, InMemoryShardTransport, SyncConfig, SyncService, Update};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::builder()
//!         .data_dir("/path/to/sync")
//!         .build();
//!
//!     let presence = Arc::new(InMemoryPresence::new());
//!     let transport = Arc::new(InMemoryShardTransport::new());
//!     let service = SyncService::new(config, presence, transport).await?;
//!
//!     // 删除两条消息，广播给用户 1 的其他会话
//!     let update = Update::DeleteMessages { messages: vec![1, 2], pts: 0, pts_count: 0 };
//!     let state = service.sync_one_update(1, 100, 1, update).await?;
//!     println!("pts={}, pts_count={}", state.pts, state.pts_count);
//!
//!     // 重连后补齐
//!     let missed = service.get_updates_since(1, 0).await?;
//!     println!("补齐 {} 条", missed.updates.len());
//!
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;
pub mod logging;
pub mod clock;
pub mod types;
pub mod codec;
pub mod storage;
pub mod sync;
pub mod presence;
pub mod transport;
pub mod service;
pub mod handlers;

// 重新导出核心类型，方便使用
pub use error::{Result, SyncError};
pub use config::{SyncConfig, SyncConfigBuilder};
pub use logging::init_logging;
pub use clock::{Clock, FixedClock, SystemClock};
pub use types::{
    AffectedHistory, AffectedMessages, ClientUpdatesState, InputPeer, Message, Origin, Peer,
    PushType, RpcResult, RpcResultData, Scope, Update, UpdateRecord, UpdateShort,
    UpdateShortChatMessage, UpdateShortMessage, Updates, UpdatesBatch, UpdatesRequest,
    UpdatesState,
};
pub use storage::Storage;
pub use sync::{
    DispatcherStatsSnapshot, PushDispatcher, Sequencer, SledSequencer, UpdateLog, UpdateNormalizer,
};
pub use presence::{InMemoryPresence, PresenceDirectory, SessionEntry};
pub use transport::{InMemoryShardTransport, PushEnvelope, ShardTransport};
pub use service::SyncService;
pub use handlers::{ChatStore, DialogStore, MessageStore, MessagesHandler, RpcMetadata};

/// 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
