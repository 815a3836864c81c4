//! sled 存储引导
//!
//! 打开数据库并提供同步核心使用的各个 Tree：
//! - `user_pts` / `user_qts` / `user_seq`：用户序号计数器
//! - `channel_pts`：频道序号计数器
//! - `connection_state`：每个连接的水位
//! - `update_log`：按序号空间排序的更新日志

use std::sync::Arc;
use std::time::Duration;

use sled::{Db, Tree};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

const MAX_OPEN_RETRIES: u32 = 8;
const RETRY_DELAY_MS: u64 = 300;

pub const USER_PTS_TREE: &str = "user_pts";
pub const USER_QTS_TREE: &str = "user_qts";
pub const USER_SEQ_TREE: &str = "user_seq";
pub const CHANNEL_PTS_TREE: &str = "channel_pts";
pub const CONNECTION_STATE_TREE: &str = "connection_state";
pub const UPDATE_LOG_TREE: &str = "update_log";

/// 存储句柄，克隆开销很小
#[derive(Debug, Clone)]
pub struct Storage {
    db: Arc<Db>,
}

impl Storage {
    /// 按配置打开数据库
    pub async fn open(config: &SyncConfig) -> Result<Self> {
        if config.temporary {
            let db = sled::Config::new()
                .temporary(true)
                .open()
                .map_err(|e| SyncError::Storage(format!("打开临时 sled 数据库失败: {}", e)))?;
            info!("使用临时存储");
            return Ok(Self { db: Arc::new(db) });
        }

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| SyncError::Storage(format!("创建数据目录失败: {}", e)))?;

        // 旧实例可能刚释放目录锁，带退避重试
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&config.data_dir) {
                Ok(db) => {
                    info!("sled 数据库已打开: {}", config.data_dir.display());
                    return Ok(Self { db: Arc::new(db) });
                }
                Err(e) => {
                    let msg = e.to_string();
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    last_err = Some(e);
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        warn!("sled 目录被占用，{}ms 后重试 (第 {} 次)", delay_ms, attempt + 1);
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(SyncError::Storage(
            last_err
                .map(|e| format!("打开 sled 数据库失败: {}", e))
                .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
        ))
    }

    pub fn tree(&self, name: &str) -> Result<Tree> {
        self.db
            .open_tree(name)
            .map_err(|e| SyncError::Storage(format!("打开 Tree {} 失败: {}", name, e)))
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}
