//! 同步服务配置

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// 推送队列默认容量
pub const DEFAULT_PUSH_QUEUE_CAPACITY: usize = 1024;

/// 推送队列满时生产者默认最长等待（毫秒）
pub const DEFAULT_PUSH_ENQUEUE_TIMEOUT_MS: u64 = 3000;

/// 同步服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// sled 数据目录
    pub data_dir: PathBuf,
    /// 使用临时（内存）数据库，进程退出即丢弃
    pub temporary: bool,
    /// 推送队列容量
    pub push_queue_capacity: usize,
    /// 推送队列满时的等待超时（毫秒）
    pub push_enqueue_timeout_ms: u64,
    /// 每次追加更新后刷盘
    pub flush_on_commit: bool,
    /// 调试模式
    pub debug_mode: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/sync"),
            temporary: false,
            push_queue_capacity: DEFAULT_PUSH_QUEUE_CAPACITY,
            push_enqueue_timeout_ms: DEFAULT_PUSH_ENQUEUE_TIMEOUT_MS,
            flush_on_commit: false,
            debug_mode: false,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// 从 JSON 文件加载配置，缺失字段使用默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("解析配置文件失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.push_queue_capacity == 0 {
            return Err(SyncError::Config("push_queue_capacity 必须大于 0".to_string()));
        }
        if self.push_enqueue_timeout_ms == 0 {
            return Err(SyncError::Config("push_enqueue_timeout_ms 必须大于 0".to_string()));
        }
        if !self.temporary && self.data_dir.as_os_str().is_empty() {
            return Err(SyncError::Config("data_dir 不能为空".to_string()));
        }
        Ok(())
    }

    pub fn push_enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.push_enqueue_timeout_ms)
    }
}

/// 配置构建器
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.config.temporary = temporary;
        self
    }

    pub fn push_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.push_queue_capacity = capacity;
        self
    }

    pub fn push_enqueue_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.push_enqueue_timeout_ms = timeout_ms;
        self
    }

    pub fn flush_on_commit(mut self, flush: bool) -> Self {
        self.config.flush_on_commit = flush;
        self
    }

    pub fn debug_mode(mut self, debug: bool) -> Self {
        self.config.debug_mode = debug;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
