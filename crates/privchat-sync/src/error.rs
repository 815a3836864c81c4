use thiserror::Error;

/// 同步核心错误
///
/// - `Validation` / `Allocation` 直接返回给调用方，整次调用失败
/// - `Delivery` 只在分发器内部记录，不会抛给已经拿到同步结果的调用方
/// - `SuppressedReply` 是哨兵值：同步 RPC 结果必须为空，真实结果走推送通道
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid updates: {0}")]
    Validation(String),

    #[error("Sequence allocation failed: {0}")]
    Allocation(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Reply suppressed, result is delivered by push")]
    SuppressedReply,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Shutting down")]
    ShuttingDown,
}

impl From<sled::Error> for SyncError {
    fn from(error: sled::Error) -> Self {
        SyncError::Storage(error.to_string())
    }
}

impl From<bincode::Error> for SyncError {
    fn from(error: bincode::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        SyncError::Storage(error.to_string())
    }
}

impl SyncError {
    /// 是否是"不返回客户端"哨兵（RPC 层据此返回空结果）
    pub fn is_suppressed_reply(&self) -> bool {
        matches!(self, SyncError::SuppressedReply)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppressed_reply_sentinel() {
        assert!(SyncError::SuppressedReply.is_suppressed_reply());
        assert!(!SyncError::Validation("x".into()).is_suppressed_reply());
        assert!(!SyncError::Delivery("shard 2".into()).is_suppressed_reply());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Validation("updatesTooLong".into());
        assert_eq!(err.to_string(), "Invalid updates: updatesTooLong");
    }
}
