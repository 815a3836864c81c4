//! 载荷编解码
//!
//! 协议的二进制编码不在同步核心的职责内，这里只提供不透明的
//! 序列化 / 反序列化，统一使用 bincode。

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SyncError};

pub fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| SyncError::Serialization(format!("编码失败: {}", e)))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| SyncError::Serialization(format!("解码失败: {}", e)))
}
