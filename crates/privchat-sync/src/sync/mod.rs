/// pts 同步核心
///
/// 职责：
/// - 为每个用户 / 频道分配有序序号（sequencer）
/// - 展开紧凑更新并打戳（normalizer）
/// - 持久化可按范围查询的更新日志（update_log）
/// - 把更新推给用户所有在线会话（dispatcher）

pub mod locks;
pub mod sequencer;
pub mod update_log;
pub mod normalizer;
pub mod dispatcher;

pub use locks::ScopeLocks;
pub use sequencer::{ConnectionWatermark, SequenceState, Sequencer, SledSequencer};
pub use update_log::UpdateLog;
pub use normalizer::{Normalized, UpdateNormalizer};
pub use dispatcher::{DispatcherStatsSnapshot, PushDispatcher};
