//! 日志初始化

use tracing::Level;

/// 初始化全局 fmt 订阅者
///
/// 重复调用无副作用（已存在全局订阅者时直接返回 false）。
pub fn init_logging(debug_mode: bool) -> bool {
    let level = if debug_mode { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}
