//! 同步核心演示
//!
//! 用户 1 在两台设备上在线，从设备 A 删除消息，设备 B 收到推送；
//! 随后一个离线设备通过补齐拿回错过的更新。

use std::sync::Arc;

use privchat_sync::{
    init_logging, InMemoryPresence, InMemoryShardTransport, SessionEntry, SyncConfig, SyncService,
    Update,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("========================================");
    println!("pts 同步演示");
    println!("========================================\n");

    let config = SyncConfig::builder().temporary(true).debug_mode(false).build();
    init_logging(config.debug_mode);

    let presence = Arc::new(InMemoryPresence::new());
    let transport = Arc::new(InMemoryShardTransport::new());

    // 设备 A 在 shard 1，设备 B 在 shard 2
    presence
        .add_session(SessionEntry { shard_id: 1, connection_key: 100, session_id: 1, user_id: 1 })
        .await;
    presence
        .add_session(SessionEntry { shard_id: 2, connection_key: 200, session_id: 2, user_id: 1 })
        .await;

    let service = SyncService::new(config, presence.clone(), transport.clone()).await?;

    // === 1. 设备 A 删除三条消息 ===
    let update = Update::DeleteMessages { messages: vec![11, 12, 13], pts: 0, pts_count: 0 };
    let state = service.sync_one_update(1, 100, 1, update).await?;
    println!("✅ 删除完成: pts={}, pts_count={}", state.pts, state.pts_count);

    // === 2. 设备 B 下线后又发生一次删除 ===
    presence.remove_session(1, 200).await;
    let update = Update::DeleteMessages { messages: vec![14], pts: 0, pts_count: 0 };
    service.sync_one_update(1, 100, 1, update).await?;

    // === 3. 设备 B 重连，按上次水位补齐 ===
    let missed = service.get_updates_since_last_known(200, 1).await?;
    println!("📥 设备 B 补齐 {} 条更新", missed.updates.len());
    for update in &missed.updates {
        println!("   - {} {:?}", update.name(), update.pts());
    }

    let state = service.get_state(200, 1).await?;
    println!("📊 当前状态: pts={}, seq={}", state.pts, state.seq);

    service.shutdown().await?;
    println!("\n推送统计: {:?}", service.dispatcher_stats());
    println!("shard 投递记录: {} 条", transport.delivered().len());
    Ok(())
}
