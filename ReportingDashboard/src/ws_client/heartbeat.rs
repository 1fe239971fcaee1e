// ReportingDashboard/src/ws_client/heartbeat.rs

//! 心跳：连接建立时立即发送一次 `{"action":"ping"}`，之后按固定间隔重复发送，
//! 让连接穿过会关闭空闲连接的代理。`pong` 只作为存活信号由分发器记录，
//! 这里不做超时判定，连接是否断开完全以传输层的关闭事件为准。

use common_models::ClientAction;
use log::{debug, error, warn};
use rust_websocket_utils::message::encode_frame;
use std::time::Duration;
use tokio::sync::mpsc;

/// 编码并写入一个 ping 帧。出站通道已关闭时返回 `false`。
pub fn send_ping(outbound: &mpsc::UnboundedSender<String>) -> bool {
    match encode_frame(&ClientAction::Ping) {
        Ok(text) => outbound.send(text).is_ok(),
        Err(e) => {
            error!("[心跳] ping 帧序列化失败: {}", e);
            false
        }
    }
}

/// 周期性心跳循环。首个 ping 由调用方在连接建立时发送，这里从一个间隔之后开始。
///
/// 出站通道关闭 (连接已结束) 时循环退出；连接管理器在断开时也会中止这个任务。
pub async fn run_heartbeat_loop(outbound: mpsc::UnboundedSender<String>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !send_ping(&outbound) {
            warn!("[心跳] 出站通道已关闭，心跳任务退出。");
            return;
        }
        debug!("[心跳] 已发送 ping。");
    }
}
