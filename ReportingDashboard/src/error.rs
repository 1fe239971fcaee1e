// ReportingDashboard/src/error.rs

use rust_websocket_utils::error::WsError;
use thiserror::Error;

use crate::api_client::ApiError;

/// 同步层应用的主要错误类型。
///
/// 这些错误都不会让进程退出：传输错误触发重连，REST 错误让面板保留旧数据，
/// 配置错误退回默认配置。只有二进制入口在无法推导连接地址时才会报告并结束。
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("WebSocket 服务错误: {0}")]
    WebSocket(#[from] WsError),

    #[error("REST 接口错误: {0}")]
    Api(#[from] ApiError),
}
