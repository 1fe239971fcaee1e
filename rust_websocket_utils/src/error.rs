// rust_websocket_utils/src/error.rs

//! 定义 WebSocket 工具库相关的错误类型。

use thiserror::Error;

/// WebSocket 工具库的统一错误类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 当 serde 序列化失败时返回。
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 收到的文本帧不是合法 JSON，或不是 JSON 对象。
    #[error("反序列化错误: {0}")]
    DeserializationError(String),

    /// 信封中缺少字符串类型的 `type` 字段。
    #[error("消息缺少 type 字段")]
    MissingMessageType,

    /// WebSocket 协议相关的错误，例如握手失败或连接被异常中断。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),

    /// 底层 I/O 错误。
    #[error("I/O错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 无效的 URL 格式。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),
}
