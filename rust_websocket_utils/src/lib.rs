//! `rust_websocket_utils` 是一个提供 WebSocket 通信实用功能的 Rust Crate。
//! 它封装了 `tokio-tungstenite` 的细节，向上层提供按 JSON 文本帧收发的简洁接口。
//!
//! 主要模块包括：
//! - `message`: 定义 `{type, data}` 信封 `WsEnvelope` 及其编解码。
//! - `error`: 定义库中使用的统一错误类型 `WsError`。
//! - `client`: 客户端连接、文本帧接收，以及把连接转成一对通道的 `Link`。
//! - `server`: 一个最小的服务端传输层，供集成测试充当假后端。

pub mod client;
pub mod error;
pub mod message;
pub mod server;
