// rust_websocket_utils/src/server/mod.rs

//! WebSocket 服务端模块。
//!
//! 同步层本身只作为客户端运行；这里的服务端传输层用于在集成测试中搭建
//! 本地假后端 (推送变更通知、主动断开连接等)。

pub mod transport;
