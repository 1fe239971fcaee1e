// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! `transport` 子模块负责建立到服务器的连接、读取文本帧，并可以把一条连接
//! 转换成一对 tokio 通道 (`Link`)，让上层只和通道打交道，不必持有
//! `tokio-tungstenite` 的流类型。

pub mod transport;
