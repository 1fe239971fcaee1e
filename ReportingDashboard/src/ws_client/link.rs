// ReportingDashboard/src/ws_client/link.rs

//! 连接器：连接管理器打开传输的唯一入口。
//!
//! 生产环境用 `TungsteniteConnector` 建立真实的 WebSocket 连接；测试可以注入
//! 用 `Link::pair()` 构造的内存连接器，配合暂停的 tokio 时钟验证重连行为。

use async_trait::async_trait;
use rust_websocket_utils::client::transport::{self, Link};
use rust_websocket_utils::error::WsError;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// 打开到 `url` 的连接。失败 (DNS、拒绝连接、握手失败) 一律返回 `Err`。
    async fn open(&self, url: &str) -> Result<Link, WsError>;
}

/// 基于 `tokio-tungstenite` 的连接器。
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, url: &str) -> Result<Link, WsError> {
        let connection = transport::connect_client(url).await?;
        Ok(connection.into_link())
    }
}
