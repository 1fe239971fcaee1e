// rust_websocket_utils/src/server/transport.rs

//! 最小的服务端传输层：监听、握手，并把每条连接交给回调。
//!
//! 同步层本身只是客户端；这里的服务端用于在测试中扮演后端，按脚本推送事件。

use crate::error::WsError;
use log::{debug, error, info};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_async};

/// 经过 WebSocket 握手后的 TCP 流。
pub type WsStream = WebSocketStream<TcpStream>;

/// 已绑定监听地址、尚未开始接受连接的服务端。
pub struct ServerTransport {
    listener: TcpListener,
}

impl ServerTransport {
    /// 绑定监听地址。端口为 0 时由系统分配，之后用 `local_addr` 取得实际地址。
    pub async fn bind(addr: SocketAddr) -> Result<Self, WsError> {
        let listener = TcpListener::bind(&addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, WsError> {
        Ok(self.listener.local_addr()?)
    }

    /// 持续接受连接。每个握手成功的连接在独立的 tokio 任务中交给 `on_connect`。
    ///
    /// 单次 accept 或握手失败只记录日志；此函数一直运行，直到所在任务被中止。
    pub async fn serve<F, Fut>(self, on_connect: F)
    where
        F: Fn(WsStream, SocketAddr) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let local = self.listener.local_addr().ok();
        info!("服务端：正在监听 {:?}", local);
        loop {
            let (tcp_stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("服务端：接受 TCP 连接失败，继续监听: {}", e);
                    continue;
                }
            };
            debug!("服务端：接受了来自 {} 的 TCP 连接", peer_addr);
            let on_connect = on_connect.clone();
            tokio::spawn(async move {
                match accept_async(tcp_stream).await {
                    Ok(ws_stream) => {
                        info!("服务端：与 {} 的 WebSocket 握手成功", peer_addr);
                        on_connect(ws_stream, peer_addr).await;
                        debug!("服务端：{} 的连接处理结束", peer_addr);
                    }
                    Err(e) => error!("服务端：与 {} 的 WebSocket 握手失败: {}", peer_addr, e),
                }
            });
        }
    }

    /// `bind` 与 `serve` 的组合。只有绑定失败时才会返回。
    pub async fn start<F, Fut>(addr: SocketAddr, on_connect: F) -> Result<(), WsError>
    where
        F: Fn(WsStream, SocketAddr) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::bind(addr).await?.serve(on_connect).await;
        Ok(())
    }
}
