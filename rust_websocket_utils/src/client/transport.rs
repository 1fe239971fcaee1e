// rust_websocket_utils/src/client/transport.rs

//! 客户端 WebSocket 传输层核心逻辑。
//!
//! 本模块只处理 "文本帧"：它不解析 JSON。把解析放在上层，是为了让格式错误的帧
//! 只被丢弃，而不会被当作传输错误导致连接被关闭。

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    WebSocketStream, connect_async,
    tungstenite::Error as TungsteniteError,
    tungstenite::protocol::Message,
};
use url::Url;

use crate::error::WsError;

/// 可能经过 TLS 加密的客户端 WebSocket 流。
pub type ClientWsStream = WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// 一个活动的客户端 WebSocket 连接，已拆分为发送端和接收端。
pub struct ClientConnection {
    pub ws_sender: SplitSink<ClientWsStream, Message>,
    pub ws_receiver: SplitStream<ClientWsStream>,
}

/// `Link` 读端上出现的事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// 收到一个文本帧 (未解析)。
    Frame(String),
    /// 连接已结束。`Some` 携带异常关闭的原因，`None` 表示正常关闭或流耗尽。
    Closed(Option<String>),
}

/// 以通道形式表示的一条连接。
///
/// 向 `outbound` 写入的字符串会作为文本帧发出；丢弃 `outbound` 的所有克隆会
/// 让写任务发送 Close 帧并退出。`inbound` 在连接结束时先产出一个
/// `LinkEvent::Closed`，随后关闭。
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    /// 创建一对互相连通的端点：返回 (客户端使用的 `Link`, 对端持有的发送/接收句柄)。
    ///
    /// 对端通过 `mpsc::UnboundedSender<LinkEvent>` 注入帧或关闭事件，并通过
    /// `mpsc::UnboundedReceiver<String>` 观察客户端发出的帧。用于内存中的假传输。
    pub fn pair() -> (Link, mpsc::UnboundedSender<LinkEvent>, mpsc::UnboundedReceiver<String>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Link {
                outbound: out_tx,
                inbound: in_rx,
            },
            in_tx,
            out_rx,
        )
    }
}

impl ClientConnection {
    /// 把连接转换为通道形式的 `Link`，并启动读、写两个后台任务。
    ///
    /// 必须在 tokio 运行时中调用。
    pub fn into_link(self) -> Link {
        let ClientConnection {
            mut ws_sender,
            mut ws_receiver,
        } = self;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = ws_sender.send(Message::Text(text)).await {
                    warn!("客户端：写任务发送文本帧失败，停止写入: {}", e);
                    return;
                }
            }
            debug!("客户端：出站通道已关闭，正在发送 Close 帧。");
            if let Err(e) = ws_sender.close().await {
                debug!("客户端：关闭发送端时出错 (连接可能已断开): {}", e);
            }
        });

        tokio::spawn(async move {
            loop {
                match receive_text(&mut ws_receiver).await {
                    Some(Ok(text)) => {
                        if in_tx.send(LinkEvent::Frame(text)).is_err() {
                            debug!("客户端：入站通道的接收方已丢弃，读任务退出。");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = in_tx.send(LinkEvent::Closed(Some(e.to_string())));
                        return;
                    }
                    None => {
                        let _ = in_tx.send(LinkEvent::Closed(None));
                        return;
                    }
                }
            }
        });

        Link {
            outbound: out_tx,
            inbound: in_rx,
        }
    }
}

/// 异步连接到指定的 WebSocket 服务器。
pub async fn connect_client(url_str: &str) -> Result<ClientConnection, WsError> {
    info!("客户端：开始尝试连接到 WebSocket 服务器，URL: {}", url_str);
    let parsed_url = Url::parse(url_str)
        .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url_str, e)))?;
    if !matches!(parsed_url.scheme(), "ws" | "wss") {
        return Err(WsError::InvalidUrl(format!(
            "WebSocket URL 必须使用 ws:// 或 wss://，实际为 '{}'",
            url_str
        )));
    }

    match connect_async(parsed_url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!("客户端：已成功连接到 {} (HTTP 状态码: {})", url_str, response.status());
            let (ws_sender, ws_receiver) = ws_stream.split();
            Ok(ClientConnection {
                ws_sender,
                ws_receiver,
            })
        }
        Err(e) => {
            error!("客户端：连接到 {} 失败，错误: {}", url_str, e);
            Err(WsError::WebSocketProtocolError(e))
        }
    }
}

/// 从接收流中读取下一个文本帧。
///
/// 控制帧 (Ping/Pong) 由底层库处理，这里直接跳过；二进制帧不属于本协议，
/// 记录后跳过。
///
/// # Returns
/// - `Some(Ok(text))`：收到一个文本帧。
/// - `Some(Err(e))`：连接异常中断。
/// - `None`：连接已正常关闭或流已耗尽。
pub async fn receive_text(ws_receiver: &mut SplitStream<ClientWsStream>) -> Option<Result<String, WsError>> {
    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!("客户端：收到原始文本消息，内容: '{}'", text);
                break Some(Ok(text));
            }
            Some(Ok(Message::Binary(bin))) => {
                warn!("客户端：收到非预期的二进制帧 ({} 字节)，已忽略。", bin.len());
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
            Some(Ok(Message::Close(close_frame))) => {
                debug!("客户端：收到 Close 控制帧，详细信息: {:?}", close_frame);
                break None;
            }
            Some(Err(TungsteniteError::ConnectionClosed)) | Some(Err(TungsteniteError::AlreadyClosed)) => {
                debug!("客户端：连接已关闭。");
                break None;
            }
            Some(Err(e)) => {
                error!("客户端：从 WebSocket 流接收消息时发生底层错误: {}", e);
                break Some(Err(WsError::WebSocketProtocolError(e)));
            }
            None => {
                debug!("客户端：WebSocket 接收流已结束。");
                break None;
            }
        }
    }
}
