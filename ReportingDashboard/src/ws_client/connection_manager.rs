// ReportingDashboard/src/ws_client/connection_manager.rs

//! 连接管理器：持有唯一一条逻辑 WebSocket 连接。
//!
//! 负责建立连接、检测关闭与错误、按退避策略安排重连，并在连接建立后启动心跳、
//! 把每个入站帧交给 `MessageDispatcher`。所有传输层错误 (DNS 失败、拒绝连接、
//! 异常断开) 都按同一种方式处理：记录日志并安排重连，从不让进程退出。
//!
//! 状态机:
//! - Disconnected -> Connecting: 显式 `connect` 或重连定时器触发。
//! - Connecting -> Connected: 传输打开成功。
//! - Connecting -> Disconnected: 握手失败，安排重连。
//! - Connected -> Disconnected: 连接关闭或出错，安排重连。
//! - 任意 -> Closing -> Disconnected: 显式 `close`，不再重连。
//!
//! 每次连接尝试都有一个递增的代号 (generation)。后台任务在修改共享状态前先比对
//! 代号，已被 `close` 或新连接取代的旧任务不会再改动状态。

use common_models::ClientAction;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rust_websocket_utils::client::transport::{Link, LinkEvent};
use rust_websocket_utils::message::encode_frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::heartbeat;
use super::link::Connector;
use super::reconnect::ReconnectPolicy;
use crate::sync::MessageDispatcher;

/// 连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

#[derive(Default)]
struct ManagerState {
    url: Option<String>,
    generation: u64,
    /// 当前连接的出站通道；只有 Connected 时为 `Some`。
    outbound: Option<mpsc::UnboundedSender<String>>,
    connection_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    /// 自上次成功连接以来的连续失败次数，决定下一次退避延迟。
    consecutive_failures: u32,
    has_connected_before: bool,
    /// `close` 之后为 `true`，直到再次显式调用 `connect`。
    shut_down: bool,
}

impl ManagerState {
    fn timer_pending(&self) -> bool {
        self.reconnect_timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

struct Shared {
    connector: Arc<dyn Connector>,
    dispatcher: MessageDispatcher,
    policy: ReconnectPolicy,
    heartbeat_interval: Option<Duration>,
    state: Mutex<ManagerState>,
    state_tx: watch::Sender<ConnectionState>,
    connect_attempts: AtomicU64,
}

/// 连接管理器句柄。克隆得到的句柄操作同一条连接。
///
/// 除 `state`/`subscribe_state` 等只读方法外，所有方法都必须在 tokio 运行时中调用。
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("connect_attempts", &self.connect_attempts())
            .field("policy", &self.shared.policy)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        dispatcher: MessageDispatcher,
        policy: ReconnectPolicy,
        heartbeat_interval: Option<Duration>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                dispatcher,
                policy,
                heartbeat_interval,
                state: Mutex::new(ManagerState::default()),
                state_tx,
                connect_attempts: AtomicU64::new(0),
            }),
        }
    }

    /// 当前连接状态。
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// 订阅连接状态变化。
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// 自创建以来发起过的连接尝试次数 (包括重连)。
    pub fn connect_attempts(&self) -> u64 {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.shared.state.lock().timer_pending()
    }

    /// 连接到 `url`。
    ///
    /// 已处于 Connecting 或 Connected 时为空操作。若有待触发的重连定时器，
    /// 取消它并立即尝试连接。连接结果通过 `subscribe_state` 异步观察。
    pub fn connect(&self, url: &str) {
        let mut st = self.shared.state.lock();
        if self.state().is_active() {
            debug!("[连接管理器] connect 调用被忽略：当前状态为 {:?}", self.state());
            return;
        }
        if let Some(timer) = st.reconnect_timer.take() {
            timer.abort();
        }
        st.url = Some(url.to_string());
        st.shut_down = false;
        Shared::start_attempt(&self.shared, &mut st);
    }

    /// 安排一次重连。`delay` 为 `None` 时按退避策略计算延迟。
    ///
    /// 已有待触发的定时器、连接正在进行或已建立、已 `close`、或从未 `connect` 过时
    /// 返回 `false`，不会创建第二个定时器。
    pub fn schedule_reconnect(&self, delay: Option<Duration>) -> bool {
        let mut st = self.shared.state.lock();
        if self.state().is_active() {
            debug!("[连接管理器] 连接处于活动状态，不安排重连。");
            return false;
        }
        Shared::schedule_reconnect_locked(&self.shared, &mut st, delay)
    }

    /// 把客户端动作编码为 JSON 文本帧发送。未连接时返回 `false`。
    pub fn send(&self, action: &ClientAction) -> bool {
        let st = self.shared.state.lock();
        let Some(outbound) = st.outbound.as_ref() else {
            debug!("[连接管理器] 未连接，丢弃出站动作 {:?}", action);
            return false;
        };
        match encode_frame(action) {
            Ok(text) => outbound.send(text).is_ok(),
            Err(e) => {
                error!("[连接管理器] 出站动作序列化失败: {}", e);
                false
            }
        }
    }

    /// 请求服务端重新推送当前状态 (`{"action":"refresh"}`)。
    pub fn request_refresh(&self) -> bool {
        self.send(&ClientAction::Refresh)
    }

    /// 关闭连接并取消待触发的重连。
    ///
    /// 之后 `send` 返回 `false`，`schedule_reconnect` 为空操作，直到再次显式调用 `connect`。
    /// 可以重复调用。
    pub fn close(&self) {
        let mut st = self.shared.state.lock();
        if st.shut_down && self.state() == ConnectionState::Disconnected {
            return;
        }
        info!("[连接管理器] 正在关闭连接。");
        self.shared.state_tx.send_replace(ConnectionState::Closing);
        st.shut_down = true;
        st.generation += 1;
        if let Some(timer) = st.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(heartbeat_task) = st.heartbeat_task.take() {
            heartbeat_task.abort();
        }
        if let Some(connection_task) = st.connection_task.take() {
            connection_task.abort();
        }
        // 丢弃出站通道让写任务发出 Close 帧。
        st.outbound = None;
        self.shared.state_tx.send_replace(ConnectionState::Disconnected);
        info!("[连接管理器] 连接已关闭。");
    }
}

impl Shared {
    fn start_attempt(this: &Arc<Self>, st: &mut ManagerState) {
        let Some(url) = st.url.clone() else {
            warn!("[连接管理器] 尚未指定连接地址，无法发起连接。");
            return;
        };
        st.generation += 1;
        let generation = st.generation;
        let session_id = Uuid::new_v4();
        let attempt = this.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        this.state_tx.send_replace(ConnectionState::Connecting);
        info!(
            "[连接管理器] (会话 {}) 第 {} 次连接尝试，目标: {}",
            session_id, attempt, url
        );

        let shared = this.clone();
        st.connection_task = Some(tokio::spawn(async move {
            match shared.connector.open(&url).await {
                Ok(link) => Self::run_session(shared, generation, session_id, link).await,
                Err(e) => {
                    warn!("[连接管理器] (会话 {}) 连接失败: {}", session_id, e);
                    Self::on_disconnected(&shared, generation, session_id);
                }
            }
        }));
    }

    async fn run_session(this: Arc<Self>, generation: u64, session_id: Uuid, link: Link) {
        let Link { outbound, mut inbound } = link;
        let restored = {
            let mut st = this.state.lock();
            if st.generation != generation || st.shut_down {
                debug!("[连接管理器] (会话 {}) 连接建立时已被取代，直接丢弃。", session_id);
                return;
            }
            st.consecutive_failures = 0;
            if let Some(timer) = st.reconnect_timer.take() {
                timer.abort();
            }
            heartbeat::send_ping(&outbound);
            if let Some(interval) = this.heartbeat_interval {
                st.heartbeat_task = Some(tokio::spawn(heartbeat::run_heartbeat_loop(outbound.clone(), interval)));
            }
            st.outbound = Some(outbound);
            let restored = st.has_connected_before;
            st.has_connected_before = true;
            this.state_tx.send_replace(ConnectionState::Connected);
            restored
        };
        info!("[连接管理器] (会话 {}) 连接已建立。", session_id);

        if restored {
            this.dispatcher.on_connection_restored();
        }

        loop {
            match inbound.recv().await {
                Some(LinkEvent::Frame(text)) => {
                    this.dispatcher.dispatch_frame(&text);
                }
                Some(LinkEvent::Closed(Some(reason))) => {
                    warn!("[连接管理器] (会话 {}) 连接异常断开: {}", session_id, reason);
                    break;
                }
                Some(LinkEvent::Closed(None)) | None => {
                    info!("[连接管理器] (会话 {}) 连接已被对端关闭。", session_id);
                    break;
                }
            }
        }
        Self::on_disconnected(&this, generation, session_id);
    }

    fn on_disconnected(this: &Arc<Self>, generation: u64, session_id: Uuid) {
        let mut st = this.state.lock();
        if st.generation != generation {
            debug!("[连接管理器] (会话 {}) 旧会话结束，状态不变。", session_id);
            return;
        }
        st.outbound = None;
        // 当前正运行在这个任务里，只释放句柄。
        st.connection_task = None;
        if let Some(heartbeat_task) = st.heartbeat_task.take() {
            heartbeat_task.abort();
        }
        this.state_tx.send_replace(ConnectionState::Disconnected);
        if st.shut_down {
            return;
        }
        Self::schedule_reconnect_locked(this, &mut st, None);
    }

    fn schedule_reconnect_locked(this: &Arc<Self>, st: &mut ManagerState, delay: Option<Duration>) -> bool {
        if st.shut_down {
            debug!("[连接管理器] 已关闭，不安排重连。");
            return false;
        }
        if st.url.is_none() {
            debug!("[连接管理器] 尚未连接过，不安排重连。");
            return false;
        }
        if st.timer_pending() {
            debug!("[连接管理器] 已有待触发的重连定时器，忽略本次请求。");
            return false;
        }
        let delay = delay.unwrap_or_else(|| {
            let delay = this.policy.delay_for_attempt(st.consecutive_failures);
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            delay
        });
        info!("[连接管理器] 将在 {:.1} 秒后重连。", delay.as_secs_f64());

        let shared = this.clone();
        let generation = st.generation;
        st.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Self::fire_reconnect_timer(&shared, generation);
        }));
        true
    }

    /// 重连定时器到期。`generation` 是安排定时器时的代号；
    /// 其间发生过 `connect`、`close` 或新的连接尝试时，这个定时器已过期，不能动当前的句柄。
    fn fire_reconnect_timer(this: &Arc<Self>, generation: u64) {
        let mut st = this.state.lock();
        if st.generation != generation {
            debug!("[连接管理器] 过期的重连定时器触发，已忽略。");
            return;
        }
        // 释放自身句柄，允许下一次安排。
        st.reconnect_timer = None;
        if st.shut_down || this.state_tx.borrow().is_active() {
            return;
        }
        debug!("[连接管理器] 重连定时器触发。");
        Self::start_attempt(this, &mut st);
    }
}
