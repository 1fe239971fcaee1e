// ReportingDashboard/src/sync/panel.rs

//! 无界面的面板缓存。
//!
//! 每个 `PanelCache` 绑定一种实体，持有该集合最近一次成功拉取的行。
//! 收到通知时并不把事件负载合并进缓存，而是通过 `RestCollaborator`
//! 重新拉取整个集合并整体替换，这样重复或乱序的事件都不会让缓存偏离后端。
//!
//! 同一面板同一时刻最多只有一个拉取在进行。拉取期间到达的刷新请求只把面板
//! 标记为 "脏"，当前拉取结束后再补一次，无论期间来了多少个事件。

use common_models::EntityKind;
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::registry::{SubscriberRegistry, Subscription};
use crate::api_client::RestCollaborator;
use crate::ws_client::ConnectionState;

/// 面板刷新状态的快照。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelStatus {
    /// 是否有拉取正在进行 (或已排队等待补拉)。
    pub refreshing: bool,
    pub completed_refreshes: u64,
    pub failed_refreshes: u64,
    /// 最近一次拉取失败的原因；之后一次成功拉取会清除它。
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct RefreshFlags {
    in_flight: bool,
    dirty: bool,
}

struct PanelInner {
    kind: EntityKind,
    api: Arc<dyn RestCollaborator>,
    rows: RwLock<Vec<Value>>,
    flags: Mutex<RefreshFlags>,
    live: AtomicBool,
    status_tx: watch::Sender<PanelStatus>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// 一种实体的本地缓存。克隆得到的是同一个面板的另一个句柄。
#[derive(Clone)]
pub struct PanelCache {
    inner: Arc<PanelInner>,
}

impl std::fmt::Debug for PanelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelCache")
            .field("kind", &self.inner.kind)
            .field("rows", &self.inner.rows.read().len())
            .field("live", &self.inner.live.load(Ordering::SeqCst))
            .finish()
    }
}

impl PanelCache {
    pub fn new(kind: EntityKind, api: Arc<dyn RestCollaborator>) -> Self {
        let (status_tx, _) = watch::channel(PanelStatus::default());
        Self {
            inner: Arc::new(PanelInner {
                kind,
                api,
                rows: RwLock::new(Vec::new()),
                flags: Mutex::new(RefreshFlags::default()),
                live: AtomicBool::new(true),
                status_tx,
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    /// 在注册表上订阅本面板的实体种类：任何通知都触发一次 (合并后的) 重新拉取。
    ///
    /// 回调只持有面板的弱引用，面板被释放后回调变为空操作。
    /// 返回的订阅也会被面板记录，`teardown` 时统一取消。
    pub fn attach(&self, registry: &SubscriberRegistry) -> Subscription {
        let weak = Arc::downgrade(&self.inner);
        let kind = self.inner.kind;
        let subscription = registry.subscribe(kind, move |notification| {
            if let Some(inner) = weak.upgrade() {
                debug!(
                    "[面板:{}] 收到通知 '{}' ({:?})，请求重新拉取。",
                    kind, notification.event_type, notification.action
                );
                PanelInner::request_refresh(&inner);
            }
            Ok(())
        });
        self.inner.subscriptions.lock().push(subscription.clone());
        subscription
    }

    /// 请求重新拉取。返回 `false` 表示面板已拆除或当前不在 tokio 运行时中。
    pub fn request_refresh(&self) -> bool {
        PanelInner::request_refresh(&self.inner)
    }

    /// 当前缓存的行 (最近一次成功拉取的结果)。
    pub fn rows(&self) -> Vec<Value> {
        self.inner.rows.read().clone()
    }

    pub fn status(&self) -> PanelStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// 等待当前没有拉取在进行。
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.status_tx.subscribe();
        // 发送端归面板所有，面板存活期间不会关闭。
        let _ = rx.wait_for(|status| !status.refreshing).await;
    }

    /// 拆除面板：取消全部订阅，之后完成的拉取结果被丢弃，不再接受刷新请求。
    pub fn teardown(&self) {
        if !self.inner.live.swap(false, Ordering::SeqCst) {
            return;
        }
        for subscription in self.inner.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
        info!("[面板:{}] 已拆除。", self.inner.kind);
    }
}

/// 等到第一次进入 Connected，然后让每个面板再拉取一次。
///
/// 挂载时的首次拉取与 WebSocket 握手之间有一段窗口，其间提交的变更不会以推送的形式到达。
/// 之后的重连由连接管理器发布全量刷新，这里只负责首次连接。
/// 状态通道在此之前关闭时返回 `false`。
pub async fn refresh_on_first_connect(
    mut state_rx: watch::Receiver<ConnectionState>,
    panels: Vec<PanelCache>,
) -> bool {
    let connected = state_rx
        .wait_for(|state| *state == ConnectionState::Connected)
        .await
        .is_ok();
    if !connected {
        debug!("[面板] 连接状态通道已关闭，跳过首次连接后的补拉。");
        return false;
    }
    info!("[面板] 首次连接已建立，{} 个面板补拉一次。", panels.len());
    for panel in &panels {
        panel.request_refresh();
    }
    true
}

impl PanelInner {
    fn request_refresh(this: &Arc<Self>) -> bool {
        if !this.live.load(Ordering::SeqCst) {
            debug!("[面板:{}] 已拆除，忽略刷新请求。", this.kind);
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("[面板:{}] 不在 tokio 运行时中，无法启动拉取任务。", this.kind);
            return false;
        };
        {
            let mut flags = this.flags.lock();
            if flags.in_flight {
                flags.dirty = true;
                return true;
            }
            flags.in_flight = true;
        }
        this.status_tx.send_modify(|status| status.refreshing = true);
        runtime.spawn(Self::run_refresh(this.clone()));
        true
    }

    async fn run_refresh(this: Arc<Self>) {
        loop {
            // 协作方 panic 时按一次失败处理，保证标志位总能复位。
            let result = match AssertUnwindSafe(this.api.list(this.kind)).catch_unwind().await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => {
                    error!("[面板:{}] 拉取任务发生 panic，按失败处理。", this.kind);
                    Err("拉取任务发生 panic".to_string())
                }
            };

            if !this.live.load(Ordering::SeqCst) {
                debug!("[面板:{}] 拉取完成时面板已拆除，结果被丢弃。", this.kind);
                *this.flags.lock() = RefreshFlags::default();
                this.status_tx.send_modify(|status| status.refreshing = false);
                return;
            }

            match result {
                Ok(rows) => {
                    debug!("[面板:{}] 拉取成功，共 {} 行。", this.kind, rows.len());
                    *this.rows.write() = rows;
                    this.status_tx.send_modify(|status| {
                        status.completed_refreshes += 1;
                        status.last_error = None;
                    });
                }
                Err(e) => {
                    warn!("[面板:{}] 拉取失败，继续显示上一次的数据: {}", this.kind, e);
                    this.status_tx.send_modify(|status| {
                        status.failed_refreshes += 1;
                        status.last_error = Some(e);
                    });
                }
            }

            let again = {
                let mut flags = this.flags.lock();
                if flags.dirty {
                    flags.dirty = false;
                    true
                } else {
                    flags.in_flight = false;
                    false
                }
            };
            if !again {
                this.status_tx.send_modify(|status| status.refreshing = false);
                return;
            }
            debug!("[面板:{}] 拉取期间收到新的通知，补拉一次。", this.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::ApiError;
    use crate::sync::reconciliation::ReconciliationPolicy;
    use async_trait::async_trait;
    use common_models::ServerEvent;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// 内存中的 REST 后端。设置 `gate` 后每次 `list` 需要先取得一个许可。
    #[derive(Default)]
    struct FakeBackend {
        rows: Mutex<Vec<Value>>,
        calls: AtomicUsize,
        fail: AtomicBool,
        panic_next: AtomicBool,
        gate: Option<Semaphore>,
    }

    #[async_trait]
    impl RestCollaborator for FakeBackend {
        async fn list(&self, _kind: EntityKind) -> Result<Vec<Value>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("测试信号量不应关闭").forget();
            }
            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("后端客户端内部错误");
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 503,
                    detail: "Service Unavailable".to_string(),
                });
            }
            Ok(self.rows.lock().clone())
        }
    }

    fn deliver(registry: &SubscriberRegistry, tag: &str, data: Value) {
        for notification in ReconciliationPolicy::default().plan(&ServerEvent::classify(tag, data)) {
            registry.publish(&notification);
        }
    }

    #[tokio::test]
    async fn test_duplicate_event_yields_same_cache_as_single_delivery() {
        let backend = Arc::new(FakeBackend::default());
        *backend.rows.lock() = vec![json!({"id": 7, "study_label": "STUDY-Y"})];

        let once_registry = SubscriberRegistry::new();
        let once = PanelCache::new(EntityKind::Study, backend.clone());
        once.attach(&once_registry);
        deliver(&once_registry, "study_updated", json!({"id": 7, "study_label": "STUDY-Y"}));
        once.wait_idle().await;

        let twice_registry = SubscriberRegistry::new();
        let twice = PanelCache::new(EntityKind::Study, backend.clone());
        twice.attach(&twice_registry);
        deliver(&twice_registry, "study_updated", json!({"id": 7, "study_label": "STUDY-Y"}));
        deliver(&twice_registry, "study_updated", json!({"id": 7, "study_label": "STUDY-Y"}));
        twice.wait_idle().await;

        assert_eq!(once.rows(), twice.rows());
        assert_eq!(twice.rows(), vec![json!({"id": 7, "study_label": "STUDY-Y"})]);
    }

    #[tokio::test]
    async fn test_requests_during_flight_coalesce_into_one_follow_up() {
        let backend = Arc::new(FakeBackend {
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        });
        let panel = PanelCache::new(EntityKind::Package, backend.clone());

        assert!(panel.request_refresh());
        assert!(panel.request_refresh());
        assert!(panel.request_refresh());
        assert!(panel.request_refresh());
        assert!(panel.status().refreshing);

        backend.gate.as_ref().expect("已设置").add_permits(2);
        panel.wait_idle().await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(panel.status().completed_refreshes, 2);
        assert!(!panel.status().refreshing);
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_last_known_good_rows() {
        let backend = Arc::new(FakeBackend::default());
        *backend.rows.lock() = vec![json!({"id": 1}), json!({"id": 2})];
        let panel = PanelCache::new(EntityKind::User, backend.clone());

        panel.request_refresh();
        panel.wait_idle().await;
        assert_eq!(panel.rows().len(), 2);

        backend.fail.store(true, Ordering::SeqCst);
        *backend.rows.lock() = Vec::new();
        panel.request_refresh();
        panel.wait_idle().await;

        assert_eq!(panel.rows().len(), 2);
        let status = panel.status();
        assert_eq!(status.failed_refreshes, 1);
        assert!(status.last_error.as_deref().unwrap_or_default().contains("503"));

        backend.fail.store(false, Ordering::SeqCst);
        panel.request_refresh();
        panel.wait_idle().await;
        assert!(panel.rows().is_empty());
        assert_eq!(panel.status().last_error, None);
    }

    #[tokio::test]
    async fn test_teardown_discards_in_flight_result_and_unsubscribes() {
        let backend = Arc::new(FakeBackend {
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        });
        *backend.rows.lock() = vec![json!({"id": 5})];
        let registry = SubscriberRegistry::new();
        let panel = PanelCache::new(EntityKind::ReportingEffort, backend.clone());
        panel.attach(&registry);
        assert_eq!(registry.subscriber_count(EntityKind::ReportingEffort), 1);

        assert!(panel.request_refresh());
        panel.teardown();
        assert_eq!(registry.subscriber_count(EntityKind::ReportingEffort), 0);
        assert!(!panel.request_refresh());

        backend.gate.as_ref().expect("已设置").add_permits(1);
        panel.wait_idle().await;
        assert!(panel.rows().is_empty());
        assert_eq!(panel.status().completed_refreshes, 0);
    }

    #[tokio::test]
    async fn test_dropped_panel_turns_callback_into_no_op() {
        let backend = Arc::new(FakeBackend::default());
        let registry = SubscriberRegistry::new();
        let panel = PanelCache::new(EntityKind::AuditTrail, backend.clone());
        panel.attach(&registry);
        drop(panel);

        deliver(&registry, "audit_trail_created", json!({"id": 1}));
        tokio::task::yield_now().await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_collaborator_counts_as_failure_and_panel_recovers() {
        let backend = Arc::new(FakeBackend::default());
        backend.panic_next.store(true, Ordering::SeqCst);
        *backend.rows.lock() = vec![json!({"id": 4, "study_label": "STUDY-P"})];
        let panel = PanelCache::new(EntityKind::Study, backend.clone());

        assert!(panel.request_refresh());
        panel.wait_idle().await;
        let status = panel.status();
        assert!(!status.refreshing);
        assert_eq!(status.failed_refreshes, 1);
        assert!(status.last_error.is_some());
        assert!(panel.rows().is_empty());

        assert!(panel.request_refresh());
        panel.wait_idle().await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(panel.rows(), vec![json!({"id": 4, "study_label": "STUDY-P"})]);
        assert_eq!(panel.status().last_error, None);
    }

    #[tokio::test]
    async fn test_first_connect_triggers_one_catch_up_refetch() {
        let backend = Arc::new(FakeBackend::default());
        let studies = PanelCache::new(EntityKind::Study, backend.clone());
        let packages = PanelCache::new(EntityKind::Package, backend.clone());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let task = tokio::spawn(refresh_on_first_connect(state_rx, vec![studies.clone(), packages.clone()]));

        state_tx.send_replace(ConnectionState::Connecting);
        tokio::task::yield_now().await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        state_tx.send_replace(ConnectionState::Connected);
        assert!(task.await.expect("补拉任务不应 panic"));
        studies.wait_idle().await;
        packages.wait_idle().await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        // 之后的重连不再由这里补拉。
        state_tx.send_replace(ConnectionState::Disconnected);
        state_tx.send_replace(ConnectionState::Connected);
        tokio::task::yield_now().await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_connect_refresh_gives_up_when_state_channel_closes() {
        let backend = Arc::new(FakeBackend::default());
        let panel = PanelCache::new(EntityKind::User, backend.clone());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        drop(state_tx);

        assert!(!refresh_on_first_connect(state_rx, vec![panel]).await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
