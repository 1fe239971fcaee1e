// ReportingDashboard/src/sync/registry.rs

//! 订阅者注册表：按实体种类分发同步通知。
//!
//! 回调在调用 `publish` 的线程上同步执行，按注册顺序依次调用。
//! 调用前先对回调列表做快照，因此回调内部可以安全地订阅或取消订阅，
//! 这些变化只影响下一次 `publish`。单个回调返回错误或 panic 时只记录日志，
//! 不会阻止其余回调执行。

use common_models::EntityKind;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use super::reconciliation::SyncNotification;

/// 订阅回调的类型。返回 `Err` 表示该回调自身处理失败。
pub type NotificationHandler = Arc<dyn Fn(&SyncNotification) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: HashMap<EntityKind, Vec<(u64, NotificationHandler)>>,
}

/// 一次 `publish` 的结果统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// 被调用的回调数量 (包括失败的)。
    pub invoked: usize,
    /// 返回错误或 panic 的回调数量。
    pub failed: usize,
}

/// 订阅者注册表。克隆得到的是同一个注册表的另一个句柄。
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        let counts: HashMap<EntityKind, usize> = inner.handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("SubscriberRegistry").field("handlers", &counts).finish()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为 `kind` 注册一个回调，返回可用于取消订阅的句柄。
    ///
    /// 丢弃返回的 `Subscription` 不会取消订阅；需要显式调用 `unsubscribe`。
    pub fn subscribe<F>(&self, kind: EntityKind, handler: F) -> Subscription
    where
        F: Fn(&SyncNotification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.handlers.entry(kind).or_default().push((id, Arc::new(handler)));
            id
        };
        debug!("[订阅注册表] 已为 {} 注册回调 #{}", kind, id);
        Subscription {
            registry: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// 把通知交给 `notification.kind` 的全部回调。
    pub fn publish(&self, notification: &SyncNotification) -> PublishReport {
        let snapshot: Vec<(u64, NotificationHandler)> = {
            let inner = self.inner.lock();
            inner.handlers.get(&notification.kind).cloned().unwrap_or_default()
        };

        let mut report = PublishReport::default();
        for (id, handler) in snapshot {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(
                        "[订阅注册表] {} 的回调 #{} 处理事件 '{}' 时返回错误: {:#}",
                        notification.kind, id, notification.event_type, e
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    error!(
                        "[订阅注册表] {} 的回调 #{} 处理事件 '{}' 时发生 panic，已隔离。",
                        notification.kind, id, notification.event_type
                    );
                }
            }
        }
        report
    }

    pub fn subscriber_count(&self, kind: EntityKind) -> usize {
        self.inner.lock().handlers.get(&kind).map_or(0, Vec::len)
    }
}

/// 一次订阅的句柄。克隆出的句柄指向同一个回调。
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<Mutex<RegistryInner>>,
    kind: EntityKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// 取消订阅。可以重复调用；注册表已被释放时也是安全的空操作。
    ///
    /// 返回本次调用是否真的移除了回调。
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut inner = inner.lock();
        let Some(list) = inner.handlers.get_mut(&self.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != self.id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.handlers.remove(&self.kind);
        }
        if removed {
            debug!("[订阅注册表] 已取消 {} 的回调 #{}", self.kind, self.id);
        }
        removed
    }
}
