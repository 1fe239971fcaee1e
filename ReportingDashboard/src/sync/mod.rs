// ReportingDashboard/src/sync/mod.rs

//! 推送通知与本地缓存之间的协调层。
//!
//! - `dispatcher`: 解析原始文本帧并按类型分发。
//! - `reconciliation`: 把一个服务端事件翻译成一组面板通知 (哪些实体种类需要刷新、以何种方式)。
//! - `registry`: 订阅者注册表，按实体种类把通知交给已注册的回调。
//! - `panel`: 无界面的面板缓存，收到通知后通过 REST 协作方重新拉取整个集合。

pub mod dispatcher;
pub mod panel;
pub mod reconciliation;
pub mod registry;

pub use dispatcher::{DispatchOutcome, DropReason, MessageDispatcher};
pub use panel::{refresh_on_first_connect, PanelCache, PanelStatus};
pub use reconciliation::{ReconciliationPolicy, RefreshAction, SyncNotification};
pub use registry::{PublishReport, SubscriberRegistry, Subscription};
