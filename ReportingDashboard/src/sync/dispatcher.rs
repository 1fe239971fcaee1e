// ReportingDashboard/src/sync/dispatcher.rs

//! 消息分发器：把原始文本帧变成订阅者通知。
//!
//! 处理流程：解析 `{type, data}` 信封 -> `ServerEvent::classify` 分类 ->
//! `ReconciliationPolicy::plan` 制定刷新计划 -> 逐条交给 `SubscriberRegistry`。
//! 分发器从不返回错误，也从不 panic；格式错误、缺少 `type` 或未知类型的帧
//! 只记录日志并丢弃，不影响连接状态。

use chrono::{DateTime, Utc};
use common_models::{EntityKind, ServerEvent};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use rust_websocket_utils::error::WsError;
use rust_websocket_utils::message::WsEnvelope;
use std::sync::Arc;

use super::reconciliation::{ReconciliationPolicy, CONNECTION_RESTORED_EVENT};
use super::registry::SubscriberRegistry;

/// 帧被丢弃的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 不是合法的 JSON 对象。
    Malformed,
    /// JSON 对象中没有字符串类型的 `type` 字段。
    MissingType,
}

/// 一帧的分发结果，主要供日志和测试使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dropped(DropReason),
    /// 通知已交给订阅者。`kinds` 按计划顺序列出收到通知的实体种类，
    /// `callbacks` 是被调用的回调总数 (可能为 0，例如尚无面板订阅)。
    Delivered {
        event_type: String,
        kinds: Vec<EntityKind>,
        callbacks: usize,
    },
    /// `pong`
    Heartbeat,
    /// 服务端报告的错误，只记录日志。
    ServerError,
    /// 未知的类型标签，只记录日志。
    Unrecognized(String),
}

/// 消息分发器。克隆得到的句柄共享同一个注册表和心跳时间戳。
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    registry: SubscriberRegistry,
    policy: Arc<ReconciliationPolicy>,
    last_pong_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl MessageDispatcher {
    pub fn new(registry: SubscriberRegistry, policy: ReconciliationPolicy) -> Self {
        Self {
            registry,
            policy: Arc::new(policy),
            last_pong_at: Arc::new(RwLock::new(None)),
        }
    }

    /// 最近一次收到 `pong` 的时间。只用于观测，没有超时判定。
    pub fn last_pong_at(&self) -> Option<DateTime<Utc>> {
        *self.last_pong_at.read()
    }

    /// 分发一个原始文本帧。
    pub fn dispatch_frame(&self, raw: &str) -> DispatchOutcome {
        match WsEnvelope::parse(raw) {
            Ok(envelope) => {
                let event = ServerEvent::classify(&envelope.message_type, envelope.data);
                self.dispatch_event(&event)
            }
            Err(WsError::MissingMessageType) => {
                warn!("[分发器] 未知消息类型：帧中缺少 'type' 字段，已丢弃: '{}'", raw);
                DispatchOutcome::Dropped(DropReason::MissingType)
            }
            Err(e) => {
                warn!("[分发器] 无法解析的帧，已丢弃: {}", e);
                DispatchOutcome::Dropped(DropReason::Malformed)
            }
        }
    }

    /// 分发一个已分类的事件。
    pub fn dispatch_event(&self, event: &ServerEvent) -> DispatchOutcome {
        match event {
            ServerEvent::Pong => {
                debug!("[分发器] 收到 pong。");
                *self.last_pong_at.write() = Some(Utc::now());
                DispatchOutcome::Heartbeat
            }
            ServerEvent::ServerError { data } => {
                error!("[分发器] 服务端报告错误: {}", data);
                DispatchOutcome::ServerError
            }
            ServerEvent::Unrecognized { type_tag } => {
                info!("[分发器] 未知消息类型 '{}'，已忽略。", type_tag);
                DispatchOutcome::Unrecognized(type_tag.clone())
            }
            ServerEvent::CollectionSnapshot { .. } | ServerEvent::RecordChanged { .. } | ServerEvent::RefreshNeeded => {
                self.deliver(event.type_tag(), self.policy.plan(event))
            }
        }
    }

    /// 重连成功后调用：连接中断期间可能错过了事件，让所有面板全量刷新。
    pub fn on_connection_restored(&self) -> DispatchOutcome {
        info!("[分发器] 连接已恢复，通知全部面板重新同步。");
        self.deliver(
            CONNECTION_RESTORED_EVENT.to_string(),
            self.policy.full_resync(CONNECTION_RESTORED_EVENT),
        )
    }

    fn deliver(&self, event_type: String, plan: Vec<super::SyncNotification>) -> DispatchOutcome {
        let mut kinds = Vec::with_capacity(plan.len());
        let mut callbacks = 0;
        for notification in &plan {
            let report = self.registry.publish(notification);
            callbacks += report.invoked;
            kinds.push(notification.kind);
        }
        debug!(
            "[分发器] 事件 '{}' 已通知 {:?}，共调用 {} 个回调。",
            event_type, kinds, callbacks
        );
        DispatchOutcome::Delivered {
            event_type,
            kinds,
            callbacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::reconciliation::SyncNotification;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    type Seen = Arc<Mutex<Vec<(EntityKind, String, Value)>>>;

    fn dispatcher_recording_all_kinds() -> (MessageDispatcher, Seen) {
        let registry = SubscriberRegistry::new();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        for kind in EntityKind::ALL {
            let seen = seen.clone();
            registry.subscribe(kind, move |n: &SyncNotification| {
                seen.lock().push((n.kind, n.event_type.clone(), n.data.clone()));
                Ok(())
            });
        }
        (MessageDispatcher::new(registry, ReconciliationPolicy::default()), seen)
    }

    #[test]
    fn test_every_record_change_tag_reaches_its_kind_first() {
        let (dispatcher, seen) = dispatcher_recording_all_kinds();
        for kind in EntityKind::ALL {
            for change in ["created", "updated", "deleted"] {
                seen.lock().clear();
                let tag = format!("{}_{}", kind.event_prefix(), change);
                let frame = json!({"type": tag, "data": {"id": 11}}).to_string();

                let outcome = dispatcher.dispatch_frame(&frame);
                let DispatchOutcome::Delivered { event_type, kinds, .. } = outcome else {
                    panic!("{} 应被投递，实际: {:?}", tag, outcome);
                };
                assert_eq!(event_type, tag);
                assert_eq!(kinds[0], kind);
                let seen = seen.lock();
                assert_eq!(seen[0], (kind, tag.clone(), json!({"id": 11})));
            }
        }
    }

    #[test]
    fn test_studies_update_is_delivered_as_snapshot() {
        let (dispatcher, seen) = dispatcher_recording_all_kinds();
        let outcome = dispatcher.dispatch_frame(r#"{"type":"studies_update","data":[{"id":1}]}"#);
        assert!(matches!(outcome, DispatchOutcome::Delivered { ref kinds, .. } if kinds[0] == EntityKind::Study));
        assert_eq!(seen.lock()[0].2, json!([{"id": 1}]));
    }

    #[test]
    fn test_refresh_needed_notifies_every_kind() {
        let (dispatcher, seen) = dispatcher_recording_all_kinds();
        let outcome = dispatcher.dispatch_frame(r#"{"type":"refresh_needed"}"#);
        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                event_type: "refresh_needed".to_string(),
                kinds: EntityKind::ALL.to_vec(),
                callbacks: EntityKind::ALL.len(),
            }
        );
        assert!(seen.lock().iter().all(|(_, tag, data)| tag == "refresh_needed" && data.is_null()));
    }

    #[test]
    fn test_control_frames_notify_nobody() {
        let (dispatcher, seen) = dispatcher_recording_all_kinds();
        assert!(dispatcher.last_pong_at().is_none());

        assert_eq!(dispatcher.dispatch_frame(r#"{"type":"pong"}"#), DispatchOutcome::Heartbeat);
        assert!(dispatcher.last_pong_at().is_some());
        assert_eq!(
            dispatcher.dispatch_frame(r#"{"type":"error","data":{"detail":"boom"}}"#),
            DispatchOutcome::ServerError
        );
        assert_eq!(
            dispatcher.dispatch_frame(r#"{"type":"study_archived","data":{"id":1}}"#),
            DispatchOutcome::Unrecognized("study_archived".to_string())
        );
        assert_eq!(
            dispatcher.dispatch_frame(r#"{"type":"Study_Created"}"#),
            DispatchOutcome::Unrecognized("Study_Created".to_string())
        );
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_malformed_frames_are_dropped_silently() {
        let (dispatcher, seen) = dispatcher_recording_all_kinds();
        assert_eq!(dispatcher.dispatch_frame("not json {"), DispatchOutcome::Dropped(DropReason::Malformed));
        assert_eq!(dispatcher.dispatch_frame("[1, 2, 3]"), DispatchOutcome::Dropped(DropReason::Malformed));
        assert_eq!(dispatcher.dispatch_frame(""), DispatchOutcome::Dropped(DropReason::Malformed));
        assert_eq!(
            dispatcher.dispatch_frame(r#"{"data":{"id":1}}"#),
            DispatchOutcome::Dropped(DropReason::MissingType)
        );
        assert_eq!(
            dispatcher.dispatch_frame(r#"{"type":42}"#),
            DispatchOutcome::Dropped(DropReason::MissingType)
        );
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_connection_restored_resyncs_every_kind() {
        let (dispatcher, seen) = dispatcher_recording_all_kinds();
        let outcome = dispatcher.on_connection_restored();
        assert!(matches!(outcome, DispatchOutcome::Delivered { ref event_type, .. } if event_type == CONNECTION_RESTORED_EVENT));
        assert_eq!(seen.lock().len(), EntityKind::ALL.len());
    }
}
