// ReportingDashboard/src/sync/reconciliation.rs

//! 协调策略：决定一个事件需要让哪些面板刷新。
//!
//! 后端发送的是通知而不是差量，负载即便存在也只是完整记录或完整集合。
//! 因此任何变更都让相关面板整体重新拉取：重新拉取并替换天然幂等，重复投递和
//! 乱序投递都不会破坏缓存，最后一次拉取的结果即为最终状态。
//!
//! 面板在渲染时会把父实体的标签反规范化到子实体行上 (例如报告工作行上的
//! "Study Label" 列)，所以父实体变更时，依赖它的面板也要刷新。

use common_models::{ChangeKind, EntityKind, ServerEvent};
use serde_json::Value;
use std::collections::HashMap;

/// 服务端 `refresh_needed` 之外，本地在重连成功后合成的全量刷新事件类型。
pub const CONNECTION_RESTORED_EVENT: &str = "connection_restored";

/// 面板收到通知后应采取的刷新方式。
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshAction {
    /// 事件携带了该集合的完整快照 (如 `studies_update`)。
    ReplaceCollection,
    /// 该种类的某条记录发生了变更。
    RefetchCollection {
        change: ChangeKind,
        record_id: Option<i64>,
    },
    /// 父实体 `source` 变更，本面板上反规范化的标签可能已过期。
    RefreshDependents { source: EntityKind },
    /// 无法确定影响范围，全部重新拉取。
    FullResync,
}

/// 交给某一实体种类订阅者的一条通知。
#[derive(Debug, Clone, PartialEq)]
pub struct SyncNotification {
    pub kind: EntityKind,
    /// 原始事件类型标签，例如 `study_created`。
    pub event_type: String,
    pub data: Value,
    pub action: RefreshAction,
}

/// 每个实体种类的依赖面板表。
#[derive(Debug, Clone)]
pub struct ReconciliationPolicy {
    dependents: HashMap<EntityKind, Vec<EntityKind>>,
    audit_follows_changes: bool,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        let mut dependents = HashMap::new();
        dependents.insert(
            EntityKind::Study,
            vec![EntityKind::DatabaseRelease, EntityKind::ReportingEffort],
        );
        dependents.insert(EntityKind::DatabaseRelease, vec![EntityKind::ReportingEffort]);
        dependents.insert(EntityKind::Package, vec![EntityKind::PackageItem]);
        dependents.insert(EntityKind::PackageItem, vec![EntityKind::Package]);
        Self {
            dependents,
            audit_follows_changes: true,
        }
    }
}

impl ReconciliationPolicy {
    /// 没有任何依赖关系的策略：只刷新事件本身的实体种类。
    pub fn without_dependents() -> Self {
        Self {
            dependents: HashMap::new(),
            audit_follows_changes: false,
        }
    }

    /// 追加一条依赖：`parent` 变更时 `child` 面板也刷新。
    pub fn with_dependent(mut self, parent: EntityKind, child: EntityKind) -> Self {
        let children = self.dependents.entry(parent).or_default();
        if !children.contains(&child) && parent != child {
            children.push(child);
        }
        self
    }

    /// 记录变更是否也让审计轨迹面板刷新 (后端为每次增删改追加一条审计记录)。
    pub fn with_audit_following(mut self, enabled: bool) -> Self {
        self.audit_follows_changes = enabled;
        self
    }

    pub fn dependents_of(&self, kind: EntityKind) -> &[EntityKind] {
        self.dependents.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 为一个服务端事件制定刷新计划。
    ///
    /// 主实体种类排在最前，其后是依赖面板，每个种类最多出现一次。
    /// `pong`、`error` 与未知类型不产生任何通知。
    pub fn plan(&self, event: &ServerEvent) -> Vec<SyncNotification> {
        let event_type = event.type_tag();
        match event {
            ServerEvent::CollectionSnapshot { kind, data } => {
                self.fan_out(*kind, &event_type, data, RefreshAction::ReplaceCollection, false)
            }
            ServerEvent::RecordChanged { kind, change, data } => {
                let action = RefreshAction::RefetchCollection {
                    change: *change,
                    record_id: event.record_id(),
                };
                self.fan_out(*kind, &event_type, data, action, self.audit_follows_changes)
            }
            ServerEvent::RefreshNeeded => self.full_resync(&event_type),
            ServerEvent::Pong | ServerEvent::ServerError { .. } | ServerEvent::Unrecognized { .. } => Vec::new(),
        }
    }

    /// 每种实体各一条 `FullResync` 通知。
    pub fn full_resync(&self, event_type: &str) -> Vec<SyncNotification> {
        EntityKind::ALL
            .into_iter()
            .map(|kind| SyncNotification {
                kind,
                event_type: event_type.to_string(),
                data: Value::Null,
                action: RefreshAction::FullResync,
            })
            .collect()
    }

    fn fan_out(
        &self,
        source: EntityKind,
        event_type: &str,
        data: &Value,
        primary_action: RefreshAction,
        include_audit: bool,
    ) -> Vec<SyncNotification> {
        let mut plan = vec![SyncNotification {
            kind: source,
            event_type: event_type.to_string(),
            data: data.clone(),
            action: primary_action,
        }];
        let mut extra: Vec<EntityKind> = self.dependents_of(source).to_vec();
        if include_audit && source != EntityKind::AuditTrail {
            extra.push(EntityKind::AuditTrail);
        }
        for kind in extra {
            if plan.iter().any(|n| n.kind == kind) {
                continue;
            }
            plan.push(SyncNotification {
                kind,
                event_type: event_type.to_string(),
                data: data.clone(),
                action: RefreshAction::RefreshDependents { source },
            });
        }
        plan
    }
}
