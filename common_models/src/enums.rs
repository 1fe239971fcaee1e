//! 通用枚举模块。
//!
//! 定义同步层中多个组件共享的实体种类与变更种类。每个实体种类在线路上有三种写法：
//! 事件前缀 (单数，如 `package_item_created` 中的 `package_item`)、
//! 订阅主题 (复数，如 `studies_update` 中的 `studies`) 和 REST 资源路径
//! (如 `/api/v1/database-releases`)。三者的对应关系只在这里维护。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 后台管理的实体种类。
///
/// 一个面板 (panel) 绑定一种实体的本地缓存集合；订阅者注册表也以此作为键。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// 研究 (Study)。
    Study,
    /// 数据库发布 (Database Release)，隶属于某个研究。
    DatabaseRelease,
    /// 报告工作 (Reporting Effort)，隶属于某个数据库发布。
    ReportingEffort,
    /// 包 (Package)。
    Package,
    /// 包条目 (Package Item)，隶属于某个包。
    PackageItem,
    /// 用户。
    User,
    /// 审计轨迹条目。后端对每次增删改都会追加一条记录。
    AuditTrail,
}

impl EntityKind {
    /// 全部实体种类，按面板的常规展示顺序排列。
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Study,
        EntityKind::DatabaseRelease,
        EntityKind::ReportingEffort,
        EntityKind::Package,
        EntityKind::PackageItem,
        EntityKind::User,
        EntityKind::AuditTrail,
    ];

    /// 单条记录变更事件使用的前缀，例如 `study` -> `study_created`。
    pub fn event_prefix(&self) -> &'static str {
        match self {
            EntityKind::Study => "study",
            EntityKind::DatabaseRelease => "database_release",
            EntityKind::ReportingEffort => "reporting_effort",
            EntityKind::Package => "package",
            EntityKind::PackageItem => "package_item",
            EntityKind::User => "user",
            EntityKind::AuditTrail => "audit_trail",
        }
    }

    /// 订阅主题名 (复数形式)，也用于整集合快照事件 `<topic>_update`。
    pub fn topic(&self) -> &'static str {
        match self {
            EntityKind::Study => "studies",
            EntityKind::DatabaseRelease => "database_releases",
            EntityKind::ReportingEffort => "reporting_efforts",
            EntityKind::Package => "packages",
            EntityKind::PackageItem => "package_items",
            EntityKind::User => "users",
            EntityKind::AuditTrail => "audit_trail",
        }
    }

    /// REST 集合端点的资源路径段，即 `/api/v1/<resource>` 中的 `<resource>`。
    pub fn resource_path(&self) -> &'static str {
        match self {
            EntityKind::Study => "studies",
            EntityKind::DatabaseRelease => "database-releases",
            EntityKind::ReportingEffort => "reporting-efforts",
            EntityKind::Package => "packages",
            EntityKind::PackageItem => "package-items",
            EntityKind::User => "users",
            EntityKind::AuditTrail => "audit-trail",
        }
    }

    /// 根据事件前缀查找实体种类。
    pub fn from_event_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.event_prefix() == prefix)
    }

    /// 根据订阅主题名查找实体种类。
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == topic)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic())
    }
}

/// 解析订阅主题名失败时返回的错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityKind(pub String);

impl fmt::Display for UnknownEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "未知的实体种类: '{}'", self.0)
    }
}

impl std::error::Error for UnknownEntityKind {}

/// 同时接受主题名 (`packages`) 和事件前缀 (`package`)。
impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_topic(s)
            .or_else(|| Self::from_event_prefix(s))
            .ok_or_else(|| UnknownEntityKind(s.to_string()))
    }
}

/// 单条记录的变更种类。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// 事件类型标签中的后缀，例如 `created`。
    pub fn suffix(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "created" => Some(ChangeKind::Created),
            "updated" => Some(ChangeKind::Updated),
            "deleted" => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}
