// common_models/src/ws_payloads.rs

//! WebSocket 通信中使用的消息类型与负载定义。
//!
//! 服务端推送的每一帧都是 `{type, data}` 信封；`type` 决定事件含义，`data`
//! 是不透明的 JSON (通常是完整的变更记录或完整集合，从不是增量)。
//! 客户端发出的帧只有 `{action}` 一种形式。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{ChangeKind, EntityKind};

/// 服务端要求客户端重新拉取全部相关数据。无负载。
pub const REFRESH_NEEDED_MESSAGE_TYPE: &str = "refresh_needed";
/// 心跳应答。
pub const PONG_MESSAGE_TYPE: &str = "pong";
/// 服务端报告的错误。
pub const ERROR_MESSAGE_TYPE: &str = "error";
/// 整集合快照事件的后缀，例如 `studies_update`。
pub const COLLECTION_UPDATE_SUFFIX: &str = "_update";

/// 客户端发往服务端的动作帧，序列化为 `{"action": "ping"}` 这样的形式。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// 保活心跳。
    Ping,
    /// 请求服务端重新推送当前状态。
    Refresh,
}

/// 按 `type` 标签分类后的服务端事件。
///
/// 分类是穷尽的：任何无法识别的标签都落入 `Unrecognized`，由调用方记录日志后忽略，
/// 从而兼容后端将来新增的事件类型。
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// `<topic>_update`：某个集合的完整快照 (目前后端只发送 `studies_update`)。
    CollectionSnapshot { kind: EntityKind, data: Value },
    /// `<prefix>_created|_updated|_deleted`：单条记录变更。
    RecordChanged {
        kind: EntityKind,
        change: ChangeKind,
        data: Value,
    },
    /// `refresh_needed`
    RefreshNeeded,
    /// `pong`
    Pong,
    /// `error`
    ServerError { data: Value },
    /// 未知类型，只记录日志。
    Unrecognized { type_tag: String },
}

impl ServerEvent {
    /// 根据类型标签和负载构造事件。标签必须精确匹配，不做大小写或空白归一化。
    pub fn classify(type_tag: &str, data: Value) -> Self {
        match type_tag {
            REFRESH_NEEDED_MESSAGE_TYPE => return ServerEvent::RefreshNeeded,
            PONG_MESSAGE_TYPE => return ServerEvent::Pong,
            ERROR_MESSAGE_TYPE => return ServerEvent::ServerError { data },
            _ => {}
        }

        if let Some(kind) = type_tag
            .strip_suffix(COLLECTION_UPDATE_SUFFIX)
            .and_then(EntityKind::from_topic)
        {
            return ServerEvent::CollectionSnapshot { kind, data };
        }

        if let Some((prefix, suffix)) = type_tag.rsplit_once('_') {
            if let (Some(kind), Some(change)) = (
                EntityKind::from_event_prefix(prefix),
                ChangeKind::from_suffix(suffix),
            ) {
                return ServerEvent::RecordChanged { kind, change, data };
            }
        }

        ServerEvent::Unrecognized {
            type_tag: type_tag.to_string(),
        }
    }

    /// 还原出线路上的类型标签。
    pub fn type_tag(&self) -> String {
        match self {
            ServerEvent::CollectionSnapshot { kind, .. } => {
                format!("{}{}", kind.topic(), COLLECTION_UPDATE_SUFFIX)
            }
            ServerEvent::RecordChanged { kind, change, .. } => {
                format!("{}_{}", kind.event_prefix(), change.suffix())
            }
            ServerEvent::RefreshNeeded => REFRESH_NEEDED_MESSAGE_TYPE.to_string(),
            ServerEvent::Pong => PONG_MESSAGE_TYPE.to_string(),
            ServerEvent::ServerError { .. } => ERROR_MESSAGE_TYPE.to_string(),
            ServerEvent::Unrecognized { type_tag } => type_tag.clone(),
        }
    }

    /// 单条记录事件中受影响记录的 `id` (如果负载里有)。
    pub fn record_id(&self) -> Option<i64> {
        match self {
            ServerEvent::RecordChanged { data, .. } => data.get("id").and_then(Value::as_i64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_action_wire_format() {
        assert_eq!(serde_json::to_string(&ClientAction::Ping).unwrap(), r#"{"action":"ping"}"#);
        assert_eq!(serde_json::to_string(&ClientAction::Refresh).unwrap(), r#"{"action":"refresh"}"#);
        let parsed: ClientAction = serde_json::from_str(r#"{"action":"refresh"}"#).unwrap();
        assert_eq!(parsed, ClientAction::Refresh);
    }

    #[test]
    fn test_classify_record_changes_for_every_kind() {
        for kind in EntityKind::ALL {
            for change in [ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted] {
                let tag = format!("{}_{}", kind.event_prefix(), change.suffix());
                let event = ServerEvent::classify(&tag, json!({"id": 1}));
                assert_eq!(
                    event,
                    ServerEvent::RecordChanged { kind, change, data: json!({"id": 1}) },
                    "标签 '{}' 分类错误",
                    tag
                );
                assert_eq!(event.type_tag(), tag);
            }
        }
    }

    #[test]
    fn test_classify_collection_and_control_messages() {
        assert_eq!(
            ServerEvent::classify("studies_update", json!([])),
            ServerEvent::CollectionSnapshot { kind: EntityKind::Study, data: json!([]) }
        );
        assert_eq!(ServerEvent::classify("refresh_needed", Value::Null), ServerEvent::RefreshNeeded);
        assert_eq!(ServerEvent::classify("pong", Value::Null), ServerEvent::Pong);
        assert_eq!(
            ServerEvent::classify("error", json!({"detail": "boom"})),
            ServerEvent::ServerError { data: json!({"detail": "boom"}) }
        );
    }

    #[test]
    fn test_classify_unknown_tags() {
        for tag in ["", "study", "study_archived", "Study_created", "widgets_update", "studies_updated"] {
            assert_eq!(
                ServerEvent::classify(tag, Value::Null),
                ServerEvent::Unrecognized { type_tag: tag.to_string() },
                "标签 '{}' 应当无法识别",
                tag
            );
        }
    }

    #[test]
    fn test_record_id_extraction() {
        let event = ServerEvent::classify("study_updated", json!({"id": 7, "study_label": "STUDY-X"}));
        assert_eq!(event.record_id(), Some(7));
        assert_eq!(ServerEvent::classify("study_deleted", json!({})).record_id(), None);
        assert_eq!(ServerEvent::RefreshNeeded.record_id(), None);
    }
}
