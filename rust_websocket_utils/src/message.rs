// rust_websocket_utils/src/message.rs

//! 定义 WebSocket 通信中使用的信封结构。
//!
//! 服务端推送的每一帧都是 `{"type": "<event-type>", "data": <payload>}`，
//! `data` 可以省略。本模块只负责信封层面的解析，`type` 的业务含义由上层解释。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WsError;

/// `{type, data}` 信封。
///
/// 信封不可变，只被接收一次，解析、分发后即丢弃，不做持久化。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WsEnvelope {
    /// 事件类型标签，例如 `study_created`。
    #[serde(rename = "type")]
    pub message_type: String,

    /// 事件负载。缺省时为 `Value::Null`，序列化时省略。
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl WsEnvelope {
    /// 用任意可序列化的负载构造信封。
    pub fn new<T: Serialize>(message_type: impl Into<String>, payload: &T) -> Result<Self, WsError> {
        let data = serde_json::to_value(payload)
            .map_err(|e| WsError::SerializationError(format!("序列化信封负载失败: {}", e)))?;
        Ok(Self {
            message_type: message_type.into(),
            data,
        })
    }

    /// 不带负载的信封，例如 `refresh_needed`。
    pub fn without_data(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            data: Value::Null,
        }
    }

    /// 解析一个原始文本帧。
    ///
    /// 先按任意 JSON 解析，再提取 `type`，这样可以把 "不是 JSON" 和 "缺少 type"
    /// 区分成两种错误，分别记录日志。
    pub fn parse(raw: &str) -> Result<Self, WsError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            WsError::DeserializationError(format!("文本帧不是合法 JSON: {}, 原始文本: '{}'", e, raw))
        })?;
        let Value::Object(mut object) = value else {
            return Err(WsError::DeserializationError(format!(
                "文本帧不是 JSON 对象, 原始文本: '{}'",
                raw
            )));
        };
        let message_type = match object.remove("type") {
            Some(Value::String(message_type)) => message_type,
            _ => return Err(WsError::MissingMessageType),
        };
        let data = object.remove("data").unwrap_or(Value::Null);
        Ok(Self { message_type, data })
    }

    /// 将信封序列化为 JSON 文本。
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self)
            .map_err(|e| WsError::SerializationError(format!("信封序列化为JSON失败: {}", e)))
    }

    /// 将负载反序列化为指定类型。
    pub fn deserialize_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, WsError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            WsError::DeserializationError(format!("信封负载反序列化为目标类型失败: {}, 原始负载: '{}'", e, self.data))
        })
    }
}

/// 把任意可序列化的出站帧 (如 `{"action": "ping"}`) 编码为文本。
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<String, WsError> {
    serde_json::to_string(frame)
        .map_err(|e| WsError::SerializationError(format!("出站帧序列化失败: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_models::ClientAction;
    use serde_json::json;

    #[test]
    fn test_parse_envelope_with_and_without_data() {
        let envelope = WsEnvelope::parse(r#"{"type":"study_created","data":{"id":7,"study_label":"STUDY-X"}}"#)
            .expect("合法信封应当解析成功");
        assert_eq!(envelope.message_type, "study_created");
        assert_eq!(envelope.data, json!({"id": 7, "study_label": "STUDY-X"}));

        let bare = WsEnvelope::parse(r#"{"type":"refresh_needed"}"#).expect("无负载信封应当解析成功");
        assert_eq!(bare, WsEnvelope::without_data("refresh_needed"));
        assert_eq!(bare.to_json().unwrap(), r#"{"type":"refresh_needed"}"#);
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        for raw in ["not json", "{", "[1,2,3]", "\"pong\"", ""] {
            match WsEnvelope::parse(raw) {
                Err(WsError::DeserializationError(_)) => {}
                other => panic!("'{}' 应当返回 DeserializationError，实际为 {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_parse_requires_string_type() {
        for raw in [r#"{"data":{}}"#, r#"{"type":42}"#, r#"{"type":null}"#] {
            assert!(
                matches!(WsEnvelope::parse(raw), Err(WsError::MissingMessageType)),
                "'{}' 应当被判定为缺少 type",
                raw
            );
        }
    }

    #[test]
    fn test_deserialize_data_to_typed_payload() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct StudyRow {
            id: i64,
            study_label: String,
        }
        let envelope = WsEnvelope::new("study_updated", &json!({"id": 3, "study_label": "S-3"})).unwrap();
        let row: StudyRow = envelope.deserialize_data().unwrap();
        assert_eq!(row, StudyRow { id: 3, study_label: "S-3".to_string() });

        let mismatch: Result<Vec<i64>, WsError> = envelope.deserialize_data();
        assert!(matches!(mismatch, Err(WsError::DeserializationError(_))));
    }

    #[test]
    fn test_encode_client_action() {
        assert_eq!(encode_frame(&ClientAction::Ping).unwrap(), r#"{"action":"ping"}"#);
    }
}
