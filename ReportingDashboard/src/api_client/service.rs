// ReportingDashboard/src/api_client/service.rs

//! REST 集合端点客户端的实现。

use async_trait::async_trait;
use common_models::EntityKind;
use log::{debug, error};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// REST 调用失败的原因。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 网络层面的失败：DNS、拒绝连接、超时等。
    #[error("网络错误: {0}")]
    Network(String),

    /// 后端返回了非 2xx 状态码。`detail` 取自 `{"detail": "..."}` 响应体 (如有)。
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    /// 响应体不是期望的 JSON 结构。
    #[error("响应解析错误: {0}")]
    Decode(String),
}

/// 面板重新拉取数据所依赖的接口。
///
/// 以 trait 的形式存在，使面板缓存可以在测试中使用内存实现。
#[async_trait]
pub trait RestCollaborator: Send + Sync {
    /// `GET /api/v1/<resource>`：拉取某种实体的完整集合。
    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, ApiError>;
}

/// 基于 `reqwest` 的 REST 客户端。
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 集合端点的完整地址。
    pub fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/api/v1/{}", self.base_url, kind.resource_path())
    }
}

#[async_trait]
impl RestCollaborator for HttpApiClient {
    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, ApiError> {
        let url = self.collection_url(kind);
        debug!("[API客户端] GET {}", url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            error!("[API客户端] 拉取 {} 失败: 状态码={}, 错误={}", kind, status, detail);
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        rows_from_body(body)
    }
}

/// 从错误响应体中提取可读信息：优先 `detail` 字段，其次原文。
pub(crate) fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => match object.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ if body.is_empty() => "无法读取错误响应体".to_string(),
        _ => body.to_string(),
    }
}

/// 集合端点应返回 JSON 数组。
pub(crate) fn rows_from_body(body: Value) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(rows) => Ok(rows),
        other => Err(ApiError::Decode(format!("集合端点应返回 JSON 数组，实际为: {}", other))),
    }
}
