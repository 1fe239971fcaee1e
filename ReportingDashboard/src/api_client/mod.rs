// ReportingDashboard/src/api_client/mod.rs

//! REST 协作方。
//!
//! 同步层不拥有任何实体，只在收到变更通知后通过这里重新拉取权威集合。
//! 业务校验、持久化和审计都在后端完成，这里不做重试，重试由调用方决定。

pub mod service;

pub use service::{ApiError, HttpApiClient, RestCollaborator};
