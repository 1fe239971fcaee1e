// ReportingDashboard/src/lib.rs

//! 临床试验报告元数据仪表盘的实时同步层。
//!
//! 通过一条 WebSocket 连接接收后端的变更通知，把通知翻译成各面板的刷新动作，
//! 再由面板通过 REST 接口重新拉取权威数据。
//!
//! - `ws_client`: 连接管理器、心跳、重连退避。
//! - `sync`: 消息分发、协调策略、订阅者注册表、面板缓存。
//! - `api_client`: REST 集合端点客户端。
//! - `config`: `dashboard_settings.json` 配置。
//! - `error`: 应用错误类型。

pub mod api_client;
pub mod config;
pub mod error;
pub mod sync;
pub mod ws_client;
