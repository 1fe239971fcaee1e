// ReportingDashboard/src/ws_client/mod.rs

//! WebSocket 客户端：连接生命周期、心跳与重连。

pub mod connection_manager;
pub mod heartbeat;
pub mod link;
pub mod reconnect;

pub use connection_manager::{ConnectionManager, ConnectionState};
pub use link::{Connector, TungsteniteConnector};
pub use reconnect::ReconnectPolicy;
