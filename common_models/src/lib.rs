//! `common_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了报表元数据管理后台 (Reporting Dashboard) 的实时同步层
//! 与后端之间共享的核心数据结构和枚举类型。后端拥有全部业务实体，这里只定义
//! 同步层需要理解的部分：
//!
//! - **通用枚举 (`enums`)**: 实体种类 (`EntityKind`) 与变更种类 (`ChangeKind`)，
//!   以及它们在线路标签、订阅主题和 REST 资源路径之间的映射。
//! - **WebSocket 消息负载 (`ws_payloads`)**: 服务端推送事件的类型化表示 (`ServerEvent`)
//!   和客户端发出的动作帧 (`ClientAction`)。
//!
//! 线路上出现的类型 (`EntityKind`、`ChangeKind`、`ClientAction`) 派生 `Serialize`/`Deserialize`；
//! `ServerEvent` 由类型标签分类得到，不直接反序列化。

pub mod enums;
pub mod ws_payloads;

pub use enums::{ChangeKind, EntityKind};
pub use ws_payloads::{ClientAction, ServerEvent};
