//! 实时聊天同步层核心领域模型
//!
//! 包含用户、房间、消息、通知等核心实体，分页游标，
//! 以及持久化存储的访问契约。

pub mod cursor;
pub mod entities;
pub mod errors;
pub mod events;
pub mod stores;

// 重新导出常用类型
pub use cursor::*;
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use stores::*;
