//! 同步层应用服务
//!
//! 在线表、缓存旁路房间仓储、游标分页、已读跟踪、事件广播，
//! 以及供测试与开发使用的内存实现。

pub mod broadcaster;
pub mod cache;
pub mod chat;
pub mod email;
pub mod error;
pub mod history;
pub mod memory;
pub mod presence;
pub mod read_tracker;
pub mod rooms;

pub use broadcaster::EventBroadcaster;
pub use cache::{Cache, DisabledCache};
pub use chat::{ChatService, SendMessageCommand};
pub use email::{EmailNotifier, NoopEmailNotifier};
pub use error::{ApplicationError, ApplicationResult};
pub use history::{MessagePager, PageRequest};
pub use memory::MemoryStore;
pub use presence::PresenceRegistry;
pub use read_tracker::ReadTracker;
pub use rooms::RoomService;
