//! 房间Store接口定义

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::Room;
use crate::errors::DomainResult;

/// 房间Store接口
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// 创建房间。direct 房间由 (type, 规范化成员对) 唯一索引保护，
    /// 并发创建同一成员对时返回 `DomainError::AlreadyExists`。
    async fn insert(&self, room: &Room) -> DomainResult<()>;

    /// 根据ID查找房间
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Room>>;

    /// 按规范化成员对查找 direct 房间
    async fn find_direct(&self, a: Uuid, b: Uuid) -> DomainResult<Option<Room>>;

    /// 用户所在的全部房间，按最近活跃降序
    async fn find_by_member(&self, user_id: Uuid) -> DomainResult<Vec<Room>>;

    /// 更新房间（成员、设置、最近消息摘要）
    async fn update(&self, room: &Room) -> DomainResult<()>;

    /// 删除房间
    async fn delete(&self, id: Uuid) -> DomainResult<()>;
}
