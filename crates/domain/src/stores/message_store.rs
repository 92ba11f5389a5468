//! 消息Store接口定义
//!
//! 历史查询始终按 (created_at, id) 降序读取最近窗口，可见性过滤
//! （hidden_for）下推到存储查询，保证返回的页是满的。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::Message;
use crate::errors::DomainResult;

/// 消息Store接口
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 写入新消息
    async fn insert(&self, message: &Message) -> DomainResult<()>;

    /// 根据ID查找消息
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>>;

    /// 更新消息（已读回执、隐藏、撤回）
    async fn update(&self, message: &Message) -> DomainResult<()>;

    /// 房间内对 viewer 可见的最近 limit 条消息，(created_at, id) 降序
    async fn latest_in_room(
        &self,
        room_id: Uuid,
        viewer: Uuid,
        limit: u32,
    ) -> DomainResult<Vec<Message>>;

    /// 房间内 created_at 严格早于 boundary、对 viewer 可见的
    /// limit 条消息，(created_at, id) 降序
    async fn in_room_older_than(
        &self,
        room_id: Uuid,
        viewer: Uuid,
        boundary: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<Message>>;

    /// 未读数：sender ≠ reader 且 created_at > since 的消息数
    async fn count_unread(
        &self,
        room_id: Uuid,
        reader: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<u64>;

    /// 级联删除房间的全部消息，返回删除条数
    async fn delete_by_room(&self, room_id: Uuid) -> DomainResult<u64>;
}
