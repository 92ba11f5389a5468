//! 通知Store接口定义

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::Notification;
use crate::errors::DomainResult;

/// 通知Store接口
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// 写入通知
    async fn insert(&self, notification: &Notification) -> DomainResult<()>;

    /// 根据ID查找通知
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Notification>>;

    /// 更新通知状态
    async fn update(&self, notification: &Notification) -> DomainResult<()>;

    /// 用户的全部待处理邀请
    async fn pending_for_user(&self, user_id: Uuid) -> DomainResult<Vec<Notification>>;

    /// 级联删除房间的待处理邀请，返回删除条数
    async fn delete_pending_by_room(&self, room_id: Uuid) -> DomainResult<u64>;
}
