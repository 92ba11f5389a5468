//! 用户Store接口定义

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::User;
use crate::errors::DomainResult;

/// 用户Store接口
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 根据ID查找用户
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>>;

    /// 写入或更新用户
    async fn upsert(&self, user: &User) -> DomainResult<()>;

    /// 在线状态迁移：上线
    async fn set_online(&self, id: Uuid) -> DomainResult<()>;

    /// 在线状态迁移：下线并记录最后在线时间
    async fn set_offline(&self, id: Uuid, last_seen: DateTime<Utc>) -> DomainResult<()>;
}
