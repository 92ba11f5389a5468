//! 通知实体定义
//!
//! 目前只承载房间邀请：离线用户的邀请事件无法实时送达，
//! 持久化的通知保证其可查询；随房间级联删除。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 通知状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Accepted,
    Declined,
}

/// 房间邀请通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 通知ID
    pub id: Uuid,
    /// 接收者
    pub user_id: Uuid,
    /// 目标房间
    pub room_id: Uuid,
    /// 房间名快照（direct 房间为空）
    pub room_name: String,
    /// 邀请人
    pub inviter_id: Uuid,
    /// 状态
    pub status: NotificationStatus,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 响应时间
    pub responded_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// 创建房间邀请
    pub fn new_invitation(
        user_id: Uuid,
        room_id: Uuid,
        room_name: impl Into<String>,
        inviter_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            room_id,
            room_name: room_name.into(),
            inviter_id,
            status: NotificationStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == NotificationStatus::Pending
    }

    /// 接受邀请，只允许从 Pending 迁移
    pub fn accept(&mut self) -> DomainResult<()> {
        self.respond(NotificationStatus::Accepted)
    }

    /// 拒绝邀请，只允许从 Pending 迁移
    pub fn decline(&mut self) -> DomainResult<()> {
        self.respond(NotificationStatus::Declined)
    }

    fn respond(&mut self, status: NotificationStatus) -> DomainResult<()> {
        if !self.is_pending() {
            return Err(DomainError::invalid_request("邀请已处理"));
        }
        self.status = status;
        self.responded_at = Some(Utc::now());
        Ok(())
    }
}
