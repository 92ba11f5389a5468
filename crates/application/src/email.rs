//! 邮件通知端口
//!
//! 只在邀请目标离线时调用；发送即忘，失败由实现方记录日志，
//! 绝不阻塞邀请流程。

use async_trait::async_trait;
use domain::{Room, User};
use uuid::Uuid;

/// 邮件通知接口
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    /// 给离线用户发送房间邀请邮件
    async fn send_invitation(&self, recipient: &User, room: &Room, inviter_id: Uuid);
}

/// 未配置邮件时的空实现
pub struct NoopEmailNotifier;

#[async_trait]
impl EmailNotifier for NoopEmailNotifier {
    async fn send_invitation(&self, recipient: &User, room: &Room, inviter_id: Uuid) {
        tracing::debug!(
            recipient = %recipient.id,
            room_id = %room.id,
            inviter_id = %inviter_id,
            "email disabled, invitation mail skipped"
        );
    }
}
