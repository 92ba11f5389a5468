//! 聊天领域事件
//!
//! 房间级事件发往加入了该房间广播组的连接；用户级事件经在线表
//! 定位到单个目标连接，目标离线时静默丢弃。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Message, Notification};

/// 聊天事件，`event` 字段即线上事件名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ChatEvent {
    /// 新消息入库后广播
    #[serde(rename = "message:received")]
    MessageReceived { message: Message },

    /// 消息被撤回
    #[serde(rename = "message:revoked")]
    MessageRevoked { room_id: Uuid, message_id: Uuid },

    /// 成员加入房间
    #[serde(rename = "member:joined")]
    MemberJoined { room_id: Uuid, user_id: Uuid },

    /// 成员离开房间
    #[serde(rename = "member:left")]
    MemberLeft { room_id: Uuid, user_id: Uuid },

    /// 正在输入
    #[serde(rename = "user:typing")]
    UserTyping {
        room_id: Uuid,
        user_id: Uuid,
        typing: bool,
    },

    /// 用户上线（面向全部连接）
    #[serde(rename = "user:online")]
    UserOnline { user_id: Uuid },

    /// 用户下线（面向全部连接）
    #[serde(rename = "user:offline")]
    UserOffline {
        user_id: Uuid,
        last_seen: DateTime<Utc>,
    },

    /// 收到房间邀请（用户级）
    #[serde(rename = "invitation:received")]
    InvitationReceived { notification: Notification },

    /// 邀请被接受（用户级，发给邀请人）
    #[serde(rename = "invitation:accepted")]
    InvitationAccepted { room_id: Uuid, user_id: Uuid },

    /// 邀请被拒绝（用户级，发给邀请人）
    #[serde(rename = "invitation:declined")]
    InvitationDeclined { room_id: Uuid, user_id: Uuid },
}

impl ChatEvent {
    /// 线上事件名
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageReceived { .. } => "message:received",
            Self::MessageRevoked { .. } => "message:revoked",
            Self::MemberJoined { .. } => "member:joined",
            Self::MemberLeft { .. } => "member:left",
            Self::UserTyping { .. } => "user:typing",
            Self::UserOnline { .. } => "user:online",
            Self::UserOffline { .. } => "user:offline",
            Self::InvitationReceived { .. } => "invitation:received",
            Self::InvitationAccepted { .. } => "invitation:accepted",
            Self::InvitationDeclined { .. } => "invitation:declined",
        }
    }

    /// 房间级事件对应的房间
    pub fn room_scope(&self) -> Option<Uuid> {
        match self {
            Self::MessageReceived { message } => Some(message.room_id),
            Self::MessageRevoked { room_id, .. }
            | Self::MemberJoined { room_id, .. }
            | Self::MemberLeft { room_id, .. }
            | Self::UserTyping { room_id, .. } => Some(*room_id),
            _ => None,
        }
    }
}
