//! 消息收发服务
//!
//! 发送路径：校验成员资格 → 入库 → 刷新房间摘要 → 房间级广播。
//! 广播与发送方收到的应答相互独立，可能先后颠倒，客户端按
//! 消息ID去重，不得假设两者的顺序。

use std::sync::Arc;

use uuid::Uuid;

use domain::{Attachment, ChatEvent, DomainError, Message, MessageStore, MessageType};

use crate::broadcaster::EventBroadcaster;
use crate::error::ApplicationResult;
use crate::rooms::RoomService;

/// 发送消息命令
#[derive(Debug, Clone)]
pub struct SendMessageCommand {
    /// 房间ID
    pub room_id: Uuid,
    /// 发送者ID
    pub sender_id: Uuid,
    /// 消息内容（有附件时可为空）
    pub content: String,
    /// 消息类型
    pub message_type: MessageType,
    /// 附件列表
    pub attachments: Vec<Attachment>,
}

/// 消息收发服务
pub struct ChatService {
    rooms: Arc<RoomService>,
    messages: Arc<dyn MessageStore>,
    broadcaster: Arc<EventBroadcaster>,
}

impl ChatService {
    pub fn new(
        rooms: Arc<RoomService>,
        messages: Arc<dyn MessageStore>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            rooms,
            messages,
            broadcaster,
        }
    }

    /// 发送消息。返回值交给发送方的同步应答；房间级广播独立进行。
    pub async fn send_message(&self, command: SendMessageCommand) -> ApplicationResult<Message> {
        self.rooms
            .require_member(command.room_id, command.sender_id)
            .await?;

        let message = Message::new(
            command.room_id,
            command.sender_id,
            command.content,
            command.message_type,
            command.attachments,
        )?;
        self.messages.insert(&message).await?;
        self.rooms.touch_last_message(&message).await?;

        self.broadcaster
            .broadcast_room(
                message.room_id,
                &ChatEvent::MessageReceived {
                    message: message.clone(),
                },
            )
            .await;

        tracing::info!(
            message_id = %message.id,
            room_id = %message.room_id,
            sender_id = %message.sender_id,
            "message sent"
        );
        Ok(message)
    }

    /// 撤回消息（对所有人删除）：发送者本人或房间管理员。
    /// 内容与附件被清空，消息壳保留在后续分页中。
    pub async fn revoke_message(
        &self,
        message_id: Uuid,
        requester: Uuid,
    ) -> ApplicationResult<Message> {
        let mut message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id))?;

        let room = self.rooms.load_room(message.room_id).await?;
        if message.sender_id != requester && !room.is_admin(requester) {
            return Err(DomainError::forbidden("只有发送者或管理员可以撤回").into());
        }

        if !message.revoked {
            message.revoke();
            self.messages.update(&message).await?;
            self.broadcaster
                .broadcast_room(
                    message.room_id,
                    &ChatEvent::MessageRevoked {
                        room_id: message.room_id,
                        message_id,
                    },
                )
                .await;
        }
        Ok(message)
    }

    /// 仅对自己删除：把请求者加入消息的 hidden_for；幂等
    pub async fn hide_message(&self, message_id: Uuid, requester: Uuid) -> ApplicationResult<()> {
        let mut message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id))?;

        self.rooms
            .require_member(message.room_id, requester)
            .await?;

        if message.hide_for(requester) {
            self.messages.update(&message).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod chat_tests;
