//! 已读跟踪
//!
//! 每个房间每个成员一个已读游标（participant_settings.last_read），
//! 未读数按需重算：sender ≠ 本人 且 created_at > 游标 的消息数，
//! 未设置游标时以 epoch 为界。消息级回执（read_by）由 socket 驱动，
//! 与房间游标互相独立。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use domain::{DomainError, MessageStore, RoomStore};

use crate::error::ApplicationResult;

/// 已读跟踪服务
pub struct ReadTracker {
    rooms: Arc<dyn RoomStore>,
    messages: Arc<dyn MessageStore>,
}

impl ReadTracker {
    pub fn new(rooms: Arc<dyn RoomStore>, messages: Arc<dyn MessageStore>) -> Self {
        Self { rooms, messages }
    }

    /// 把成员的已读游标推进到当前时刻；幂等
    pub async fn mark_read(&self, room_id: Uuid, user_id: Uuid) -> ApplicationResult<DateTime<Utc>> {
        let mut room = self
            .rooms
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        if !room.is_member(user_id) {
            return Err(DomainError::forbidden("不是房间成员").into());
        }

        let now = Utc::now();
        room.mark_read(user_id, now);
        self.rooms.update(&room).await?;
        Ok(now)
    }

    /// 成员在房间内的未读数
    pub async fn unread_count(&self, room_id: Uuid, user_id: Uuid) -> ApplicationResult<u64> {
        let room = self
            .rooms
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        if !room.is_member(user_id) {
            return Err(DomainError::forbidden("不是房间成员").into());
        }

        let since = room
            .last_read_of(user_id)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Ok(self.messages.count_unread(room_id, user_id, since).await?)
    }

    /// 给单条消息追加已读回执；幂等，返回是否发生变化
    pub async fn mark_message_read(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> ApplicationResult<bool> {
        let mut message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id))?;

        let room = self
            .rooms
            .find_by_id(message.room_id)
            .await?
            .ok_or_else(|| DomainError::not_found("room", message.room_id))?;
        if !room.is_member(user_id) {
            return Err(DomainError::forbidden("不是房间成员").into());
        }

        let changed = message.mark_read_by(user_id, Utc::now());
        if changed {
            self.messages.update(&message).await?;
        }
        Ok(changed)
    }
}
