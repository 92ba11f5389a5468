//! 房间仓储服务（缓存旁路）
//!
//! 读路径先查缓存、未命中回源并回填；写路径绕过缓存，依赖显式失效。
//! 每个改变成员集合、删除房间或触达一批用户的变更，都必须在调用点
//! 逐一失效受影响用户的 `rooms:user:{id}`，这是各写入点的明确职责。
//! 缓存任何故障都只是未命中，存储才是事实来源。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use domain::{
    ChatEvent, DomainError, LastMessage, Message, MessageStore, Notification, NotificationStore,
    Room, RoomStore, RoomSummary, RoomType, User, UserStore,
};

use crate::broadcaster::EventBroadcaster;
use crate::cache::Cache;
use crate::error::ApplicationResult;

/// 用户房间列表缓存TTL
const USER_ROOMS_TTL: Duration = Duration::from_secs(300);
/// direct 房间解析缓存TTL
const DIRECT_ROOM_TTL: Duration = Duration::from_secs(86400);

/// 用户房间列表的缓存键
fn user_rooms_key(user_id: Uuid) -> String {
    format!("rooms:user:{user_id}")
}

/// direct 房间解析的缓存键，成员对先规范化，查询与键都与参数顺序无关
fn direct_room_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = Room::canonical_pair(a, b);
    format!("direct:{low}:{high}")
}

/// 房间仓储服务依赖
pub struct RoomServiceDependencies {
    pub rooms: Arc<dyn RoomStore>,
    pub messages: Arc<dyn MessageStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub users: Arc<dyn UserStore>,
    pub cache: Arc<dyn Cache>,
    pub broadcaster: Arc<EventBroadcaster>,
}

/// 房间仓储服务
pub struct RoomService {
    rooms: Arc<dyn RoomStore>,
    messages: Arc<dyn MessageStore>,
    notifications: Arc<dyn NotificationStore>,
    users: Arc<dyn UserStore>,
    cache: Arc<dyn Cache>,
    broadcaster: Arc<EventBroadcaster>,
}

impl RoomService {
    pub fn new(deps: RoomServiceDependencies) -> Self {
        Self {
            rooms: deps.rooms,
            messages: deps.messages,
            notifications: deps.notifications,
            users: deps.users,
            cache: deps.cache,
            broadcaster: deps.broadcaster,
        }
    }

    /// 用户的房间列表，按最近活跃降序
    pub async fn get_user_rooms(&self, user_id: Uuid) -> ApplicationResult<Vec<RoomSummary>> {
        let key = user_rooms_key(user_id);
        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_str::<Vec<RoomSummary>>(&cached) {
                Ok(summaries) => return Ok(summaries),
                Err(err) => {
                    // 损坏的缓存条目视为未命中
                    tracing::debug!(key = %key, error = %err, "cached room list unreadable, falling through");
                }
            }
        }

        let rooms = self.rooms.find_by_member(user_id).await?;
        let summaries: Vec<RoomSummary> = rooms.iter().map(Room::summary).collect();

        if let Ok(payload) = serde_json::to_string(&summaries) {
            self.cache.set(&key, &payload, USER_ROOMS_TTL).await;
        }
        Ok(summaries)
    }

    /// 解析两名用户的 direct 房间；对参数顺序不敏感
    pub async fn find_direct_room(&self, a: Uuid, b: Uuid) -> ApplicationResult<Option<Room>> {
        let key = direct_room_key(a, b);
        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_str::<Room>(&cached) {
                Ok(room) => return Ok(Some(room)),
                Err(err) => {
                    tracing::debug!(key = %key, error = %err, "cached direct room unreadable, falling through");
                }
            }
        }

        let found = self.rooms.find_direct(a, b).await?;
        if let Some(room) = &found {
            if let Ok(payload) = serde_json::to_string(room) {
                self.cache.set(&key, &payload, DIRECT_ROOM_TTL).await;
            }
        }
        Ok(found)
    }

    /// 获取或创建 direct 房间。并发的 find-then-create 竞争由存储的
    /// (type, 规范化成员对) 唯一索引兜底：冲突时静默返回已存在的房间。
    pub async fn create_direct_room(&self, a: Uuid, b: Uuid) -> ApplicationResult<Room> {
        if let Some(existing) = self.find_direct_room(a, b).await? {
            return Ok(existing);
        }

        let room = Room::new_direct(a, b)?;
        match self.rooms.insert(&room).await {
            Ok(()) => {
                self.invalidate_user_rooms(room.members.iter().copied())
                    .await;
                if let Ok(payload) = serde_json::to_string(&room) {
                    self.cache
                        .set(&direct_room_key(a, b), &payload, DIRECT_ROOM_TTL)
                        .await;
                }
                tracing::info!(room_id = %room.id, "direct room created");
                Ok(room)
            }
            Err(DomainError::AlreadyExists { .. }) => {
                // 输掉竞争：绕过缓存回源读赢家写入的房间
                let existing = self
                    .rooms
                    .find_direct(a, b)
                    .await?
                    .ok_or_else(|| DomainError::not_found("direct room", direct_room_key(a, b)))?;
                Ok(existing)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 创建群组房间，创建者自动成为成员与管理员
    pub async fn create_group_room(
        &self,
        name: impl Into<String>,
        creator: Uuid,
        members: Vec<Uuid>,
        private: bool,
    ) -> ApplicationResult<Room> {
        let room = Room::new_group(name, creator, members, private)?;
        self.rooms.insert(&room).await?;
        self.invalidate_user_rooms(room.members.iter().copied())
            .await;
        tracing::info!(room_id = %room.id, creator = %creator, "group room created");
        Ok(room)
    }

    /// 加入公开群组。私密房间只能经邀请进入，direct 房间成员固定。
    pub async fn join_room(&self, room_id: Uuid, user_id: Uuid) -> ApplicationResult<Room> {
        let room = self.load_room(room_id).await?;
        match room.room_type {
            RoomType::Group => {}
            RoomType::Private => {
                return Err(DomainError::forbidden("加入私密房间需要邀请").into());
            }
            RoomType::Direct => {
                return Err(DomainError::invalid_request("直聊房间不能加入").into());
            }
        }
        self.apply_join(room, user_id).await
    }

    /// 离开房间。成员清空（含创建者作为最后一名成员离开）时级联
    /// 删除房间、该房间的消息与待处理邀请。
    pub async fn leave_room(&self, room_id: Uuid, user_id: Uuid) -> ApplicationResult<()> {
        let mut room = self.load_room(room_id).await?;
        if !room.is_member(user_id) {
            return Err(DomainError::forbidden("不是房间成员").into());
        }

        // 失效集合取自变更前的成员集（old ∪ new = old）
        let affected: Vec<Uuid> = room.members.clone();
        room.remove_member(user_id);

        if room.members.is_empty() {
            self.cascade_delete(&room).await?;
        } else {
            self.rooms.update(&room).await?;
            self.broadcaster
                .broadcast_room(room.id, &ChatEvent::MemberLeft { room_id, user_id })
                .await;
        }

        self.invalidate_user_rooms(affected).await;
        Ok(())
    }

    /// 邀请用户进入群组房间，持久化通知；目标离线且配置了邮件时补发邮件
    pub async fn invite_user(
        &self,
        room_id: Uuid,
        inviter: Uuid,
        invitee: Uuid,
    ) -> ApplicationResult<Notification> {
        let room = self.load_room(room_id).await?;
        if room.is_direct() {
            return Err(DomainError::invalid_request("直聊房间不支持邀请").into());
        }
        if !room.is_member(inviter) {
            return Err(DomainError::forbidden("只有房间成员可以邀请").into());
        }
        if room.is_member(invitee) {
            return Err(DomainError::invalid_request("用户已是房间成员").into());
        }

        let recipient = self
            .users
            .find_by_id(invitee)
            .await?
            .ok_or_else(|| DomainError::not_found("user", invitee))?;

        let notification =
            Notification::new_invitation(invitee, room.id, room.name.clone(), inviter);
        self.notifications.insert(&notification).await?;

        self.broadcaster
            .deliver_invitation(&recipient, &room, &notification)
            .await;
        Ok(notification)
    }

    /// 响应邀请。接受时入房并通知邀请人；拒绝时只通知邀请人。
    /// 邀请人的回执是用户级事件，离线时静默丢弃。
    pub async fn respond_invitation(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        accept: bool,
    ) -> ApplicationResult<Option<Room>> {
        let mut notification = self
            .notifications
            .find_by_id(notification_id)
            .await?
            .ok_or_else(|| DomainError::not_found("notification", notification_id))?;
        if notification.user_id != user_id {
            return Err(DomainError::forbidden("只能响应自己的邀请").into());
        }

        if accept {
            notification.accept()?;
        } else {
            notification.decline()?;
        }
        self.notifications.update(&notification).await?;

        let receipt = if accept {
            ChatEvent::InvitationAccepted {
                room_id: notification.room_id,
                user_id,
            }
        } else {
            ChatEvent::InvitationDeclined {
                room_id: notification.room_id,
                user_id,
            }
        };

        let joined = if accept {
            let room = self.load_room(notification.room_id).await?;
            Some(self.apply_join(room, user_id).await?)
        } else {
            None
        };

        self.broadcaster
            .send_to_user(notification.inviter_id, &receipt)
            .await;
        Ok(joined)
    }

    /// 用户的待处理邀请（离线期间错过的实时事件可由此补偿）
    pub async fn pending_invitations(&self, user_id: Uuid) -> ApplicationResult<Vec<Notification>> {
        Ok(self.notifications.pending_for_user(user_id).await?)
    }

    /// 消息入库后刷新房间摘要。消息变更会改变列表排序，
    /// 同样要失效全部成员的列表缓存。
    pub async fn touch_last_message(&self, message: &Message) -> ApplicationResult<()> {
        let mut room = self.load_room(message.room_id).await?;
        room.touch_message(LastMessage {
            message_id: message.id,
            sender_id: message.sender_id,
            preview: message.preview(80),
            sent_at: message.created_at,
        });
        self.rooms.update(&room).await?;
        self.invalidate_user_rooms(room.members.iter().copied())
            .await;
        Ok(())
    }

    /// 加载房间并要求 user 是成员；分页、已读等入口的统一鉴权
    pub async fn require_member(&self, room_id: Uuid, user_id: Uuid) -> ApplicationResult<Room> {
        let room = self.load_room(room_id).await?;
        if !room.is_member(user_id) {
            return Err(DomainError::forbidden("不是房间成员").into());
        }
        Ok(room)
    }

    /// 按ID加载房间
    pub async fn load_room(&self, room_id: Uuid) -> ApplicationResult<Room> {
        self.rooms
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::not_found("room", room_id).into())
    }

    /// 查找用户（供网关补充事件载荷）
    pub async fn load_user(&self, user_id: Uuid) -> ApplicationResult<Option<User>> {
        Ok(self.users.find_by_id(user_id).await?)
    }

    async fn apply_join(&self, mut room: Room, user_id: Uuid) -> ApplicationResult<Room> {
        let affected: HashSet<Uuid> = room
            .members
            .iter()
            .copied()
            .chain(std::iter::once(user_id))
            .collect();

        if room.add_member(user_id)? {
            self.rooms.update(&room).await?;
            self.invalidate_user_rooms(affected).await;
            self.broadcaster
                .broadcast_room(
                    room.id,
                    &ChatEvent::MemberJoined {
                        room_id: room.id,
                        user_id,
                    },
                )
                .await;
        }
        Ok(room)
    }

    async fn cascade_delete(&self, room: &Room) -> ApplicationResult<()> {
        self.rooms.delete(room.id).await?;
        let purged = self.messages.delete_by_room(room.id).await?;
        let dropped = self.notifications.delete_pending_by_room(room.id).await?;

        // direct 解析键随房间一起消失
        if let Some(key) = &room.direct_key {
            self.cache.del(&format!("direct:{key}")).await;
        }

        tracing::info!(
            room_id = %room.id,
            purged_messages = purged,
            dropped_invitations = dropped,
            "room cascade deleted"
        );
        Ok(())
    }

    /// 逐一失效受影响用户的房间列表缓存
    async fn invalidate_user_rooms(&self, users: impl IntoIterator<Item = Uuid>) {
        for user_id in users {
            self.cache.del(&user_rooms_key(user_id)).await;
        }
    }
}

#[cfg(test)]
#[path = "rooms_tests.rs"]
mod rooms_tests;
