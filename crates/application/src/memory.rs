//! 内存存储实现（用于测试和单机开发）
//!
//! direct 房间的唯一索引与房间表在同一把写锁下维护，
//! 并发创建同一成员对时与真实存储一样返回 AlreadyExists。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use domain::{
    DomainError, DomainResult, Message, MessageStore, Notification, NotificationStore, Room,
    RoomStore, User, UserStore,
};

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<Uuid, Room>,
    /// direct_key → 房间ID，(type, 规范化成员对) 唯一索引
    direct_index: HashMap<String, Uuid>,
}

/// 内存存储，实现全部 Store 契约
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    rooms: RwLock<RoomTable>,
    messages: RwLock<HashMap<Uuid, Message>>,
    notifications: RwLock<HashMap<Uuid, Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试辅助：直接写入用户
    pub async fn add_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    fn direct_key_of(room: &Room) -> Option<String> {
        room.direct_key.clone()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn insert(&self, room: &Room) -> DomainResult<()> {
        let mut table = self.rooms.write().await;
        if let Some(key) = Self::direct_key_of(room) {
            if table.direct_index.contains_key(&key) {
                return Err(DomainError::already_exists("direct room", key));
            }
            table.direct_index.insert(key, room.id);
        }
        table.rooms.insert(room.id, room.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Room>> {
        let table = self.rooms.read().await;
        Ok(table.rooms.get(&id).cloned())
    }

    async fn find_direct(&self, a: Uuid, b: Uuid) -> DomainResult<Option<Room>> {
        let table = self.rooms.read().await;
        let key = Room::direct_key(a, b);
        Ok(table
            .direct_index
            .get(&key)
            .and_then(|id| table.rooms.get(id))
            .cloned())
    }

    async fn find_by_member(&self, user_id: Uuid) -> DomainResult<Vec<Room>> {
        let table = self.rooms.read().await;
        let mut rooms: Vec<Room> = table
            .rooms
            .values()
            .filter(|room| room.is_member(user_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(rooms)
    }

    async fn update(&self, room: &Room) -> DomainResult<()> {
        let mut table = self.rooms.write().await;
        if !table.rooms.contains_key(&room.id) {
            return Err(DomainError::not_found("room", room.id));
        }
        table.rooms.insert(room.id, room.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let mut table = self.rooms.write().await;
        if let Some(room) = table.rooms.remove(&id) {
            if let Some(key) = Self::direct_key_of(&room) {
                table.direct_index.remove(&key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: &Message) -> DomainResult<()> {
        let mut messages = self.messages.write().await;
        messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.get(&id).cloned())
    }

    async fn update(&self, message: &Message) -> DomainResult<()> {
        let mut messages = self.messages.write().await;
        if !messages.contains_key(&message.id) {
            return Err(DomainError::not_found("message", message.id));
        }
        messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn latest_in_room(
        &self,
        room_id: Uuid,
        viewer: Uuid,
        limit: u32,
    ) -> DomainResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut visible: Vec<Message> = messages
            .values()
            .filter(|m| m.room_id == room_id && !m.is_hidden_for(viewer))
            .cloned()
            .collect();
        visible.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        visible.truncate(limit as usize);
        Ok(visible)
    }

    async fn in_room_older_than(
        &self,
        room_id: Uuid,
        viewer: Uuid,
        boundary: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut visible: Vec<Message> = messages
            .values()
            .filter(|m| {
                m.room_id == room_id && m.created_at < boundary && !m.is_hidden_for(viewer)
            })
            .cloned()
            .collect();
        visible.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        visible.truncate(limit as usize);
        Ok(visible)
    }

    async fn count_unread(
        &self,
        room_id: Uuid,
        reader: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let messages = self.messages.read().await;
        let count = messages
            .values()
            .filter(|m| m.room_id == room_id && m.sender_id != reader && m.created_at > since)
            .count();
        Ok(count as u64)
    }

    async fn delete_by_room(&self, room_id: Uuid) -> DomainResult<u64> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|_, m| m.room_id != room_id);
        Ok((before - messages.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn upsert(&self, user: &User) -> DomainResult<()> {
        let mut users = self.users.write().await;
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn set_online(&self, id: Uuid) -> DomainResult<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.mark_online();
        }
        Ok(())
    }

    async fn set_offline(&self, id: Uuid, last_seen: DateTime<Utc>) -> DomainResult<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.mark_offline(last_seen);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: &Notification) -> DomainResult<()> {
        let mut notifications = self.notifications.write().await;
        notifications.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications.get(&id).cloned())
    }

    async fn update(&self, notification: &Notification) -> DomainResult<()> {
        let mut notifications = self.notifications.write().await;
        if !notifications.contains_key(&notification.id) {
            return Err(DomainError::not_found("notification", notification.id));
        }
        notifications.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn pending_for_user(&self, user_id: Uuid) -> DomainResult<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let mut pending: Vec<Notification> = notifications
            .values()
            .filter(|n| n.user_id == user_id && n.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pending)
    }

    async fn delete_pending_by_room(&self, room_id: Uuid) -> DomainResult<u64> {
        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications.retain(|_, n| !(n.room_id == room_id && n.is_pending()));
        Ok((before - notifications.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_uniqueness_enforced() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = Room::new_direct(a, b).unwrap();
        RoomStore::insert(&store, &first).await.unwrap();

        // 反向成员对命中同一个唯一键
        let second = Room::new_direct(b, a).unwrap();
        let err = RoomStore::insert(&store, &second).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists { .. }));

        let found = store.find_direct(b, a).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_delete_releases_direct_key() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let room = Room::new_direct(a, b).unwrap();
        RoomStore::insert(&store, &room).await.unwrap();
        RoomStore::delete(&store, room.id).await.unwrap();

        assert!(store.find_direct(a, b).await.unwrap().is_none());
        let again = Room::new_direct(a, b).unwrap();
        RoomStore::insert(&store, &again).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_by_member_orders_by_activity() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let mut old_room = Room::new_group("old", user, vec![], false).unwrap();
        old_room.last_activity = Utc::now() - chrono::Duration::hours(2);
        let mut fresh_room = Room::new_group("fresh", user, vec![], false).unwrap();
        fresh_room.last_activity = Utc::now();

        RoomStore::insert(&store, &old_room).await.unwrap();
        RoomStore::insert(&store, &fresh_room).await.unwrap();

        let rooms = store.find_by_member(user).await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].id, fresh_room.id);
        assert_eq!(rooms[1].id, old_room.id);
    }
}
