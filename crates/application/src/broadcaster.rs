//! 事件广播器
//!
//! 房间级事件发往加入了该房间广播组的连接集合；用户级事件经
//! 在线表定位唯一目标连接，目标离线时静默丢弃（持久化的通知
//! 仍可查询，配置了邮件时补发邮件）。连接必须显式加入房间的
//! 广播组才能收到该房间的事件，成员资格只在加入时校验一次。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use domain::{ChatEvent, Notification, Room, User};

use crate::email::EmailNotifier;
use crate::presence::PresenceRegistry;

/// 连接的事件发送端
pub type EventSender = mpsc::UnboundedSender<ChatEvent>;

/// 事件广播器
pub struct EventBroadcaster {
    presence: Arc<PresenceRegistry>,
    email: Arc<dyn EmailNotifier>,
    /// 连接ID → 发送端
    senders: RwLock<HashMap<Uuid, EventSender>>,
    /// 房间ID → 已加入广播组的连接集合
    room_groups: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl EventBroadcaster {
    pub fn new(presence: Arc<PresenceRegistry>, email: Arc<dyn EmailNotifier>) -> Self {
        Self {
            presence,
            email,
            senders: RwLock::new(HashMap::new()),
            room_groups: RwLock::new(HashMap::new()),
        }
    }

    /// 注册连接的发送端
    pub async fn register_connection(&self, connection_id: Uuid, sender: EventSender) {
        let mut senders = self.senders.write().await;
        senders.insert(connection_id, sender);
    }

    /// 注销连接：移除发送端并退出全部广播组
    pub async fn unregister_connection(&self, connection_id: Uuid) {
        let mut senders = self.senders.write().await;
        senders.remove(&connection_id);
        drop(senders);

        let mut groups = self.room_groups.write().await;
        for members in groups.values_mut() {
            members.remove(&connection_id);
        }
        groups.retain(|_, members| !members.is_empty());
    }

    /// 连接加入房间广播组
    pub async fn join_room(&self, connection_id: Uuid, room_id: Uuid) {
        let mut groups = self.room_groups.write().await;
        groups.entry(room_id).or_default().insert(connection_id);
    }

    /// 连接退出房间广播组
    pub async fn leave_room(&self, connection_id: Uuid, room_id: Uuid) {
        let mut groups = self.room_groups.write().await;
        if let Some(members) = groups.get_mut(&room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                groups.remove(&room_id);
            }
        }
    }

    /// 房间级广播，返回实际投递的连接数
    pub async fn broadcast_room(&self, room_id: Uuid, event: &ChatEvent) -> usize {
        let targets: Vec<Uuid> = {
            let groups = self.room_groups.read().await;
            groups
                .get(&room_id)
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default()
        };
        self.send_to_connections(&targets, event).await
    }

    /// 用户级投递：经在线表定位连接，离线时静默丢弃
    pub async fn send_to_user(&self, user_id: Uuid, event: &ChatEvent) -> bool {
        let Some(connection_id) = self.presence.lookup(user_id).await else {
            tracing::debug!(user_id = %user_id, event = event.name(), "target offline, event dropped");
            return false;
        };
        self.send_to_connections(&[connection_id], event).await > 0
    }

    /// 面向全部连接的广播（上线/下线公告）
    pub async fn broadcast_all(&self, event: &ChatEvent) -> usize {
        let targets: Vec<Uuid> = {
            let senders = self.senders.read().await;
            senders.keys().copied().collect()
        };
        self.send_to_connections(&targets, event).await
    }

    /// 投递房间邀请：实时事件送不到（目标离线）时退回邮件
    pub async fn deliver_invitation(
        &self,
        recipient: &User,
        room: &Room,
        notification: &Notification,
    ) {
        let event = ChatEvent::InvitationReceived {
            notification: notification.clone(),
        };
        if !self.send_to_user(recipient.id, &event).await {
            self.email
                .send_invitation(recipient, room, notification.inviter_id)
                .await;
        }
    }

    async fn send_to_connections(&self, targets: &[Uuid], event: &ChatEvent) -> usize {
        if targets.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();
        {
            let senders = self.senders.read().await;
            for connection_id in targets {
                match senders.get(connection_id) {
                    Some(sender) if sender.send(event.clone()).is_ok() => delivered += 1,
                    Some(_) => dead.push(*connection_id),
                    None => {}
                }
            }
        }

        // 接收端已关闭的连接当场清理
        for connection_id in dead {
            self.unregister_connection(connection_id).await;
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::NoopEmailNotifier;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingEmailNotifier {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl EmailNotifier for RecordingEmailNotifier {
        async fn send_invitation(&self, _recipient: &User, _room: &Room, _inviter_id: Uuid) {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn broadcaster() -> (Arc<PresenceRegistry>, EventBroadcaster) {
        let presence = Arc::new(PresenceRegistry::new());
        let broadcaster = EventBroadcaster::new(presence.clone(), Arc::new(NoopEmailNotifier));
        (presence, broadcaster)
    }

    fn typing_event(room_id: Uuid) -> ChatEvent {
        ChatEvent::UserTyping {
            room_id,
            user_id: Uuid::new_v4(),
            typing: true,
        }
    }

    #[tokio::test]
    async fn test_room_broadcast_reaches_only_joined_connections() {
        let (_, broadcaster) = broadcaster();
        let room_id = Uuid::new_v4();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();

        broadcaster.register_connection(conn_a, tx_a).await;
        broadcaster.register_connection(conn_b, tx_b).await;
        broadcaster.join_room(conn_a, room_id).await;

        let delivered = broadcaster.broadcast_room(room_id, &typing_event(room_id)).await;
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_room_stops_delivery() {
        let (_, broadcaster) = broadcaster();
        let room_id = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Uuid::new_v4();
        broadcaster.register_connection(conn, tx).await;
        broadcaster.join_room(conn, room_id).await;
        broadcaster.leave_room(conn, room_id).await;

        let delivered = broadcaster.broadcast_room(room_id, &typing_event(room_id)).await;
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_user_scoped_event_dropped_when_offline() {
        let (_, broadcaster) = broadcaster();
        let event = ChatEvent::InvitationAccepted {
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        };
        assert!(!broadcaster.send_to_user(Uuid::new_v4(), &event).await);
    }

    #[tokio::test]
    async fn test_user_scoped_event_delivered_when_online() {
        let (presence, broadcaster) = broadcaster();
        let user = Uuid::new_v4();
        let conn = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        presence.register(user, conn).await;
        broadcaster.register_connection(conn, tx).await;

        let event = ChatEvent::InvitationDeclined {
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        };
        assert!(broadcaster.send_to_user(user, &event).await);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_invitation_falls_back_to_email_when_offline() {
        let presence = Arc::new(PresenceRegistry::new());
        let email = Arc::new(RecordingEmailNotifier {
            sent: AtomicUsize::new(0),
        });
        let broadcaster = EventBroadcaster::new(presence.clone(), email.clone());

        let recipient = User::new("offline-user", "offline@example.com").unwrap();
        let inviter = Uuid::new_v4();
        let room = Room::new_group("team", inviter, vec![], false).unwrap();
        let notification =
            Notification::new_invitation(recipient.id, room.id, room.name.clone(), inviter);

        broadcaster
            .deliver_invitation(&recipient, &room, &notification)
            .await;
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);

        // 在线时走实时事件，不再发邮件
        let conn = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        presence.register(recipient.id, conn).await;
        broadcaster.register_connection(conn, tx).await;

        broadcaster
            .deliver_invitation(&recipient, &room, &notification)
            .await;
        assert_eq!(email.sent.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_dead_connections_are_pruned() {
        let (_, broadcaster) = broadcaster();
        let room_id = Uuid::new_v4();
        let conn = Uuid::new_v4();

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        broadcaster.register_connection(conn, tx).await;
        broadcaster.join_room(conn, room_id).await;

        let delivered = broadcaster.broadcast_room(room_id, &typing_event(room_id)).await;
        assert_eq!(delivered, 0);

        // 发送端已被清理
        let senders = broadcaster.senders.read().await;
        assert!(!senders.contains_key(&conn));
    }

    #[tokio::test]
    async fn test_broadcast_all() {
        let (_, broadcaster) = broadcaster();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        broadcaster.register_connection(Uuid::new_v4(), tx_a).await;
        broadcaster.register_connection(Uuid::new_v4(), tx_b).await;

        let event = ChatEvent::UserOnline {
            user_id: Uuid::new_v4(),
        };
        assert_eq!(broadcaster.broadcast_all(&event).await, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
