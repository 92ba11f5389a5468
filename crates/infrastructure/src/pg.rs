//! PostgreSQL 存储实现
//!
//! 实现全部 Store 契约。direct 房间的唯一性由 rooms.direct_key 上的
//! 部分唯一索引保证，唯一键冲突映射为 AlreadyExists 交由上层静默
//! 解决；其余存储故障一律映射为 Unavailable，与领域内的预期分支
//! （NotFound/Forbidden）分开。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use domain::{
    Attachment, DomainError, DomainResult, LastMessage, Message, MessageStore, MessageType,
    Notification, NotificationStatus, NotificationStore, ParticipantSettings, ReadReceipt, Room,
    RoomStore, RoomType, User, UserStore,
};

/// 创建 PostgreSQL 连接池
pub async fn create_pg_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

fn map_sqlx_err(err: sqlx::Error) -> DomainError {
    DomainError::unavailable(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> DomainError {
    DomainError::unavailable(message.into())
}

fn room_type_to_str(room_type: RoomType) -> &'static str {
    match room_type {
        RoomType::Group => "group",
        RoomType::Private => "private",
        RoomType::Direct => "direct",
    }
}

fn parse_room_type(raw: &str) -> DomainResult<RoomType> {
    match raw {
        "group" => Ok(RoomType::Group),
        "private" => Ok(RoomType::Private),
        "direct" => Ok(RoomType::Direct),
        other => Err(invalid_data(format!("unknown room type: {other}"))),
    }
}

fn message_type_to_str(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::Text => "text",
        MessageType::Image => "image",
        MessageType::File => "file",
        MessageType::System => "system",
    }
}

fn parse_message_type(raw: &str) -> DomainResult<MessageType> {
    match raw {
        "text" => Ok(MessageType::Text),
        "image" => Ok(MessageType::Image),
        "file" => Ok(MessageType::File),
        "system" => Ok(MessageType::System),
        other => Err(invalid_data(format!("unknown message type: {other}"))),
    }
}

fn status_to_str(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Pending => "pending",
        NotificationStatus::Accepted => "accepted",
        NotificationStatus::Declined => "declined",
    }
}

fn parse_status(raw: &str) -> DomainResult<NotificationStatus> {
    match raw {
        "pending" => Ok(NotificationStatus::Pending),
        "accepted" => Ok(NotificationStatus::Accepted),
        "declined" => Ok(NotificationStatus::Declined),
        other => Err(invalid_data(format!("unknown notification status: {other}"))),
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    avatar_url: Option<String>,
    online: bool,
    last_seen: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = DomainError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        User::with_id(
            value.id,
            value.username,
            value.email,
            value.avatar_url,
            value.online,
            value.last_seen,
            value.created_at,
        )
        .map_err(|err| invalid_data(err.to_string()))
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    name: String,
    room_type: String,
    members: Vec<Uuid>,
    admins: Vec<Uuid>,
    creator: Uuid,
    direct_key: Option<String>,
    last_message: Option<serde_json::Value>,
    participant_settings: serde_json::Value,
    last_activity: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoomRecord> for Room {
    type Error = DomainError;

    fn try_from(value: RoomRecord) -> Result<Self, Self::Error> {
        let room_type = parse_room_type(&value.room_type)?;
        let last_message: Option<LastMessage> = match value.last_message {
            Some(raw) => {
                Some(serde_json::from_value(raw).map_err(|err| invalid_data(err.to_string()))?)
            }
            None => None,
        };
        let participant_settings: HashMap<Uuid, ParticipantSettings> =
            serde_json::from_value(value.participant_settings)
                .map_err(|err| invalid_data(err.to_string()))?;

        Room::with_id(
            value.id,
            value.name,
            room_type,
            value.members,
            value.admins,
            value.creator,
            value.direct_key,
            last_message,
            participant_settings,
            value.last_activity,
            value.created_at,
        )
        .map_err(|err| invalid_data(err.to_string()))
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    content: String,
    message_type: String,
    attachments: serde_json::Value,
    read_by: serde_json::Value,
    hidden_for: Vec<Uuid>,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = DomainError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let message_type = parse_message_type(&value.message_type)?;
        let attachments: Vec<Attachment> = serde_json::from_value(value.attachments)
            .map_err(|err| invalid_data(err.to_string()))?;
        let read_by: Vec<ReadReceipt> =
            serde_json::from_value(value.read_by).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message::with_id(
            value.id,
            value.room_id,
            value.sender_id,
            value.content,
            message_type,
            attachments,
            read_by,
            value.hidden_for,
            value.revoked,
            value.created_at,
        ))
    }
}

#[derive(Debug, FromRow)]
struct NotificationRecord {
    id: Uuid,
    user_id: Uuid,
    room_id: Uuid,
    room_name: String,
    inviter_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = DomainError;

    fn try_from(value: NotificationRecord) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: value.id,
            user_id: value.user_id,
            room_id: value.room_id,
            room_name: value.room_name,
            inviter_id: value.inviter_id,
            status: parse_status(&value.status)?,
            created_at: value.created_at,
            responded_at: value.responded_at,
        })
    }
}

/// PostgreSQL 存储
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn settings_json(room: &Room) -> DomainResult<serde_json::Value> {
        serde_json::to_value(&room.participant_settings)
            .map_err(|err| invalid_data(err.to_string()))
    }
}

#[async_trait]
impl RoomStore for PgStore {
    async fn insert(&self, room: &Room) -> DomainResult<()> {
        let last_message = match &room.last_message {
            Some(last) => {
                Some(serde_json::to_value(last).map_err(|err| invalid_data(err.to_string()))?)
            }
            None => None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO rooms
                (id, name, room_type, members, admins, creator, direct_key,
                 last_message, participant_settings, last_activity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(room.id)
        .bind(&room.name)
        .bind(room_type_to_str(room.room_type))
        .bind(&room.members)
        .bind(&room.admins)
        .bind(room.creator)
        .bind(&room.direct_key)
        .bind(last_message)
        .bind(Self::settings_json(room)?)
        .bind(room.last_activity)
        .bind(room.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(DomainError::already_exists(
                    "direct room",
                    room.direct_key.clone().unwrap_or_default(),
                ))
            }
            Err(err) => Err(map_sqlx_err(err)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Room>> {
        let record = sqlx::query_as::<_, RoomRecord>("SELECT * FROM rooms WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(Room::try_from).transpose()
    }

    async fn find_direct(&self, a: Uuid, b: Uuid) -> DomainResult<Option<Room>> {
        let record = sqlx::query_as::<_, RoomRecord>(
            "SELECT * FROM rooms WHERE room_type = 'direct' AND direct_key = $1",
        )
        .bind(Room::direct_key(a, b))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Room::try_from).transpose()
    }

    async fn find_by_member(&self, user_id: Uuid) -> DomainResult<Vec<Room>> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT * FROM rooms
            WHERE members @> ARRAY[$1]::uuid[]
            ORDER BY last_activity DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Room::try_from).collect()
    }

    async fn update(&self, room: &Room) -> DomainResult<()> {
        let last_message = match &room.last_message {
            Some(last) => {
                Some(serde_json::to_value(last).map_err(|err| invalid_data(err.to_string()))?)
            }
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE rooms
            SET name = $2, members = $3, admins = $4, last_message = $5,
                participant_settings = $6, last_activity = $7
            WHERE id = $1
            "#,
        )
        .bind(room.id)
        .bind(&room.name)
        .bind(&room.members)
        .bind(&room.admins)
        .bind(last_message)
        .bind(Self::settings_json(room)?)
        .bind(room.last_activity)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("room", room.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn insert(&self, message: &Message) -> DomainResult<()> {
        let attachments = serde_json::to_value(&message.attachments)
            .map_err(|err| invalid_data(err.to_string()))?;
        let read_by =
            serde_json::to_value(&message.read_by).map_err(|err| invalid_data(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, room_id, sender_id, content, message_type, attachments,
                 read_by, hidden_for, revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(message.id)
        .bind(message.room_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message_type_to_str(message.message_type))
        .bind(attachments)
        .bind(read_by)
        .bind(&message.hidden_for)
        .bind(message.revoked)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(Message::try_from).transpose()
    }

    async fn update(&self, message: &Message) -> DomainResult<()> {
        let attachments = serde_json::to_value(&message.attachments)
            .map_err(|err| invalid_data(err.to_string()))?;
        let read_by =
            serde_json::to_value(&message.read_by).map_err(|err| invalid_data(err.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content = $2, attachments = $3, read_by = $4, hidden_for = $5, revoked = $6
            WHERE id = $1
            "#,
        )
        .bind(message.id)
        .bind(&message.content)
        .bind(attachments)
        .bind(read_by)
        .bind(&message.hidden_for)
        .bind(message.revoked)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("message", message.id));
        }
        Ok(())
    }

    async fn latest_in_room(
        &self,
        room_id: Uuid,
        viewer: Uuid,
        limit: u32,
    ) -> DomainResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT * FROM messages
            WHERE room_id = $1 AND NOT (hidden_for @> ARRAY[$2]::uuid[])
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(room_id)
        .bind(viewer)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Message::try_from).collect()
    }

    async fn in_room_older_than(
        &self,
        room_id: Uuid,
        viewer: Uuid,
        boundary: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT * FROM messages
            WHERE room_id = $1 AND created_at < $2
              AND NOT (hidden_for @> ARRAY[$3]::uuid[])
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(room_id)
        .bind(boundary)
        .bind(viewer)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Message::try_from).collect()
    }

    async fn count_unread(
        &self,
        room_id: Uuid,
        reader: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE room_id = $1 AND sender_id <> $2 AND created_at > $3
            "#,
        )
        .bind(room_id)
        .bind(reader)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(count as u64)
    }

    async fn delete_by_room(&self, room_id: Uuid) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE room_id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(User::try_from).transpose()
    }

    async fn upsert(&self, user: &User) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, avatar_url, online, last_seen, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET username = EXCLUDED.username, email = EXCLUDED.email,
                avatar_url = EXCLUDED.avatar_url
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.avatar_url)
        .bind(user.online)
        .bind(user.last_seen)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn set_online(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("UPDATE users SET online = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn set_offline(&self, id: Uuid, last_seen: DateTime<Utc>) -> DomainResult<()> {
        sqlx::query("UPDATE users SET online = FALSE, last_seen = $2 WHERE id = $1")
            .bind(id)
            .bind(last_seen)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, notification: &Notification) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, room_id, room_name, inviter_id, status, created_at, responded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.room_id)
        .bind(&notification.room_name)
        .bind(notification.inviter_id)
        .bind(status_to_str(notification.status))
        .bind(notification.created_at)
        .bind(notification.responded_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Notification>> {
        let record =
            sqlx::query_as::<_, NotificationRecord>("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        record.map(Notification::try_from).transpose()
    }

    async fn update(&self, notification: &Notification) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET status = $2, responded_at = $3 WHERE id = $1",
        )
        .bind(notification.id)
        .bind(status_to_str(notification.status))
        .bind(notification.responded_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("notification", notification.id));
        }
        Ok(())
    }

    async fn pending_for_user(&self, user_id: Uuid) -> DomainResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Notification::try_from).collect()
    }

    async fn delete_pending_by_room(&self, room_id: Uuid) -> DomainResult<u64> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE room_id = $1 AND status = 'pending'")
                .bind(room_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}
