//! 连接会话
//!
//! 每个连接一个轻量任务。升级成功后：先注册发送端，再注册在线表
//! （顺序保证 presence 可见的连接一定有发送端），离线→在线的迁移
//! 广播 user:online。断开路径是确定性的：注销发送端、注销在线表，
//! 只有本连接仍持有在线条目时才写 last_seen 并广播 user:offline——
//! 快速重连场景下旧连接的断开不会打断新会话。

use std::collections::HashSet;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use application::history::{PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use application::{ApplicationError, SendMessageCommand};
use domain::{ChatEvent, Cursor, DomainError, MessageType};

use crate::frames::{ClientFrame, ResponseFrame, ServerFrame};
use crate::state::AppState;

/// WebSocket连接查询参数
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// bearer token
    pub token: String,
}

/// 处理WebSocket连接升级
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, StatusCode> {
    let user_id = state.jwt.authenticate(&query.token).map_err(|_| {
        tracing::warn!("websocket upgrade rejected: invalid token");
        StatusCode::UNAUTHORIZED
    })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let connection_id = Uuid::new_v4();
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    // 广播事件与应答帧走同一个出站泵
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ChatEvent>();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ServerFrame>();

    let send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(event) = event_rx.recv() => ServerFrame::Event(event),
                Some(frame) = frame_rx.recv() => frame,
                else => break,
            };
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if sink.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize outgoing frame");
                }
            }
        }
    });

    // 先挂发送端，再登记在线表
    state
        .broadcaster
        .register_connection(connection_id, event_tx)
        .await;
    let replaced = state.presence.register(user_id, connection_id).await;
    if let Err(err) = state.users.set_online(user_id).await {
        tracing::warn!(user_id = %user_id, error = %err, "failed to persist online flag");
    }
    if replaced.is_none() {
        state
            .broadcaster
            .broadcast_all(&ChatEvent::UserOnline { user_id })
            .await;
    }

    let mut session = ConnectionSession::new(user_id, connection_id, state.clone(), frame_tx);

    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(WsMessage::Text(text)) => session.handle_text(&text).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(connection_id = %connection_id, error = %err, "websocket read failed");
                break;
            }
        }
    }

    // 确定性清理：任何退出路径都不能留下陈旧的在线条目
    state.broadcaster.unregister_connection(connection_id).await;
    if state.presence.unregister(user_id, connection_id).await {
        let last_seen = Utc::now();
        if let Err(err) = state.users.set_offline(user_id, last_seen).await {
            tracing::warn!(user_id = %user_id, error = %err, "failed to persist last_seen");
        }
        state
            .broadcaster
            .broadcast_all(&ChatEvent::UserOffline { user_id, last_seen })
            .await;
    }
    send_task.abort();

    tracing::info!(user_id = %user_id, connection_id = %connection_id, "websocket disconnected");
}

/// 单个连接的认证上下文与已加入的广播组
struct ConnectionSession {
    user_id: Uuid,
    connection_id: Uuid,
    joined_rooms: HashSet<Uuid>,
    state: AppState,
    frames: mpsc::UnboundedSender<ServerFrame>,
}

impl ConnectionSession {
    fn new(
        user_id: Uuid,
        connection_id: Uuid,
        state: AppState,
        frames: mpsc::UnboundedSender<ServerFrame>,
    ) -> Self {
        Self {
            user_id,
            connection_id,
            joined_rooms: HashSet::new(),
            state,
            frames,
        }
    }

    fn send(&self, frame: impl Into<ServerFrame>) {
        // 出站泵关闭意味着连接正在收尾，丢帧是安全的
        let _ = self.frames.send(frame.into());
    }

    fn send_error(&self, err: &ApplicationError) {
        self.send(ResponseFrame::Error {
            code: error_code(err).to_string(),
            message: err.to_string(),
        });
    }

    async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.handle_frame(frame).await,
            Err(err) => {
                tracing::debug!(connection_id = %self.connection_id, error = %err, "unparseable client frame");
                self.send(ResponseFrame::Error {
                    code: "INVALID_REQUEST".to_string(),
                    message: "unparseable frame".to_string(),
                });
            }
        }
    }

    async fn handle_frame(&mut self, frame: ClientFrame) {
        match frame {
            ClientFrame::JoinRoom { room_id } => self.handle_join(room_id).await,
            ClientFrame::LeaveRoom { room_id } => self.handle_leave(room_id).await,
            ClientFrame::SendMessage {
                client_ref,
                room_id,
                content,
                message_type,
                attachments,
            } => {
                self.handle_send(client_ref, room_id, content, message_type, attachments)
                    .await
            }
            ClientFrame::RevokeMessage { message_id } => {
                if let Err(err) = self
                    .state
                    .chat
                    .revoke_message(message_id, self.user_id)
                    .await
                {
                    self.send_error(&err);
                }
            }
            ClientFrame::HideMessage { message_id } => {
                if let Err(err) = self.state.chat.hide_message(message_id, self.user_id).await {
                    self.send_error(&err);
                }
            }
            ClientFrame::TypingStart { room_id } => self.handle_typing(room_id, true).await,
            ClientFrame::TypingStop { room_id } => self.handle_typing(room_id, false).await,
            ClientFrame::MarkRead { room_id } => {
                match self.state.tracker.mark_read(room_id, self.user_id).await {
                    Ok(_) => self.send(ResponseFrame::MarkedRead { room_id }),
                    Err(err) => self.send_error(&err),
                }
            }
            ClientFrame::MarkMessageRead { message_id } => {
                // 回执是尽力而为的，失败只记日志
                if let Err(err) = self
                    .state
                    .tracker
                    .mark_message_read(message_id, self.user_id)
                    .await
                {
                    tracing::debug!(message_id = %message_id, error = %err, "message receipt rejected");
                }
            }
            ClientFrame::PageMessages {
                room_id,
                limit,
                before,
                older_than,
            } => {
                self.handle_page(room_id, limit.unwrap_or(0), before, older_than)
                    .await
            }
            ClientFrame::ListRooms => match self.state.rooms.get_user_rooms(self.user_id).await {
                Ok(rooms) => self.send(ResponseFrame::RoomList { rooms }),
                Err(err) => self.send_error(&err),
            },
            ClientFrame::DirectRoom { user_id } => {
                match self
                    .state
                    .rooms
                    .create_direct_room(self.user_id, user_id)
                    .await
                {
                    Ok(room) => self.send(ResponseFrame::DirectRoom { room_id: room.id }),
                    Err(err) => self.send_error(&err),
                }
            }
            ClientFrame::UnreadCount { room_id } => {
                match self.state.tracker.unread_count(room_id, self.user_id).await {
                    Ok(count) => self.send(ResponseFrame::Unread { room_id, count }),
                    Err(err) => self.send_error(&err),
                }
            }
            ClientFrame::Invite { room_id, user_id } => {
                match self
                    .state
                    .rooms
                    .invite_user(room_id, self.user_id, user_id)
                    .await
                {
                    Ok(notification) => self.send(ResponseFrame::InvitationSent {
                        notification_id: notification.id,
                    }),
                    Err(err) => self.send_error(&err),
                }
            }
            ClientFrame::RespondInvitation {
                notification_id,
                accept,
            } => {
                match self
                    .state
                    .rooms
                    .respond_invitation(notification_id, self.user_id, accept)
                    .await
                {
                    Ok(joined) => self.send(ResponseFrame::InvitationResponded {
                        notification_id,
                        accepted: accept,
                        room_id: joined.map(|room| room.id),
                    }),
                    Err(err) => self.send_error(&err),
                }
            }
            ClientFrame::ListInvitations => {
                match self.state.rooms.pending_invitations(self.user_id).await {
                    Ok(invitations) => self.send(ResponseFrame::InvitationList { invitations }),
                    Err(err) => self.send_error(&err),
                }
            }
        }
    }

    /// 加入广播组：成员资格只在这里校验一次，之后的事件不再逐条复核
    async fn handle_join(&mut self, room_id: Uuid) {
        match self.state.rooms.require_member(room_id, self.user_id).await {
            Ok(_) => {
                self.state
                    .broadcaster
                    .join_room(self.connection_id, room_id)
                    .await;
                self.joined_rooms.insert(room_id);
                self.send(ResponseFrame::Joined { room_id });
            }
            Err(err) => self.send_error(&err),
        }
    }

    async fn handle_leave(&mut self, room_id: Uuid) {
        self.state
            .broadcaster
            .leave_room(self.connection_id, room_id)
            .await;
        self.joined_rooms.remove(&room_id);
        self.send(ResponseFrame::Left { room_id });
    }

    async fn handle_send(
        &mut self,
        client_ref: String,
        room_id: Uuid,
        content: String,
        message_type: Option<MessageType>,
        attachments: Vec<domain::Attachment>,
    ) {
        let command = SendMessageCommand {
            room_id,
            sender_id: self.user_id,
            content,
            message_type: message_type.unwrap_or_default(),
            attachments,
        };

        // 应答与房间广播相互独立，客户端按消息ID去重
        match self.state.chat.send_message(command).await {
            Ok(message) => self.send(ResponseFrame::SendAck {
                client_ref,
                success: true,
                message: Some(message),
                error: None,
            }),
            Err(err) => self.send(ResponseFrame::SendAck {
                client_ref,
                success: false,
                message: None,
                error: Some(error_code(&err).to_string()),
            }),
        }
    }

    /// 输入状态只发给已加入广播组的房间；未加入时静默忽略
    async fn handle_typing(&self, room_id: Uuid, typing: bool) {
        if !self.joined_rooms.contains(&room_id) {
            return;
        }
        self.state
            .broadcaster
            .broadcast_room(
                room_id,
                &ChatEvent::UserTyping {
                    room_id,
                    user_id: self.user_id,
                    typing,
                },
            )
            .await;
    }

    async fn handle_page(
        &self,
        room_id: Uuid,
        limit: u32,
        before: Option<String>,
        older_than: Option<String>,
    ) {
        let before = match before.as_deref().map(Cursor::decode).transpose() {
            Ok(cursor) => cursor,
            Err(err) => return self.send_error(&err.into()),
        };
        let older_than = match older_than.as_deref().map(Cursor::decode).transpose() {
            Ok(cursor) => cursor,
            Err(err) => return self.send_error(&err.into()),
        };

        let effective_limit = if limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            limit.min(MAX_PAGE_SIZE)
        };
        let request = PageRequest {
            limit,
            before,
            older_than,
        };

        match self.state.pager.page(room_id, self.user_id, request).await {
            Ok(messages) => {
                let has_more = messages.len() as u32 == effective_limit;
                let next_cursor = messages
                    .first()
                    .map(|m| Cursor::from_timestamp(m.created_at).encode());
                self.send(ResponseFrame::MessagePage {
                    room_id,
                    messages,
                    has_more,
                    next_cursor,
                });
            }
            Err(err) => self.send_error(&err),
        }
    }
}

fn error_code(err: &ApplicationError) -> &'static str {
    match err {
        ApplicationError::Domain(DomainError::NotFound { .. }) => "NOT_FOUND",
        ApplicationError::Domain(DomainError::Forbidden { .. }) => "FORBIDDEN",
        ApplicationError::Domain(
            DomainError::InvalidRequest { .. } | DomainError::Validation { .. },
        ) => "INVALID_REQUEST",
        ApplicationError::Domain(DomainError::AlreadyExists { .. }) => "CONFLICT",
        ApplicationError::Domain(DomainError::Unavailable { .. })
        | ApplicationError::Infrastructure(_) => "UNAVAILABLE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use application::cache::memory::MemoryCache;
    use application::rooms::RoomServiceDependencies;
    use application::{
        ChatService, EventBroadcaster, MemoryStore, MessagePager, NoopEmailNotifier,
        PresenceRegistry, ReadTracker, RoomService,
    };
    use domain::{MessageStore, NotificationStore, RoomStore, UserStore};

    use crate::auth::JwtService;

    fn build_state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        let presence = Arc::new(PresenceRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new(
            presence.clone(),
            Arc::new(NoopEmailNotifier),
        ));
        let rooms = Arc::new(RoomService::new(RoomServiceDependencies {
            rooms: store.clone() as Arc<dyn RoomStore>,
            messages: store.clone() as Arc<dyn MessageStore>,
            notifications: store.clone() as Arc<dyn NotificationStore>,
            users: store.clone() as Arc<dyn UserStore>,
            cache: Arc::new(MemoryCache::new()),
            broadcaster: broadcaster.clone(),
        }));
        let chat = Arc::new(ChatService::new(
            rooms.clone(),
            store.clone() as Arc<dyn MessageStore>,
            broadcaster.clone(),
        ));
        let pager = Arc::new(MessagePager::new(
            rooms.clone(),
            store.clone() as Arc<dyn MessageStore>,
        ));
        let tracker = Arc::new(ReadTracker::new(
            store.clone() as Arc<dyn RoomStore>,
            store.clone() as Arc<dyn MessageStore>,
        ));

        let state = AppState {
            jwt: Arc::new(JwtService::new("gateway-test-secret-key-32-chars-min")),
            presence,
            broadcaster,
            rooms,
            chat,
            pager,
            tracker,
            users: store.clone() as Arc<dyn UserStore>,
        };
        (store, state)
    }

    fn session(state: &AppState, user_id: Uuid) -> (ConnectionSession, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ConnectionSession::new(user_id, Uuid::new_v4(), state.clone(), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn test_join_requires_membership() {
        let (_store, state) = build_state();
        let member = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let room = state
            .rooms
            .create_group_room("ws", member, vec![], false)
            .await
            .unwrap();

        let (mut session, mut rx) = session(&state, stranger);
        session
            .handle_frame(ClientFrame::JoinRoom { room_id: room.id })
            .await;

        match rx.try_recv().unwrap() {
            ServerFrame::Response(ResponseFrame::Error { code, .. }) => {
                assert_eq!(code, "FORBIDDEN");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(session.joined_rooms.is_empty());
    }

    #[tokio::test]
    async fn test_send_ack_carries_canonical_id() {
        let (_store, state) = build_state();
        let member = Uuid::new_v4();
        let room = state
            .rooms
            .create_group_room("ws", member, vec![], false)
            .await
            .unwrap();

        let (mut sess, mut rx) = session(&state, member);
        sess.handle_frame(ClientFrame::JoinRoom { room_id: room.id })
            .await;
        let _ = rx.try_recv();

        sess.handle_frame(ClientFrame::SendMessage {
            client_ref: "tmp-42".into(),
            room_id: room.id,
            content: "hello".into(),
            message_type: None,
            attachments: Vec::new(),
        })
        .await;

        match rx.try_recv().unwrap() {
            ServerFrame::Response(ResponseFrame::SendAck {
                client_ref,
                success,
                message,
                ..
            }) => {
                assert_eq!(client_ref, "tmp-42");
                assert!(success);
                assert_eq!(message.unwrap().content, "hello");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_send_acks_with_error() {
        let (_store, state) = build_state();
        let stranger = Uuid::new_v4();
        let member = Uuid::new_v4();
        let room = state
            .rooms
            .create_group_room("ws", member, vec![], false)
            .await
            .unwrap();

        let (mut sess, mut rx) = session(&state, stranger);
        sess.handle_frame(ClientFrame::SendMessage {
            client_ref: "tmp-1".into(),
            room_id: room.id,
            content: "nope".into(),
            message_type: None,
            attachments: Vec::new(),
        })
        .await;

        match rx.try_recv().unwrap() {
            ServerFrame::Response(ResponseFrame::SendAck {
                success, error, ..
            }) => {
                assert!(!success);
                assert_eq!(error.as_deref(), Some("FORBIDDEN"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_page_frame_rejects_bad_cursor() {
        let (_store, state) = build_state();
        let member = Uuid::new_v4();
        let room = state
            .rooms
            .create_group_room("ws", member, vec![], false)
            .await
            .unwrap();

        let (sess, mut rx) = session(&state, member);
        sess.handle_page(room.id, 10, Some("!!garbage!!".into()), None)
            .await;

        match rx.try_recv().unwrap() {
            ServerFrame::Response(ResponseFrame::Error { code, .. }) => {
                assert_eq!(code, "INVALID_REQUEST");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_typing_ignored_before_join() {
        let (_store, state) = build_state();
        let member = Uuid::new_v4();
        let room = state
            .rooms
            .create_group_room("ws", member, vec![], false)
            .await
            .unwrap();

        // 另一个已加入广播组的观察者连接
        let observer_conn = Uuid::new_v4();
        let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
        state
            .broadcaster
            .register_connection(observer_conn, observer_tx)
            .await;
        state.broadcaster.join_room(observer_conn, room.id).await;

        let (mut sess, _rx) = session(&state, member);
        // 未加入广播组：输入状态被忽略
        sess.handle_typing(room.id, true).await;
        assert!(observer_rx.try_recv().is_err());

        sess.handle_frame(ClientFrame::JoinRoom { room_id: room.id })
            .await;
        sess.handle_typing(room.id, true).await;
        match observer_rx.try_recv().unwrap() {
            ChatEvent::UserTyping { typing, .. } => assert!(typing),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_error_code_mapping() {
        let not_found: ApplicationError = DomainError::not_found("room", Uuid::new_v4()).into();
        assert_eq!(error_code(&not_found), "NOT_FOUND");

        let forbidden: ApplicationError = DomainError::forbidden("x").into();
        assert_eq!(error_code(&forbidden), "FORBIDDEN");

        let invalid: ApplicationError = DomainError::invalid_request("x").into();
        assert_eq!(error_code(&invalid), "INVALID_REQUEST");

        let unavailable: ApplicationError = DomainError::unavailable("x").into();
        assert_eq!(error_code(&unavailable), "UNAVAILABLE");

        let infra = ApplicationError::infrastructure("x");
        assert_eq!(error_code(&infra), "UNAVAILABLE");
    }
}
