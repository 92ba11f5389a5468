//! 线上帧定义
//!
//! 客户端帧与服务端帧都以 `event` 字段区分。message:send 携带
//! 客户端生成的 client_ref 关联ID，应答原样带回并附上服务端的
//! 规范消息ID；房间广播独立于应答，客户端按消息ID去重。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain::{Attachment, ChatEvent, Message, MessageType, Notification, RoomSummary};

/// 客户端 → 服务端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ClientFrame {
    /// 加入房间广播组（成员资格在此刻校验一次）
    #[serde(rename = "room:join")]
    JoinRoom { room_id: Uuid },

    /// 退出房间广播组
    #[serde(rename = "room:leave")]
    LeaveRoom { room_id: Uuid },

    /// 发送消息，带应答
    #[serde(rename = "message:send")]
    SendMessage {
        /// 客户端关联ID，应答原样带回
        client_ref: String,
        room_id: Uuid,
        #[serde(default)]
        content: String,
        #[serde(default)]
        message_type: Option<MessageType>,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },

    /// 撤回消息（对所有人删除）
    #[serde(rename = "message:revoke")]
    RevokeMessage { message_id: Uuid },

    /// 仅对自己删除
    #[serde(rename = "message:hide")]
    HideMessage { message_id: Uuid },

    /// 开始输入
    #[serde(rename = "typing:start")]
    TypingStart { room_id: Uuid },

    /// 停止输入
    #[serde(rename = "typing:stop")]
    TypingStop { room_id: Uuid },

    /// 推进房间已读游标
    #[serde(rename = "room:markread")]
    MarkRead { room_id: Uuid },

    /// 单条消息已读回执
    #[serde(rename = "message:markread")]
    MarkMessageRead { message_id: Uuid },

    /// 历史分页；before 与 older_than 都是向更早翻页，至多出现一个
    #[serde(rename = "messages:page")]
    PageMessages {
        room_id: Uuid,
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default)]
        before: Option<String>,
        #[serde(default)]
        older_than: Option<String>,
    },

    /// 房间列表
    #[serde(rename = "rooms:list")]
    ListRooms,

    /// 解析/创建与某用户的 direct 房间
    #[serde(rename = "room:direct")]
    DirectRoom { user_id: Uuid },

    /// 房间未读数
    #[serde(rename = "room:unread")]
    UnreadCount { room_id: Uuid },

    /// 邀请用户进入房间
    #[serde(rename = "room:invite")]
    Invite { room_id: Uuid, user_id: Uuid },

    /// 响应收到的邀请
    #[serde(rename = "invitation:respond")]
    RespondInvitation { notification_id: Uuid, accept: bool },

    /// 待处理邀请列表（补偿离线期间丢失的实时事件）
    #[serde(rename = "invitations:list")]
    ListInvitations,
}

/// 服务端应答帧（请求驱动，与广播事件相对）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ResponseFrame {
    /// message:send 的同步应答
    #[serde(rename = "message:ack")]
    SendAck {
        client_ref: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// 已加入广播组
    #[serde(rename = "room:joined")]
    Joined { room_id: Uuid },

    /// 已退出广播组
    #[serde(rename = "room:left")]
    Left { room_id: Uuid },

    /// 已读游标已推进
    #[serde(rename = "room:markread")]
    MarkedRead { room_id: Uuid },

    /// 历史分页结果，时间正序；has_more 由返回条数推导
    #[serde(rename = "messages:page")]
    MessagePage {
        room_id: Uuid,
        messages: Vec<Message>,
        has_more: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_cursor: Option<String>,
    },

    /// 房间列表，按最近活跃降序
    #[serde(rename = "rooms:list")]
    RoomList { rooms: Vec<RoomSummary> },

    /// direct 房间解析结果
    #[serde(rename = "room:direct")]
    DirectRoom { room_id: Uuid },

    /// 未读数
    #[serde(rename = "room:unread")]
    Unread { room_id: Uuid, count: u64 },

    /// 邀请已送出（实时或落盘）
    #[serde(rename = "invitation:sent")]
    InvitationSent { notification_id: Uuid },

    /// 邀请已响应；接受时带上房间ID
    #[serde(rename = "invitation:responded")]
    InvitationResponded {
        notification_id: Uuid,
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<Uuid>,
    },

    /// 待处理邀请列表
    #[serde(rename = "invitations:list")]
    InvitationList { invitations: Vec<Notification> },

    /// 请求失败
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

/// 服务端 → 客户端：应答帧或广播事件，线上形态都是 `event` 标记的对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Response(ResponseFrame),
    Event(ChatEvent),
}

impl From<ChatEvent> for ServerFrame {
    fn from(event: ChatEvent) -> Self {
        Self::Event(event)
    }
}

impl From<ResponseFrame> for ServerFrame {
    fn from(frame: ResponseFrame) -> Self {
        Self::Response(frame)
    }
}
