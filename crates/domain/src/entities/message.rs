//! 消息实体定义
//!
//! 撤回（revoke）是服务端强制的"对所有人删除"：内容与附件被清空，
//! 消息壳保留在历史中。hidden_for 是"仅对我删除"，只影响列出的用户，
//! 与撤回状态无关。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// 文本消息
    Text,
    /// 图片消息
    Image,
    /// 文件消息
    File,
    /// 系统消息（成员变更提示等）
    System,
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Text
    }
}

/// 消息附件信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// 文件名
    pub filename: String,
    /// 文件URL
    pub url: String,
    /// 文件大小（字节）
    pub size: u64,
    /// MIME类型
    pub mime_type: String,
    /// 缩略图URL（可选）
    pub thumbnail_url: Option<String>,
}

/// 单个用户的已读回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// 消息实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 消息唯一ID
    pub id: Uuid,
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
    /// 已读回执
    pub read_by: Vec<ReadReceipt>,
    /// 对这些用户隐藏（仅对我删除）
    pub hidden_for: Vec<Uuid>,
    /// 是否已撤回
    pub revoked: bool,
    /// 发送时间
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// 创建文本消息
    pub fn new_text(room_id: Uuid, sender_id: Uuid, content: impl Into<String>) -> DomainResult<Self> {
        Self::new(room_id, sender_id, content, MessageType::Text, Vec::new())
    }

    /// 创建消息；没有附件时内容必填
    pub fn new(
        room_id: Uuid,
        sender_id: Uuid,
        content: impl Into<String>,
        message_type: MessageType,
        attachments: Vec<Attachment>,
    ) -> DomainResult<Self> {
        let content = content.into();
        Self::validate_content(&content, &attachments)?;

        Ok(Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            content,
            message_type,
            attachments,
            read_by: Vec::new(),
            hidden_for: Vec::new(),
            revoked: false,
            created_at: Utc::now(),
        })
    }

    /// 从存储加载消息
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: Uuid,
        room_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: MessageType,
        attachments: Vec<Attachment>,
        read_by: Vec<ReadReceipt>,
        hidden_for: Vec<Uuid>,
        revoked: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            content,
            message_type,
            attachments,
            read_by,
            hidden_for,
            revoked,
            created_at,
        }
    }

    /// 撤回消息：清空内容与附件，保留消息壳；幂等
    pub fn revoke(&mut self) {
        self.revoked = true;
        self.content.clear();
        self.attachments.clear();
    }

    /// 对指定用户隐藏；幂等，返回是否发生变化
    pub fn hide_for(&mut self, user_id: Uuid) -> bool {
        if self.hidden_for.contains(&user_id) {
            return false;
        }
        self.hidden_for.push(user_id);
        true
    }

    /// 消息对指定用户是否不可见
    pub fn is_hidden_for(&self, user_id: Uuid) -> bool {
        self.hidden_for.contains(&user_id)
    }

    /// 追加已读回执；幂等，返回是否发生变化
    pub fn mark_read_by(&mut self, user_id: Uuid, at: DateTime<Utc>) -> bool {
        if self.read_by.iter().any(|receipt| receipt.user_id == user_id) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            user_id,
            read_at: at,
        });
        true
    }

    /// 生成简短预览（用于房间列表摘要）
    pub fn preview(&self, max_chars: usize) -> String {
        if self.revoked {
            return String::new();
        }
        if self.content.is_empty() && !self.attachments.is_empty() {
            return format!("[{}]", self.attachments[0].filename);
        }
        if self.content.chars().count() <= max_chars {
            self.content.clone()
        } else {
            let truncated: String = self.content.chars().take(max_chars).collect();
            format!("{truncated}...")
        }
    }

    fn validate_content(content: &str, attachments: &[Attachment]) -> DomainResult<()> {
        if content.trim().is_empty() && attachments.is_empty() {
            return Err(DomainError::validation("content", "消息内容不能为空"));
        }
        if content.len() > 10000 {
            return Err(DomainError::validation(
                "content",
                "消息内容不能超过10000个字符",
            ));
        }
        Ok(())
    }
}
