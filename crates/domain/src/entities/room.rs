//! 房间实体定义
//!
//! 不变量：creator ∈ members；admins ⊆ members；direct 房间恰好 2 名成员，
//! 且同一无序成员对至多存在一个 direct 房间（由 direct_key 唯一索引保证）。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 房间类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    /// 公开群组
    Group,
    /// 私密群组
    Private,
    /// 两人直聊
    Direct,
}

/// 单个成员的房间设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSettings {
    /// 是否静音
    pub muted: bool,
    /// 是否归档
    pub archived: bool,
    /// 是否置顶
    pub pinned: bool,
    /// 已读游标（未设置视为 epoch）
    pub last_read: Option<DateTime<Utc>>,
}

/// 房间最近一条消息的摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub preview: String,
    pub sent_at: DateTime<Utc>,
}

/// 房间列表条目（按最近活跃排序返回给客户端）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub name: String,
    pub room_type: RoomType,
    pub member_count: usize,
    pub last_message: Option<LastMessage>,
    pub last_activity: DateTime<Utc>,
}

/// 房间实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// 房间唯一ID
    pub id: Uuid,
    /// 房间名（direct 房间为空，由客户端用对端用户名渲染）
    pub name: String,
    /// 房间类型
    pub room_type: RoomType,
    /// 成员集合（顺序无意义，保持无重复）
    pub members: Vec<Uuid>,
    /// 管理员集合，admins ⊆ members
    pub admins: Vec<Uuid>,
    /// 创建者
    pub creator: Uuid,
    /// direct 房间的唯一键（规范化成员对），其余类型为 None；
    /// 创建后不变，成员变动不影响它
    pub direct_key: Option<String>,
    /// 最近一条消息摘要
    pub last_message: Option<LastMessage>,
    /// 每个成员的房间设置
    pub participant_settings: HashMap<Uuid, ParticipantSettings>,
    /// 最近活跃时间（用于列表排序）
    pub last_activity: DateTime<Utc>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// 创建群组房间，创建者自动成为成员和管理员
    pub fn new_group(
        name: impl Into<String>,
        creator: Uuid,
        members: Vec<Uuid>,
        private: bool,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name", "房间名不能为空"));
        }
        if name.len() > 128 {
            return Err(DomainError::validation("name", "房间名不能超过128个字符"));
        }

        let mut all_members = vec![creator];
        for member in members {
            if !all_members.contains(&member) {
                all_members.push(member);
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            room_type: if private {
                RoomType::Private
            } else {
                RoomType::Group
            },
            members: all_members,
            admins: vec![creator],
            creator,
            direct_key: None,
            last_message: None,
            participant_settings: HashMap::new(),
            last_activity: now,
            created_at: now,
        })
    }

    /// 创建两人直聊房间（成员对按 id 排序规范化）
    pub fn new_direct(a: Uuid, b: Uuid) -> DomainResult<Self> {
        if a == b {
            return Err(DomainError::validation("members", "直聊房间需要两个不同的用户"));
        }
        let (low, high) = Self::canonical_pair(a, b);

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: String::new(),
            room_type: RoomType::Direct,
            members: vec![low, high],
            admins: Vec::new(),
            creator: a,
            direct_key: Some(Self::direct_key(low, high)),
            last_message: None,
            participant_settings: HashMap::new(),
            last_activity: now,
            created_at: now,
        })
    }

    /// 从存储加载房间，校验核心不变量
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: Uuid,
        name: String,
        room_type: RoomType,
        members: Vec<Uuid>,
        admins: Vec<Uuid>,
        creator: Uuid,
        direct_key: Option<String>,
        last_message: Option<LastMessage>,
        participant_settings: HashMap<Uuid, ParticipantSettings>,
        last_activity: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        // 成员离开后 direct 房间可能短暂只剩1人，加载时只拒绝超员
        if room_type == RoomType::Direct && members.len() > 2 {
            return Err(DomainError::validation("members", "直聊房间最多2名成员"));
        }
        if admins.iter().any(|admin| !members.contains(admin)) {
            return Err(DomainError::validation("admins", "管理员必须是房间成员"));
        }

        Ok(Self {
            id,
            name,
            room_type,
            members,
            admins,
            creator,
            direct_key,
            last_message,
            participant_settings,
            last_activity,
            created_at,
        })
    }

    /// 无序成员对的规范化（低 id 在前）
    pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// direct 房间的唯一键，对成员对的顺序不敏感
    pub fn direct_key(a: Uuid, b: Uuid) -> String {
        let (low, high) = Self::canonical_pair(a, b);
        format!("{low}:{high}")
    }

    pub fn is_direct(&self) -> bool {
        self.room_type == RoomType::Direct
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.admins.contains(&user_id)
    }

    /// 添加成员，幂等；返回是否发生变化
    pub fn add_member(&mut self, user_id: Uuid) -> DomainResult<bool> {
        if self.is_direct() {
            return Err(DomainError::invalid_request("直聊房间不能添加成员"));
        }
        if self.members.contains(&user_id) {
            return Ok(false);
        }
        self.members.push(user_id);
        Ok(true)
    }

    /// 移除成员，同时清理管理员身份与成员设置；返回是否发生变化
    pub fn remove_member(&mut self, user_id: Uuid) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != user_id);
        self.admins.retain(|a| *a != user_id);
        self.participant_settings.remove(&user_id);
        self.members.len() != before
    }

    /// 成员的房间设置（不存在时返回默认值）
    pub fn settings_of(&self, user_id: Uuid) -> ParticipantSettings {
        self.participant_settings
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 成员的已读游标
    pub fn last_read_of(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.participant_settings
            .get(&user_id)
            .and_then(|settings| settings.last_read)
    }

    /// 推进成员的已读游标（幂等）
    pub fn mark_read(&mut self, user_id: Uuid, at: DateTime<Utc>) {
        self.participant_settings
            .entry(user_id)
            .or_default()
            .last_read = Some(at);
    }

    /// 记录最近一条消息并刷新活跃时间
    pub fn touch_message(&mut self, last: LastMessage) {
        self.last_activity = last.sent_at;
        self.last_message = Some(last);
    }

    /// 生成列表条目
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            room_type: self.room_type,
            member_count: self.members.len(),
            last_message: self.last_message.clone(),
            last_activity: self.last_activity,
        }
    }
}
