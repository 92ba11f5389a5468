//! 用户实体定义
//!
//! online/last_seen 只由在线状态迁移修改，业务代码不直接写。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

/// 用户实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// 用户唯一ID
    pub id: Uuid,
    /// 用户名
    pub username: String,
    /// 邮箱
    pub email: String,
    /// 头像URL
    pub avatar_url: Option<String>,
    /// 是否在线
    pub online: bool,
    /// 最后在线时间
    pub last_seen: Option<DateTime<Utc>>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl User {
    /// 创建新用户
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> DomainResult<Self> {
        let username = username.into();
        let email = email.into();
        Self::validate_username(&username)?;
        Self::validate_email(&email)?;

        Ok(Self {
            id: Uuid::new_v4(),
            username,
            email,
            avatar_url: None,
            online: false,
            last_seen: None,
            created_at: Utc::now(),
        })
    }

    /// 创建具有指定ID的用户（用于从存储加载）
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: Uuid,
        username: impl Into<String>,
        email: impl Into<String>,
        avatar_url: Option<String>,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let username = username.into();
        let email = email.into();
        Self::validate_username(&username)?;
        Self::validate_email(&email)?;

        Ok(Self {
            id,
            username,
            email,
            avatar_url,
            online,
            last_seen,
            created_at,
        })
    }

    /// 在线状态迁移：上线
    pub fn mark_online(&mut self) {
        self.online = true;
    }

    /// 在线状态迁移：下线，记录最后在线时间
    pub fn mark_offline(&mut self, last_seen: DateTime<Utc>) {
        self.online = false;
        self.last_seen = Some(last_seen);
    }

    fn validate_username(username: &str) -> DomainResult<()> {
        if username.trim().is_empty() {
            return Err(DomainError::validation("username", "用户名不能为空"));
        }
        if username.len() > 64 {
            return Err(DomainError::validation("username", "用户名不能超过64个字符"));
        }
        Ok(())
    }

    fn validate_email(email: &str) -> DomainResult<()> {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(DomainError::validation("email", "邮箱格式非法"));
        }
        Ok(())
    }
}
