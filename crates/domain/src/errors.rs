//! 领域模型错误定义
//!
//! 区分领域内的预期分支（资源不存在、权限不足）与基础设施故障。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 资源不存在错误
    #[error("资源不存在: {resource_type} {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    /// 权限错误（非成员或非管理员操作）
    #[error("权限不足: {action}")]
    Forbidden { action: String },

    /// 请求参数错误（非法游标、缺失字段）
    #[error("请求非法: {message}")]
    InvalidRequest { message: String },

    /// 资源已存在错误（唯一索引冲突）
    #[error("资源已存在: {resource_type} {identifier}")]
    AlreadyExists {
        resource_type: String,
        identifier: String,
    },

    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    Validation { field: String, message: String },

    /// 存储/缓存瞬时故障
    #[error("服务暂不可用: {message}")]
    Unavailable { message: String },
}

impl DomainError {
    /// 创建资源不存在错误
    pub fn not_found(resource_type: impl Into<String>, resource_id: impl ToString) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
        }
    }

    /// 创建权限错误
    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    /// 创建请求参数错误
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// 创建资源已存在错误
    pub fn already_exists(
        resource_type: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建瞬时故障错误
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
