use domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    /// 是否为预期的领域分支（而不是基础设施故障）
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ApplicationError::Domain(
                DomainError::NotFound { .. }
                    | DomainError::Forbidden { .. }
                    | DomainError::InvalidRequest { .. }
                    | DomainError::Validation { .. }
            )
        )
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
