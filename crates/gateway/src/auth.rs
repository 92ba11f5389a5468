//! 连接认证
//!
//! 连接升级时把 bearer token 解析成用户ID，之后不再重复认证。
//! 签发、刷新等认证机制属于外部协作方，这里只消费。

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
}

/// JWT claims，sub 即用户ID
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// 连接令牌校验服务
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// 把 bearer token 解析为用户ID
    pub fn authenticate(&self, token: &str) -> Result<Uuid, TokenError> {
        let data =
            decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                TokenError::Invalid
            })?;
        Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::Invalid)
    }

    /// 签发令牌（开发与测试用；生产签发在认证服务侧）
    pub fn issue(&self, user_id: Uuid, ttl_secs: i64) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: chrono::Utc::now().timestamp() + ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|_| TokenError::Invalid)
    }
}
