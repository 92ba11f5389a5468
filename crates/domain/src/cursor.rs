//! 分页游标
//!
//! 游标是一个不透明的时间戳边界，在房间的消息序列内单调。
//! 对外编码为 BASE64，解码失败视为非法请求而不是服务端错误。

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};

/// 消息分页游标（毫秒精度时间戳边界）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(i64);

impl Cursor {
    /// 从消息时间戳创建游标
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        Self(ts.timestamp_millis())
    }

    /// 游标对应的时间边界
    pub fn boundary(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0).single().unwrap_or_default()
    }

    /// 编码为客户端可见的不透明字符串
    pub fn encode(&self) -> String {
        data_encoding::BASE64.encode(self.0.to_string().as_bytes())
    }

    /// 解码客户端游标
    pub fn decode(raw: &str) -> DomainResult<Self> {
        let bytes = data_encoding::BASE64
            .decode(raw.as_bytes())
            .map_err(|_| DomainError::invalid_request("游标格式非法"))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| DomainError::invalid_request("游标格式非法"))?;
        let millis: i64 = text
            .parse()
            .map_err(|_| DomainError::invalid_request("游标格式非法"))?;
        Ok(Self(millis))
    }
}

impl From<DateTime<Utc>> for Cursor {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::from_timestamp(ts)
    }
}
