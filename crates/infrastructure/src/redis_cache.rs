//! Redis 缓存实现
//!
//! 缓存契约要求每个操作在缓存不可达时都是安全的空操作：这里把
//! 所有故障（超时、断连、协议错误）都记日志后吞掉，读退化为未命中，
//! 写退化为什么也不做。重连由 ConnectionManager 负责，指数退避
//! 封顶，建连与单次操作都有超时上限。

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use application::cache::Cache;
use config::RedisConfig;

/// Redis 缓存
pub struct RedisCache {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCache {
    /// 建立连接。只有启动期的首次建连失败会返回错误，之后的一切
    /// 故障都在内部退化；断线后由 ConnectionManager 按指数退避重连。
    pub async fn connect(config: &RedisConfig) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = tokio::time::timeout(
            Duration::from_millis(config.connect_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        .map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::IoError, "connect timed out"))
        })??;

        Ok(Self {
            conn,
            op_timeout: Duration::from_millis(config.op_timeout_ms),
        })
    }

    /// 带超时执行一条命令，任何失败都返回 None
    async fn run<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd, op: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        let query = async move {
            let value: redis::RedisResult<T> = cmd.query_async(&mut conn).await;
            value
        };
        match tokio::time::timeout(self.op_timeout, query).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                tracing::warn!(op = op, error = %err, "redis operation failed, degrading to miss");
                None
            }
            Err(_) => {
                tracing::warn!(op = op, "redis operation timed out, degrading to miss");
                None
            }
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.run::<Option<String>>(redis::cmd("GET").arg(key), "GET")
            .await
            .flatten()
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let ttl_secs = ttl.as_secs().max(1);
        let _: Option<()> = self
            .run(
                redis::cmd("SETEX").arg(key).arg(ttl_secs).arg(value),
                "SETEX",
            )
            .await;
    }

    async fn del(&self, key: &str) {
        let _: Option<i64> = self.run(redis::cmd("DEL").arg(key), "DEL").await;
    }

    async fn del_pattern(&self, pattern: &str) {
        // SCAN 游标遍历，避免阻塞式 KEYS
        let mut cursor: u64 = 0;
        loop {
            let reply: Option<(u64, Vec<String>)> = self
                .run(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(100),
                    "SCAN",
                )
                .await;

            let Some((next, keys)) = reply else {
                return;
            };
            if !keys.is_empty() {
                let mut del = redis::cmd("DEL");
                for key in &keys {
                    del.arg(key);
                }
                let _: Option<i64> = self.run(&del, "DEL").await;
            }

            cursor = next;
            if cursor == 0 {
                return;
            }
        }
    }
}
