//! 基础设施实现
//!
//! Redis 缓存适配器与 PostgreSQL 存储实现。

pub mod pg;
pub mod redis_cache;

pub use pg::{create_pg_pool, PgStore};
pub use redis_cache::RedisCache;
