//! 缓存能力接口
//!
//! 缓存永远是建议性的：任何一次操作失败都只能退化为未命中，
//! 绝不向调用方抛错。因此接口本身不返回 Result，实现方在内部
//! 记录日志并吞掉故障。未配置缓存时在启动期选择 `DisabledCache`，
//! 调用点不做任何判空。

use std::time::Duration;

use async_trait::async_trait;

/// 键值缓存接口（带TTL与模式删除）
#[async_trait]
pub trait Cache: Send + Sync {
    /// 读取键；未命中、过期或故障时返回 None
    async fn get(&self, key: &str) -> Option<String>;

    /// 带TTL写入；写失败静默退化
    async fn set(&self, key: &str, value: &str, ttl: Duration);

    /// 删除单个键
    async fn del(&self, key: &str);

    /// 按模式删除（`*` 通配）
    async fn del_pattern(&self, pattern: &str);
}

/// 显式的"缓存关闭"实现：所有操作都是安全的空操作
pub struct DisabledCache;

#[async_trait]
impl Cache for DisabledCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) {}

    async fn del(&self, _key: &str) {}

    async fn del_pattern(&self, _pattern: &str) {}
}

/// 内存实现（用于测试）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::time::Instant;
    use tokio::sync::RwLock;

    pub struct MemoryCache {
        entries: RwLock<HashMap<String, (String, Instant)>>,
    }

    impl Default for MemoryCache {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MemoryCache {
        pub fn new() -> Self {
            Self {
                entries: RwLock::new(HashMap::new()),
            }
        }

        /// 当前存活的键数（测试断言用）
        pub async fn len(&self) -> usize {
            let now = Instant::now();
            let entries = self.entries.read().await;
            entries.values().filter(|(_, dl)| *dl > now).count()
        }

        pub async fn is_empty(&self) -> bool {
            self.len().await == 0
        }

        /// `*` 通配匹配
        fn glob_match(pattern: &str, key: &str) -> bool {
            let mut parts = pattern.split('*').peekable();
            let mut rest = key;
            let mut first = true;
            while let Some(part) = parts.next() {
                if part.is_empty() {
                    first = false;
                    continue;
                }
                if first {
                    if !rest.starts_with(part) {
                        return false;
                    }
                    rest = &rest[part.len()..];
                } else if parts.peek().is_none() && !pattern.ends_with('*') {
                    return rest.ends_with(part);
                } else if let Some(pos) = rest.find(part) {
                    rest = &rest[pos + part.len()..];
                } else {
                    return false;
                }
                first = false;
            }
            pattern.ends_with('*') || rest.is_empty()
        }
    }

    #[async_trait]
    impl Cache for MemoryCache {
        async fn get(&self, key: &str) -> Option<String> {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, deadline)) if *deadline > Instant::now() => Some(value.clone()),
                _ => None,
            }
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) {
            let mut entries = self.entries.write().await;
            entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        }

        async fn del(&self, key: &str) {
            let mut entries = self.entries.write().await;
            entries.remove(key);
        }

        async fn del_pattern(&self, pattern: &str) {
            let mut entries = self.entries.write().await;
            entries.retain(|key, _| !Self::glob_match(pattern, key));
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_set_get_del() {
            let cache = MemoryCache::new();
            cache.set("k", "v", Duration::from_secs(60)).await;
            assert_eq!(cache.get("k").await.as_deref(), Some("v"));

            cache.del("k").await;
            assert_eq!(cache.get("k").await, None);
        }

        #[tokio::test]
        async fn test_ttl_expiry() {
            let cache = MemoryCache::new();
            cache.set("k", "v", Duration::from_millis(10)).await;
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(cache.get("k").await, None);
        }

        #[tokio::test]
        async fn test_del_pattern() {
            let cache = MemoryCache::new();
            let ttl = Duration::from_secs(60);
            cache.set("rooms:user:1", "a", ttl).await;
            cache.set("rooms:user:2", "b", ttl).await;
            cache.set("direct:1:2", "c", ttl).await;

            cache.del_pattern("rooms:user:*").await;
            assert_eq!(cache.get("rooms:user:1").await, None);
            assert_eq!(cache.get("rooms:user:2").await, None);
            assert_eq!(cache.get("direct:1:2").await.as_deref(), Some("c"));
        }

        #[test]
        fn test_glob_match() {
            assert!(MemoryCache::glob_match("rooms:user:*", "rooms:user:42"));
            assert!(MemoryCache::glob_match("*", "anything"));
            assert!(MemoryCache::glob_match("direct:*:9", "direct:3:9"));
            assert!(!MemoryCache::glob_match("rooms:user:*", "direct:1:2"));
            assert!(MemoryCache::glob_match("exact", "exact"));
            assert!(!MemoryCache::glob_match("exact", "exact-not"));
        }
    }
}
