//! 在线表
//!
//! 进程级的 用户 → 活跃连接 映射，单活跃会话模型：同一用户的新连接
//! 替换旧条目（最新者胜）。整张表由一把读写锁保护，同一用户的
//! register/unregister 不会交错；快速重连时旧连接的注销必须带着
//! 自己的连接ID，只有仍然持有条目的连接才能把用户打下线。
//!
//! 在线表查询失败从不阻塞消息投递：查不到一律视为"离线"。

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

/// 进程级在线表
pub struct PresenceRegistry {
    entries: RwLock<HashMap<Uuid, Uuid>>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 注册连接，替换该用户已有的条目；返回被替换的连接ID
    pub async fn register(&self, user_id: Uuid, connection_id: Uuid) -> Option<Uuid> {
        let mut entries = self.entries.write().await;
        let replaced = entries.insert(user_id, connection_id);
        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            replaced = replaced.is_some(),
            "presence registered"
        );
        replaced
    }

    /// 注销连接。只有当前条目仍属于该连接时才移除，防止快速重连时
    /// 旧连接的迟到注销覆盖新注册。返回用户是否因此下线。
    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(&user_id) {
            Some(current) if *current == connection_id => {
                entries.remove(&user_id);
                tracing::debug!(user_id = %user_id, "presence unregistered");
                true
            }
            _ => false,
        }
    }

    /// 用户的活跃连接；不存在即离线
    pub async fn lookup(&self, user_id: Uuid) -> Option<Uuid> {
        let entries = self.entries.read().await;
        entries.get(&user_id).copied()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.lookup(user_id).await.is_some()
    }

    /// 当前在线用户列表
    pub async fn online_users(&self) -> Vec<Uuid> {
        let entries = self.entries.read().await;
        entries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let conn = Uuid::new_v4();

        assert!(registry.lookup(user).await.is_none());
        assert!(registry.register(user, conn).await.is_none());
        assert_eq!(registry.lookup(user).await, Some(conn));
        assert!(registry.is_online(user).await);
    }

    #[tokio::test]
    async fn test_reregister_replaces_previous_entry() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let old_conn = Uuid::new_v4();
        let new_conn = Uuid::new_v4();

        registry.register(user, old_conn).await;
        let replaced = registry.register(user, new_conn).await;
        assert_eq!(replaced, Some(old_conn));
        assert_eq!(registry.lookup(user).await, Some(new_conn));
    }

    #[tokio::test]
    async fn test_stale_unregister_does_not_mark_offline() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let old_conn = Uuid::new_v4();
        let new_conn = Uuid::new_v4();

        registry.register(user, old_conn).await;
        registry.register(user, new_conn).await;

        // 旧连接迟到的注销不能把用户打下线
        assert!(!registry.unregister(user, old_conn).await);
        assert!(registry.is_online(user).await);

        // 持有条目的连接注销后用户才下线
        assert!(registry.unregister(user, new_conn).await);
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn test_online_users() {
        let registry = PresenceRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.register(a, Uuid::new_v4()).await;
        registry.register(b, Uuid::new_v4()).await;

        let mut online = registry.online_users().await;
        online.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(online, expected);
    }
}
