//! 主应用程序入口
//!
//! 装配同步层服务并启动 WebSocket 网关。

use std::sync::Arc;

use application::rooms::RoomServiceDependencies;
use application::{
    Cache, ChatService, DisabledCache, EventBroadcaster, MessagePager, NoopEmailNotifier,
    PresenceRegistry, ReadTracker, RoomService,
};
use config::AppConfig;
use domain::{MessageStore, NotificationStore, RoomStore, UserStore};
use gateway::{router, AppState, JwtService};
use infrastructure::{create_pg_pool, PgStore, RedisCache};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').last().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;
    let store = Arc::new(PgStore::new(pg_pool));

    // 缓存是可选依赖：未配置或建连失败都退化为关闭，绝不阻塞启动
    let cache: Arc<dyn Cache> = match &config.redis {
        Some(redis_config) => match RedisCache::connect(redis_config).await {
            Ok(cache) => {
                tracing::info!("Redis 缓存已启用");
                Arc::new(cache)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Redis 不可用，缓存关闭");
                Arc::new(DisabledCache)
            }
        },
        None => {
            tracing::info!("未配置 REDIS_URL，缓存关闭");
            Arc::new(DisabledCache)
        }
    };

    // 同步层服务图
    let presence = Arc::new(PresenceRegistry::new());
    let broadcaster = Arc::new(EventBroadcaster::new(
        presence.clone(),
        Arc::new(NoopEmailNotifier),
    ));
    let rooms = Arc::new(RoomService::new(RoomServiceDependencies {
        rooms: store.clone() as Arc<dyn RoomStore>,
        messages: store.clone() as Arc<dyn MessageStore>,
        notifications: store.clone() as Arc<dyn NotificationStore>,
        users: store.clone() as Arc<dyn UserStore>,
        cache,
        broadcaster: broadcaster.clone(),
    }));
    let chat = Arc::new(ChatService::new(
        rooms.clone(),
        store.clone() as Arc<dyn MessageStore>,
        broadcaster.clone(),
    ));
    let pager = Arc::new(MessagePager::new(
        rooms.clone(),
        store.clone() as Arc<dyn MessageStore>,
    ));
    let tracker = Arc::new(ReadTracker::new(
        store.clone() as Arc<dyn RoomStore>,
        store.clone() as Arc<dyn MessageStore>,
    ));

    let state = AppState {
        jwt: Arc::new(JwtService::new(&config.auth.jwt_secret)),
        presence,
        broadcaster,
        rooms,
        chat,
        pager,
        tracker,
        users: store as Arc<dyn UserStore>,
    };

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("聊天同步服务启动在 ws://{addr}/ws");
    axum::serve(listener, app).await?;

    Ok(())
}
