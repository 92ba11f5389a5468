use std::sync::Arc;

use application::{
    ChatService, EventBroadcaster, MessagePager, PresenceRegistry, ReadTracker, RoomService,
};
use domain::UserStore;

use crate::auth::JwtService;

/// 网关共享状态：同一进程内的全部同步层服务
#[derive(Clone)]
pub struct AppState {
    pub jwt: Arc<JwtService>,
    pub presence: Arc<PresenceRegistry>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub rooms: Arc<RoomService>,
    pub chat: Arc<ChatService>,
    pub pager: Arc<MessagePager>,
    pub tracker: Arc<ReadTracker>,
    pub users: Arc<dyn UserStore>,
}
