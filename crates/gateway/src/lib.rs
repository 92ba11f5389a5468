//! WebSocket 网关
//!
//! 连接在升级时用 bearer token 认证一次，之后由 ConnectionSession
//! 承载该连接的全部交互：加入/退出房间广播组、带应答的消息发送、
//! 输入状态、已读上报、历史分页与房间列表。

pub mod auth;
pub mod connection;
pub mod frames;
pub mod state;

pub use auth::{JwtService, TokenError};
pub use frames::{ClientFrame, ResponseFrame, ServerFrame};
pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

/// 构建路由：唯一的 HTTP 面是 WebSocket 升级端点
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(connection::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
