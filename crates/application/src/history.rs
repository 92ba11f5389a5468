//! 消息历史分页
//!
//! 基于游标的倒序窗口读取：无游标时取最近 limit 条，带边界时取
//! 严格早于边界的 limit 条，存储按 (created_at, id) 降序返回，
//! 这里反转为时间正序交给客户端。绝不从房间起点正序扫描。
//!
//! `before` 与 `older_than` 行为相同，都是向更早的历史翻页；
//! 两者同时出现视为非法请求。是否还有更早一页由调用方根据
//! 返回条数是否等于 limit 推导。

use std::sync::Arc;

use domain::{Cursor, DomainError, Message, MessageStore};
use uuid::Uuid;

use crate::error::ApplicationResult;
use crate::rooms::RoomService;

/// 默认页大小
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// 页大小上限
pub const MAX_PAGE_SIZE: u32 = 100;

/// 分页请求
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// 页大小（0 取默认值，超过上限被截断）
    pub limit: u32,
    /// 边界游标：返回严格早于该时刻的消息
    pub before: Option<Cursor>,
    /// 边界游标，与 before 等价；两者至多出现一个
    pub older_than: Option<Cursor>,
}

impl PageRequest {
    pub fn latest(limit: u32) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn before(limit: u32, cursor: Cursor) -> Self {
        Self {
            limit,
            before: Some(cursor),
            ..Default::default()
        }
    }

    pub fn older_than(limit: u32, cursor: Cursor) -> Self {
        Self {
            limit,
            older_than: Some(cursor),
            ..Default::default()
        }
    }

    fn effective_limit(&self) -> u32 {
        if self.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.limit.min(MAX_PAGE_SIZE)
        }
    }
}

/// 消息分页器
pub struct MessagePager {
    rooms: Arc<RoomService>,
    messages: Arc<dyn MessageStore>,
}

impl MessagePager {
    pub fn new(rooms: Arc<RoomService>, messages: Arc<dyn MessageStore>) -> Self {
        Self { rooms, messages }
    }

    /// 请求方必须是房间成员。返回的消息按时间正序，对请求方隐藏的
    /// 消息在存储层就被排除，已撤回的消息以清空后的壳返回。
    pub async fn page(
        &self,
        room_id: Uuid,
        requester: Uuid,
        request: PageRequest,
    ) -> ApplicationResult<Vec<Message>> {
        if request.before.is_some() && request.older_than.is_some() {
            return Err(DomainError::invalid_request("before 与 older_than 不能同时出现").into());
        }

        self.rooms.require_member(room_id, requester).await?;

        let limit = request.effective_limit();
        let boundary = request.before.or(request.older_than);

        let mut batch = match boundary {
            Some(cursor) => {
                self.messages
                    .in_room_older_than(room_id, requester, cursor.boundary(), limit)
                    .await?
            }
            None => self.messages.latest_in_room(room_id, requester, limit).await?,
        };

        // 倒序窗口 → 时间正序
        batch.reverse();
        Ok(batch)
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod history_tests;
