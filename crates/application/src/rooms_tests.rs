//! 房间仓储服务单元测试
//!
//! 覆盖 direct 房间解析的对称性与并发创建、缓存旁路的失效纪律、
//! 离开房间的级联删除，以及邀请流程。

use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;

use domain::{DomainError, Message, MessageStore, NotificationStore, RoomStore, User, UserStore};

use crate::broadcaster::EventBroadcaster;
use crate::cache::{memory::MemoryCache, Cache, DisabledCache};
use crate::email::NoopEmailNotifier;
use crate::error::ApplicationError;
use crate::memory::MemoryStore;
use crate::presence::PresenceRegistry;
use crate::rooms::{RoomService, RoomServiceDependencies};

struct TestEnv {
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCache>,
    service: Arc<RoomService>,
}

fn build_env_with_cache(cache: Arc<dyn Cache>) -> (Arc<MemoryStore>, Arc<RoomService>) {
    let store = Arc::new(MemoryStore::new());
    let presence = Arc::new(PresenceRegistry::new());
    let broadcaster = Arc::new(EventBroadcaster::new(presence, Arc::new(NoopEmailNotifier)));
    let service = Arc::new(RoomService::new(RoomServiceDependencies {
        rooms: store.clone() as Arc<dyn RoomStore>,
        messages: store.clone() as Arc<dyn MessageStore>,
        notifications: store.clone() as Arc<dyn NotificationStore>,
        users: store.clone() as Arc<dyn UserStore>,
        cache,
        broadcaster,
    }));
    (store, service)
}

fn build_env() -> TestEnv {
    let cache = Arc::new(MemoryCache::new());
    let (store, service) = build_env_with_cache(cache.clone() as Arc<dyn Cache>);
    TestEnv {
        store,
        cache,
        service,
    }
}

async fn add_user(store: &MemoryStore, name: &str) -> Uuid {
    let user = User::new(name, format!("{name}@example.com")).unwrap();
    let id = user.id;
    store.add_user(user).await;
    id
}

#[tokio::test]
async fn test_find_direct_room_is_symmetric() {
    let env = build_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert!(env.service.find_direct_room(a, b).await.unwrap().is_none());

    let created = env.service.create_direct_room(a, b).await.unwrap();
    let forward = env.service.find_direct_room(a, b).await.unwrap().unwrap();
    let reverse = env.service.find_direct_room(b, a).await.unwrap().unwrap();

    assert_eq!(forward.id, created.id);
    assert_eq!(reverse.id, created.id);
}

#[tokio::test]
async fn test_create_direct_room_returns_existing() {
    let env = build_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let first = env.service.create_direct_room(a, b).await.unwrap();
    let second = env.service.create_direct_room(b, a).await.unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn test_concurrent_direct_room_creation_yields_single_room() {
    let env = build_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let service = env.service.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    service.create_direct_room(a, b).await
                } else {
                    service.create_direct_room(b, a).await
                }
            })
        })
        .collect();

    let mut ids: Vec<Uuid> = Vec::new();
    for result in join_all(tasks).await {
        ids.push(result.unwrap().unwrap().id);
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1, "竞争创建产生了多个 direct 房间");
}

#[tokio::test]
async fn test_membership_mutation_invalidates_warm_cache() {
    let env = build_env();
    let creator = Uuid::new_v4();
    let joiner = Uuid::new_v4();

    let room = env
        .service
        .create_group_room("general", creator, vec![], false)
        .await
        .unwrap();

    // 预热双方的列表缓存
    let before_creator = env.service.get_user_rooms(creator).await.unwrap();
    assert_eq!(before_creator[0].member_count, 1);
    assert!(env.service.get_user_rooms(joiner).await.unwrap().is_empty());

    env.service.join_room(room.id, joiner).await.unwrap();

    // 缓存仍然温热，但失效保证读到最新成员集
    let after_creator = env.service.get_user_rooms(creator).await.unwrap();
    assert_eq!(after_creator[0].member_count, 2);
    let after_joiner = env.service.get_user_rooms(joiner).await.unwrap();
    assert_eq!(after_joiner.len(), 1);
    assert_eq!(after_joiner[0].id, room.id);
}

#[tokio::test]
async fn test_get_user_rooms_populates_cache_on_miss() {
    let env = build_env();
    let creator = Uuid::new_v4();
    env.service
        .create_group_room("news", creator, vec![], false)
        .await
        .unwrap();
    // create 之后缓存被失效
    assert!(env.cache.get(&format!("rooms:user:{creator}")).await.is_none());

    let listed = env.service.get_user_rooms(creator).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(env.cache.get(&format!("rooms:user:{creator}")).await.is_some());
}

#[tokio::test]
async fn test_corrupt_cache_entry_degrades_to_store() {
    let env = build_env();
    let creator = Uuid::new_v4();
    env.service
        .create_group_room("ops", creator, vec![], false)
        .await
        .unwrap();

    env.cache
        .set(
            &format!("rooms:user:{creator}"),
            "not-json",
            std::time::Duration::from_secs(300),
        )
        .await;

    let listed = env.service.get_user_rooms(creator).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_disabled_cache_serves_from_store() {
    let (_store, service) = build_env_with_cache(Arc::new(DisabledCache));
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let room = service.create_direct_room(a, b).await.unwrap();
    assert_eq!(
        service.find_direct_room(b, a).await.unwrap().unwrap().id,
        room.id
    );
    assert_eq!(service.get_user_rooms(a).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_leave_room_cascades_when_emptied() {
    let env = build_env();
    let creator = Uuid::new_v4();
    let other = Uuid::new_v4();

    let room = env
        .service
        .create_group_room("doomed", creator, vec![other], false)
        .await
        .unwrap();

    let message = Message::new_text(room.id, creator, "goodbye").unwrap();
    MessageStore::insert(&*env.store, &message).await.unwrap();

    env.service.leave_room(room.id, other).await.unwrap();
    // 仍有成员，房间保留
    assert!(env.service.load_room(room.id).await.is_ok());

    env.service.leave_room(room.id, creator).await.unwrap();
    // 最后一名成员（创建者）离开：房间与消息一并删除
    assert!(matches!(
        env.service.load_room(room.id).await,
        Err(ApplicationError::Domain(DomainError::NotFound { .. }))
    ));
    assert!(MessageStore::find_by_id(&*env.store, message.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_leave_room_requires_membership() {
    let env = build_env();
    let creator = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let room = env
        .service
        .create_group_room("members-only", creator, vec![], false)
        .await
        .unwrap();

    let err = env.service.leave_room(room.id, stranger).await.unwrap_err();
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn test_direct_cache_cleared_on_cascade() {
    let env = build_env();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let room = env.service.create_direct_room(a, b).await.unwrap();
    // 预热 direct 解析缓存
    assert!(env.service.find_direct_room(a, b).await.unwrap().is_some());

    env.service.leave_room(room.id, a).await.unwrap();
    env.service.leave_room(room.id, b).await.unwrap();

    assert!(env.service.find_direct_room(a, b).await.unwrap().is_none());
    // 同一成员对可以重新建房
    let again = env.service.create_direct_room(a, b).await.unwrap();
    assert_ne!(again.id, room.id);
}

#[tokio::test]
async fn test_invitation_flow() {
    let env = build_env();
    let creator = add_user(&env.store, "inviter").await;
    let invitee = add_user(&env.store, "invitee").await;

    let room = env
        .service
        .create_group_room("club", creator, vec![], true)
        .await
        .unwrap();

    // 私密房间不能直接加入
    assert!(matches!(
        env.service.join_room(room.id, invitee).await.unwrap_err(),
        ApplicationError::Domain(DomainError::Forbidden { .. })
    ));

    let notification = env
        .service
        .invite_user(room.id, creator, invitee)
        .await
        .unwrap();
    let pending = env.service.pending_invitations(invitee).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, notification.id);

    let joined = env
        .service
        .respond_invitation(notification.id, invitee, true)
        .await
        .unwrap()
        .unwrap();
    assert!(joined.is_member(invitee));
    assert!(env.service.pending_invitations(invitee).await.unwrap().is_empty());

    // 已处理的邀请不能重复响应
    assert!(env
        .service
        .respond_invitation(notification.id, invitee, true)
        .await
        .is_err());
}

#[tokio::test]
async fn test_invitation_permissions() {
    let env = build_env();
    let creator = add_user(&env.store, "owner").await;
    let member = add_user(&env.store, "member").await;
    let outsider = add_user(&env.store, "outsider").await;

    let room = env
        .service
        .create_group_room("team", creator, vec![member], false)
        .await
        .unwrap();

    // 非成员不能发出邀请
    assert!(matches!(
        env.service
            .invite_user(room.id, outsider, member)
            .await
            .unwrap_err(),
        ApplicationError::Domain(DomainError::Forbidden { .. })
    ));

    // 已是成员的用户不能再被邀请
    assert!(matches!(
        env.service
            .invite_user(room.id, creator, member)
            .await
            .unwrap_err(),
        ApplicationError::Domain(DomainError::InvalidRequest { .. })
    ));

    // 只有受邀人自己能响应
    let invitation = env
        .service
        .invite_user(room.id, creator, outsider)
        .await
        .unwrap();
    assert!(matches!(
        env.service
            .respond_invitation(invitation.id, member, true)
            .await
            .unwrap_err(),
        ApplicationError::Domain(DomainError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn test_touch_last_message_reorders_listing() {
    let env = build_env();
    let user = Uuid::new_v4();

    let first = env
        .service
        .create_group_room("first", user, vec![], false)
        .await
        .unwrap();
    let second = env
        .service
        .create_group_room("second", user, vec![], false)
        .await
        .unwrap();

    // 预热缓存
    env.service.get_user_rooms(user).await.unwrap();

    let message = Message::new_text(first.id, user, "bump").unwrap();
    MessageStore::insert(&*env.store, &message).await.unwrap();
    env.service.touch_last_message(&message).await.unwrap();

    let listed = env.service.get_user_rooms(user).await.unwrap();
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[0].last_message.as_ref().unwrap().preview, "bump");
    assert_eq!(listed[1].id, second.id);
}
