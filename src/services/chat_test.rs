use super::*;
use crate::state::test_helpers::{self, TestApp, connect, connect_joined, identity};
use crate::services::auth::Identity;
use crate::store::Store;
use uuid::Uuid;

struct Room {
    app: TestApp,
    room_id: Uuid,
    owner: Identity,
}

fn room() -> Room {
    let app = test_helpers::test_app();
    let owner = identity("alice");
    let room_id = app.store.seed_room(owner.user_id);
    Room { app, room_id, owner }
}

async fn post(room: &Room, conn: &crate::connection::ConnectionHandle, text: &str) -> ChatMessage {
    let ctx = EventContext::new(&room.app.state, conn);
    let outcome = send(&ctx, ChatSend { room_id: room.room_id, text: text.into() })
        .await
        .expect("send succeeds");
    let Outcome::Broadcast { frame, .. } = outcome else {
        panic!("chat send broadcasts");
    };
    let id: Uuid = frame.payload["message"]["id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("message id");
    room.app.store.message(id).expect("message persisted")
}

#[tokio::test]
async fn send_persists_and_broadcasts_to_whole_room() {
    let room = room();
    let (conn, _rx) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);

    let outcome = send(
        &EventContext::new(&room.app.state, &conn),
        ChatSend { room_id: room.room_id, text: "hello".into() },
    )
    .await
    .expect("send succeeds");

    let Outcome::Broadcast { room_id, frame } = outcome else {
        panic!("chat send broadcasts to the whole room");
    };
    assert_eq!(room_id, room.room_id);
    assert_eq!(frame.kind, kinds::CHAT_NEW);
    let message = &frame.payload["message"];
    assert_eq!(message["text"], json!("hello"));
    assert_eq!(message["senderId"], json!(room.owner.user_id));
    assert_eq!(message["roomId"], json!(room.room_id));
    assert_eq!(message["isDeleted"], json!(false));
    assert!(message["createdAt"].is_i64());
}

#[tokio::test]
async fn send_before_join_is_not_joined() {
    let room = room();
    let (conn, _rx) = connect(&room.app.state, room.owner.clone());

    let err = send(
        &EventContext::new(&room.app.state, &conn),
        ChatSend { room_id: room.room_id, text: "hi".into() },
    )
    .await
    .expect_err("must join first");
    assert!(matches!(err, EventError::NotJoined));
}

#[tokio::test]
async fn send_by_stranger_is_denied_even_if_registered_in_room() {
    let room = room();
    let (conn, _rx) = connect_joined(&room.app.state, identity("mallory"), room.room_id);

    let err = send(
        &EventContext::new(&room.app.state, &conn),
        ChatSend { room_id: room.room_id, text: "hi".into() },
    )
    .await
    .expect_err("not a member");
    assert!(matches!(&err, EventError::AccessDenied(m) if m == "Not a member"));
}

#[tokio::test]
async fn typing_excludes_sender() {
    let room = room();
    let (conn, _rx) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);

    let outcome = typing(
        &EventContext::new(&room.app.state, &conn),
        ChatTyping { room_id: room.room_id, is_typing: true },
    )
    .await
    .expect("typing relays");

    let Outcome::BroadcastOthers { frame, .. } = outcome else {
        panic!("typing excludes the sender");
    };
    assert_eq!(frame.kind, kinds::CHAT_TYPING);
    assert_eq!(frame.payload["isTyping"], json!(true));
    assert_eq!(frame.payload["userId"], json!(room.owner.user_id));
}

#[tokio::test]
async fn delete_for_everyone_by_sender_tombstones() {
    let room = room();
    let (conn, _rx) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);
    let message = post(&room, &conn, "oops").await;

    let outcome = delete(
        &EventContext::new(&room.app.state, &conn),
        ChatDelete { room_id: room.room_id, message_id: message.id, for_everyone: true },
    )
    .await
    .expect("sender may delete");

    let Outcome::Broadcast { frame, .. } = outcome else {
        panic!("delete for everyone broadcasts");
    };
    assert_eq!(frame.kind, kinds::CHAT_DELETED);
    assert_eq!(frame.payload["forEveryone"], json!(true));

    let stored = room.app.store.message(message.id).expect("still stored");
    assert!(stored.is_deleted);
    assert_eq!(stored.text, "");
}

#[tokio::test]
async fn delete_for_everyone_twice_is_not_found() {
    let room = room();
    let (conn, _rx) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);
    let message = post(&room, &conn, "oops").await;
    let req = ChatDelete { room_id: room.room_id, message_id: message.id, for_everyone: true };

    delete(&EventContext::new(&room.app.state, &conn), req.clone())
        .await
        .expect("first delete");
    let err = delete(&EventContext::new(&room.app.state, &conn), req)
        .await
        .expect_err("already deleted");
    assert!(matches!(&err, EventError::NotFound(m) if m == "Message not found"));
}

#[tokio::test]
async fn store_tombstone_skips_deleted_message() {
    let room = room();
    let (conn, _rx) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);
    let message = post(&room, &conn, "once").await;
    let store = &room.app.store;

    assert!(store.tombstone_message(room.room_id, message.id).await.expect("store").is_some());
    assert!(store.tombstone_message(room.room_id, message.id).await.expect("store").is_none());
}

#[tokio::test]
async fn delete_for_everyone_by_other_member_is_denied() {
    let room = room();
    let bob = identity("bob");
    room.app.store.add_member(room.room_id, bob.user_id, None);
    let (alice_conn, _a) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);
    let (bob_conn, _b) = connect_joined(&room.app.state, bob, room.room_id);
    let message = post(&room, &alice_conn, "mine").await;

    let err = delete(
        &EventContext::new(&room.app.state, &bob_conn),
        ChatDelete { room_id: room.room_id, message_id: message.id, for_everyone: true },
    )
    .await
    .expect_err("only the sender");
    assert!(matches!(&err, EventError::AccessDenied(m) if m == "Only sender can delete for everyone"));

    let stored = room.app.store.message(message.id).expect("still stored");
    assert!(!stored.is_deleted);
    assert_eq!(stored.text, "mine");
}

#[tokio::test]
async fn delete_for_self_hides_once_and_replies_only() {
    let room = room();
    let bob = identity("bob");
    room.app.store.add_member(room.room_id, bob.user_id, None);
    let (alice_conn, _a) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);
    let (bob_conn, _b) = connect_joined(&room.app.state, bob.clone(), room.room_id);
    let message = post(&room, &alice_conn, "hide me").await;

    let req = ChatDelete { room_id: room.room_id, message_id: message.id, for_everyone: false };
    for _ in 0..2 {
        let outcome = delete(&EventContext::new(&room.app.state, &bob_conn), req.clone())
            .await
            .expect("any member may hide");
        let Outcome::Reply(frame) = outcome else {
            panic!("hide replies to the caller only");
        };
        assert_eq!(frame.payload["forEveryone"], json!(false));
    }

    let stored = room.app.store.message(message.id).expect("still stored");
    assert_eq!(stored.deleted_for, vec![bob.user_id]);
    assert!(!stored.is_deleted);
}

#[tokio::test]
async fn delete_unknown_message_is_not_found() {
    let room = room();
    let (conn, _rx) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);

    let err = delete(
        &EventContext::new(&room.app.state, &conn),
        ChatDelete { room_id: room.room_id, message_id: Uuid::new_v4(), for_everyone: false },
    )
    .await
    .expect_err("absent");
    assert!(matches!(&err, EventError::NotFound(m) if m == "Message not found"));
}

#[tokio::test]
async fn delete_message_from_another_room_is_not_found() {
    let room = room();
    let other_room = room.app.store.seed_room(room.owner.user_id);
    let (conn, _rx) = connect_joined(&room.app.state, room.owner.clone(), room.room_id);
    room.app.state.registry.join(conn.id, other_room);
    let message = post(&room, &conn, "here").await;

    let err = delete(
        &EventContext::new(&room.app.state, &conn),
        ChatDelete { room_id: other_room, message_id: message.id, for_everyone: true },
    )
    .await
    .expect_err("wrong room");
    assert!(matches!(err, EventError::NotFound(_)));
}
