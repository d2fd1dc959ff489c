use super::*;
use crate::services::auth::Identity;
use serde_json::json;

fn conn(capacity: usize) -> (ConnectionHandle, crate::connection::ConnectionChannels) {
    ConnectionHandle::new(Identity { user_id: Uuid::new_v4(), name: "test".into() }, capacity)
}

#[test]
fn send_queues_frame() {
    let (conn, mut channels) = conn(4);
    assert!(send(&conn, Frame::new("PING_TEST", json!({}))));
    let frame = channels.outbound.try_recv().expect("frame queued");
    assert_eq!(frame.kind, "PING_TEST");
}

#[test]
fn send_to_closed_connection_is_noop() {
    let (conn, mut channels) = conn(4);
    conn.close();
    assert!(!send(&conn, Frame::new("X", json!({}))));
    assert!(channels.outbound.try_recv().is_err());
}

#[test]
fn send_after_receiver_dropped_is_noop() {
    let (conn, channels) = conn(4);
    drop(channels);
    assert!(!conn.is_open());
    assert!(!send(&conn, Frame::new("X", json!({}))));
}

#[test]
fn send_to_full_queue_drops_frame() {
    let (conn, mut channels) = conn(1);
    assert!(send(&conn, Frame::new("FIRST", json!({}))));
    assert!(!send(&conn, Frame::new("SECOND", json!({}))));
    assert_eq!(channels.outbound.try_recv().map(|f| f.kind).ok().as_deref(), Some("FIRST"));
    assert!(channels.outbound.try_recv().is_err());
}

#[test]
fn broadcast_skips_excluded_and_closed() {
    let (a, mut a_rx) = conn(4);
    let (b, mut b_rx) = conn(4);
    let (c, mut c_rx) = conn(4);
    c.close();

    let frame = Frame::new("HELLO", json!({"n": 1}));
    let delivered = broadcast(&[a.clone(), b.clone(), c.clone()], &frame, Some(a.id));

    assert_eq!(delivered, 1);
    assert!(a_rx.outbound.try_recv().is_err());
    assert_eq!(b_rx.outbound.try_recv().expect("b receives"), frame);
    assert!(c_rx.outbound.try_recv().is_err());
}

#[test]
fn broadcast_room_targets_only_joined_connections() {
    let registry = ConnectionRegistry::new();
    let (a, mut a_rx) = conn(4);
    let (b, mut b_rx) = conn(4);
    registry.register(a.clone());
    registry.register(b.clone());
    let room_id = Uuid::new_v4();
    registry.join(a.id, room_id);

    let delivered = broadcast_room(&registry, room_id, &Frame::new("ROOM_ONLY", json!({})), None);
    assert_eq!(delivered, 1);
    assert!(a_rx.outbound.try_recv().is_ok());
    assert!(b_rx.outbound.try_recv().is_err());
}

#[test]
fn broadcast_room_unknown_room_is_noop() {
    let registry = ConnectionRegistry::new();
    assert_eq!(broadcast_room(&registry, Uuid::new_v4(), &Frame::new("X", json!({})), None), 0);
}
