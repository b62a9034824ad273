use crate::common::{broadcast, connect, make_room, register, test_engine};
use serde_json::json;

// --- Live fan-out ---

#[test]
fn test_broadcast_reaches_online_recipient() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user(8, "bob", "tok-B", 3);

    let mut alice = connect(&eng);
    let alice_token = register(&mut alice, "alice", "tok-A");
    let room = make_room(&mut alice, &alice_token, "general", &["bob"]);

    let mut bob = connect(&eng);
    register(&mut bob, "bob", "tok-B");

    let msg = broadcast(&mut alice, &alice_token, room, "hi");

    let frame = bob.recv();
    assert_eq!(frame["event"], "chat_message");
    assert_eq!(frame["data"]["username"], "alice");
    assert_eq!(frame["data"]["msgid"], msg);
    assert_eq!(frame["data"]["room"], room);
    assert_eq!(frame["data"]["message"], "hi");
    assert_eq!(frame["data"]["msginfo"], "");

    // The sender only sees the response frame, never its own broadcast.
    assert!(alice.try_recv().is_none());
    // Everyone was online: nothing went to the push gateway.
    assert_eq!(eng.push.count(), 0);
}

#[test]
fn test_broadcast_from_non_member_refused() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user(10, "carol", "tok-C", 3);

    let mut alice = connect(&eng);
    let alice_token = register(&mut alice, "alice", "tok-A");
    let room = make_room(&mut alice, &alice_token, "general", &[]);

    let mut carol = connect(&eng);
    let carol_token = register(&mut carol, "carol", "tok-C");
    carol.send(json!({
        "event": "BroadcastMessage",
        "data": {"session_token": carol_token, "room": room, "message": "intrude", "msginfo": ""}
    }));
    let reply = carol.recv();
    assert_eq!(reply["event"], "broadcast_message_response");
    assert_eq!(reply["status"], false);

    // Refused before anything is persisted.
    assert_eq!(eng.message_rows(room), 0);
}

#[test]
fn test_fanout_uses_one_connection_per_user() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user(8, "bob", "tok-B", 3);

    let mut alice = connect(&eng);
    let alice_token = register(&mut alice, "alice", "tok-A");
    let room = make_room(&mut alice, &alice_token, "general", &["bob"]);

    let mut bob_phone = connect(&eng);
    register(&mut bob_phone, "bob", "tok-B");
    let mut bob_laptop = connect(&eng);
    register(&mut bob_laptop, "bob", "tok-B");

    broadcast(&mut alice, &alice_token, room, "hi");

    let mut delivered = 0;
    if bob_phone.try_recv().is_some() {
        delivered += 1;
    }
    if bob_laptop.try_recv().is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, 1);
}

// --- Offline push path ---

#[test]
fn test_offline_recipient_gets_push_per_device_token() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user_with_devices(
        8,
        "bob",
        "tok-B",
        3,
        Some(r#"[{"token":"devtok-1"},{"token":"devtok-2"}]"#),
    );

    let mut alice = connect(&eng);
    let alice_token = register(&mut alice, "alice", "tok-A");
    let room = make_room(&mut alice, &alice_token, "general", &["bob"]);

    broadcast(&mut alice, &alice_token, room, "hi");

    let sent = eng.push.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    let tokens: Vec<&str> = sent.iter().map(|p| p.device_token.as_str()).collect();
    assert_eq!(tokens, vec!["devtok-1", "devtok-2"]);
    for push in &sent {
        assert_eq!(push.title, "New Message");
        assert_eq!(push.body, "A new chat message is sent to you");
        assert_eq!(push.data.kind, "chat_msg");
        assert_eq!(push.data.data, room.to_string());
    }

    // One audit row for the push decision, not one per device token.
    assert_eq!(eng.notification_rows(8), 1);
}

#[test]
fn test_push_cooldown_window() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user_with_devices(8, "bob", "tok-B", 3, Some(r#"[{"token":"devtok-1"}]"#));

    let mut alice = connect(&eng);
    let alice_token = register(&mut alice, "alice", "tok-A");
    let room = make_room(&mut alice, &alice_token, "general", &["bob"]);

    // First broadcast pushes; the second lands inside the cooldown window.
    broadcast(&mut alice, &alice_token, room, "one");
    broadcast(&mut alice, &alice_token, room, "two");
    assert_eq!(eng.push.count(), 1);
    assert_eq!(eng.notification_rows(8), 1);

    // Once the window has elapsed the next broadcast pushes again.
    eng.backdate_notifications(8, 6);
    broadcast(&mut alice, &alice_token, room, "three");
    assert_eq!(eng.push.count(), 2);
    assert_eq!(eng.notification_rows(8), 2);
}

#[test]
fn test_silent_room_suppresses_push_not_live_delivery() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user_with_devices(8, "bob", "tok-B", 3, Some(r#"[{"token":"devtok-1"}]"#));
    eng.seed_user(10, "carol", "tok-C", 3);

    let mut alice = connect(&eng);
    let alice_token = register(&mut alice, "alice", "tok-A");
    let room = make_room(&mut alice, &alice_token, "general", &["bob", "carol"]);

    // Bob opts out of pushes for this room, then goes offline.
    let mut bob = connect(&eng);
    let bob_token = register(&mut bob, "bob", "tok-B");
    bob.send(json!({"event": "SilentRoom", "data": {"session_token": bob_token, "room": room}}));
    assert_eq!(bob.recv()["event"], "silent_room_success");
    bob.disconnect();

    let mut carol = connect(&eng);
    register(&mut carol, "carol", "tok-C");

    broadcast(&mut alice, &alice_token, room, "hi");

    assert_eq!(eng.push.count(), 0);
    assert_eq!(eng.notification_rows(8), 0);
    assert_eq!(carol.recv()["event"], "chat_message");
}

#[test]
fn test_malformed_device_tokens_push_nothing() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user_with_devices(8, "bob", "tok-B", 3, Some("not json at all"));

    let mut alice = connect(&eng);
    let alice_token = register(&mut alice, "alice", "tok-A");
    let room = make_room(&mut alice, &alice_token, "general", &["bob"]);

    broadcast(&mut alice, &alice_token, room, "hi");
    assert_eq!(eng.push.count(), 0);
}

// --- Edit fan-out ---

#[test]
fn test_edit_broadcasts_update_to_members() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user(8, "bob", "tok-B", 3);

    let mut alice = connect(&eng);
    let alice_token = register(&mut alice, "alice", "tok-A");
    let room = make_room(&mut alice, &alice_token, "general", &["bob"]);

    let mut bob = connect(&eng);
    register(&mut bob, "bob", "tok-B");

    let msg = broadcast(&mut alice, &alice_token, room, "hi");
    bob.recv(); // chat_message

    alice.send(json!({
        "event": "EditMessageInRoom",
        "data": {"session_token": alice_token, "room": room, "msg_id": msg,
                 "message": "hi!", "msginfo": ""}
    }));
    assert_eq!(alice.recv()["data"], 1);

    let frame = bob.recv();
    assert_eq!(frame["event"], "chat_message_updated");
    assert_eq!(frame["data"]["username"], "alice");
    assert_eq!(frame["data"]["msgid"], msg);
    assert_eq!(frame["data"]["room"], room);
    assert_eq!(frame["data"]["message"], "hi!");
    // The author does not receive the update frame.
    assert!(alice.try_recv().is_none());
}
