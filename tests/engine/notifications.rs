use crate::common::{connect, register, test_engine};
use serde_json::json;

fn notification_frame(token: &str, org: i64, username: &str) -> serde_json::Value {
    json!({
        "event": "notification",
        "organization_id": org,
        "username": username,
        "title": "Reminder",
        "body": "Standup in 5",
        "data": {"session_token": token, "notification": {"kind": "standup"}}
    })
}

// --- The general notification event ---

#[test]
fn test_notification_to_online_user() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user(8, "bob", "tok-B", 3);

    let mut alice = connect(&eng);
    let token = register(&mut alice, "alice", "tok-A");
    let mut bob = connect(&eng);
    register(&mut bob, "bob", "tok-B");

    alice.send(notification_frame(&token, 3, "bob"));
    assert_eq!(alice.recv()["event"], "notification_success");

    let frame = bob.recv();
    assert_eq!(frame["event"], "notification");
    assert_eq!(frame["data"]["title"], "Reminder");
    assert_eq!(frame["data"]["body"], "Standup in 5");
    assert_eq!(frame["data"]["message"]["kind"], "standup");

    // Live delivery: no push, no audit row.
    assert_eq!(eng.push.count(), 0);
    assert_eq!(eng.notification_rows(8), 0);
}

#[test]
fn test_notification_to_offline_user_pushes() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user_with_devices(8, "bob", "tok-B", 3, Some(r#"[{"token":"devtok-1"}]"#));

    let mut alice = connect(&eng);
    let token = register(&mut alice, "alice", "tok-A");

    alice.send(notification_frame(&token, 3, "bob"));
    assert_eq!(alice.recv()["event"], "notification_success");

    let sent = eng.push.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].device_token, "devtok-1");
    assert_eq!(sent[0].title, "Reminder");
    assert_eq!(sent[0].body, "Standup in 5");
    assert_eq!(sent[0].data.kind, "notification");
    // The push payload carries the live frame verbatim.
    let carried: serde_json::Value = serde_json::from_str(&sent[0].data.data).unwrap();
    assert_eq!(carried["event"], "notification");
    assert_eq!(carried["data"]["message"]["kind"], "standup");

    // Audited as a general notification.
    let conn = eng.db.conn.lock().unwrap();
    let msg_type: i64 = conn
        .query_row(
            "SELECT msg_type FROM client_notifications WHERE user_id = 8",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(msg_type, 2);
}

#[test]
fn test_notification_skips_cooldown() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user_with_devices(8, "bob", "tok-B", 3, Some(r#"[{"token":"devtok-1"}]"#));

    let mut alice = connect(&eng);
    let token = register(&mut alice, "alice", "tok-A");

    // Back-to-back notifications both push: the cooldown only throttles
    // room fan-out.
    alice.send(notification_frame(&token, 3, "bob"));
    alice.recv();
    alice.send(notification_frame(&token, 3, "bob"));
    alice.recv();

    assert_eq!(eng.push.count(), 2);
    assert_eq!(eng.notification_rows(8), 2);
}

#[test]
fn test_notification_unknown_username() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);

    let mut alice = connect(&eng);
    let token = register(&mut alice, "alice", "tok-A");
    alice.send(notification_frame(&token, 3, "nobody"));
    let reply = alice.recv();
    assert_eq!(reply["event"], "notification_failed");
    assert_eq!(reply["data"], "username is not found");
}

#[test]
fn test_notification_missing_organization_id() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);

    let mut alice = connect(&eng);
    let token = register(&mut alice, "alice", "tok-A");
    alice.send(json!({
        "event": "notification",
        "username": "bob",
        "data": {"session_token": token, "notification": {}}
    }));
    let reply = alice.recv();
    assert_eq!(reply["error"], "invalid organization id");
    assert_eq!(reply["data"], "organization id is missing");
}

#[test]
fn test_notification_org_mismatch() {
    let eng = test_engine();
    eng.seed_user(7, "alice", "tok-A", 3);
    eng.seed_user(9, "eve", "tok-E", 4);

    let mut alice = connect(&eng);
    let token = register(&mut alice, "alice", "tok-A");
    alice.send(notification_frame(&token, 4, "eve"));
    let reply = alice.recv();
    assert_eq!(reply["error"], "invalid organization id");
    assert_eq!(reply["data"], "invalid organization id");
}

#[test]
fn test_notification_org_zero_caller_crosses_tenants() {
    let eng = test_engine();
    eng.seed_user(30, "svc", "tok-S", 0);
    eng.seed_user(9, "eve", "tok-E", 4);

    let mut svc = connect(&eng);
    let token = register(&mut svc, "svc", "tok-S");
    let mut eve = connect(&eng);
    register(&mut eve, "eve", "tok-E");

    svc.send(notification_frame(&token, 4, "eve"));
    assert_eq!(svc.recv()["event"], "notification_success");
    assert_eq!(eve.recv()["event"], "notification");
}
