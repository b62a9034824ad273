use chrono::{Duration, Utc};

use crate::db::Db;
use crate::push::{PushData, PushHandle};
use crate::registry::PresenceRegistry;

/// Minimum gap between consecutive pushes to one user within an org.
pub const PUSH_COOLDOWN_MINUTES: i64 = 5;

/// msg_type values on notification audit rows.
pub const NOTIFY_CHAT: i64 = 1;
pub const NOTIFY_GENERAL: i64 = 2;

pub const CHAT_PUSH_TITLE: &str = "New Message";
pub const CHAT_PUSH_BODY: &str = "A new chat message is sent to you";

/// Push cooldown policy: a silenced room never pushes, a first push always
/// goes out, and everything else waits out the cooldown window.
pub fn can_push(
    db: &Db,
    user_id: i64,
    organization_id: i64,
    room_id: i64,
) -> rusqlite::Result<bool> {
    if db.participant_silent(room_id, user_id, organization_id)? {
        return Ok(false);
    }
    Ok(match db.last_notification_time(user_id, organization_id)? {
        None => true,
        Some(last) => Utc::now() - last > Duration::minutes(PUSH_COOLDOWN_MINUTES),
    })
}

/// Active participants minus the sender. None when the sender is not an
/// active member of the room; callers refuse the operation in that case.
pub fn room_recipients(
    db: &Db,
    room_id: i64,
    sender_user_id: i64,
) -> rusqlite::Result<Option<Vec<i64>>> {
    let mut ids = db.list_active_participant_ids(room_id)?;
    match ids.iter().position(|&id| id == sender_user_id) {
        Some(pos) => {
            ids.remove(pos);
            Ok(Some(ids))
        }
        None => Ok(None),
    }
}

/// Deliver one frame to every recipient: online users get it on one of
/// their live connections, offline users go through the push gateway
/// behind the cooldown policy, with an audit row per push decision.
pub fn send_to_room_users(
    db: &Db,
    registry: &PresenceRegistry,
    push: &PushHandle,
    recipients: &[i64],
    organization_id: i64,
    room_id: i64,
    frame: &str,
) -> rusqlite::Result<()> {
    for &user_id in recipients {
        if let Some(peer) = registry.sender_to_user(user_id) {
            peer.send_text(frame.to_string());
        } else if can_push(db, user_id, organization_id, room_id)? {
            for token in db.device_tokens(user_id, organization_id)? {
                push.deliver(&token, CHAT_PUSH_TITLE, CHAT_PUSH_BODY, PushData::chat(room_id));
            }
            db.record_notification(user_id, organization_id, CHAT_PUSH_TITLE, NOTIFY_CHAT)?;
        }
    }
    Ok(())
}

/// Single-recipient delivery for general notifications. The cooldown does
/// not apply: these are explicit per-user sends, not room chatter.
pub fn send_to_user(
    db: &Db,
    registry: &PresenceRegistry,
    push: &PushHandle,
    user_id: i64,
    organization_id: i64,
    title: &str,
    body: &str,
    frame: &str,
) -> rusqlite::Result<()> {
    if let Some(peer) = registry.sender_to_user(user_id) {
        peer.send_text(frame.to_string());
        return Ok(());
    }
    for token in db.device_tokens(user_id, organization_id)? {
        push.deliver(&token, title, body, PushData::general(frame));
    }
    db.record_notification(user_id, organization_id, title, NOTIFY_GENERAL)?;
    Ok(())
}
