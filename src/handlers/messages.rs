use serde_json::json;

use crate::fanout;
use crate::models::{LastSeenUpdate, MessageBroadcast, MessageDelete, MessageEdit, RoomPage, RoomTarget};
use crate::registry::Outbound;
use crate::session::{EngineCtx, Registered};

pub fn clear_last_seen(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: RoomTarget,
) -> rusqlite::Result<()> {
    ctx.db.clear_last_seen(p.room, session.user_id)?;
    reply.send_json(&json!({"event": "cleared_last_seen_msgs", "data": ""}));
    Ok(())
}

pub fn last_seen_msg(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: LastSeenUpdate,
) -> rusqlite::Result<()> {
    let updated = ctx.db.update_last_seen(p.room, session.user_id, p.msg_id)?;
    reply.send_json(&json!({
        "event": "update_last_seen_msg_in_room",
        "status": updated
    }));
    Ok(())
}

pub fn get_last_messages(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: RoomTarget,
) -> rusqlite::Result<()> {
    let msgs = ctx.db.last_messages(p.room, session.organization_id)?;
    reply.send_json(&json!({"event": "last_messages_in_room", "data": msgs}));
    Ok(())
}

pub fn get_messages_after(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: RoomPage,
) -> rusqlite::Result<()> {
    let msgs = ctx
        .db
        .messages_after(p.room, session.organization_id, p.last_id)?;
    reply.send_json(&json!({"event": "messages_in_room", "data": msgs}));
    Ok(())
}

pub fn get_messages_before(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: RoomPage,
) -> rusqlite::Result<()> {
    let msgs = ctx
        .db
        .messages_before(p.room, session.organization_id, p.last_id)?;
    reply.send_json(&json!({"event": "prev_messages_in_room", "data": msgs}));
    Ok(())
}

pub fn delete_message(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: MessageDelete,
) -> rusqlite::Result<()> {
    let deleted = ctx.db.delete_message(
        p.msg_id,
        p.room,
        session.user_id,
        session.organization_id,
    )?;
    reply.send_json(&json!({
        "event": "delete_messages_in_room",
        "success": deleted
    }));
    Ok(())
}

pub fn edit_message(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: MessageEdit,
) -> rusqlite::Result<()> {
    let rows = ctx.db.edit_message(
        p.msg_id,
        p.room,
        session.user_id,
        session.organization_id,
        &p.message,
        &p.msginfo,
    )?;
    if rows == 0 {
        reply.send_json(&json!({"event": "edit_message_in_room", "data": "failed"}));
        return Ok(());
    }
    reply.send_json(&json!({"event": "edit_message_in_room", "data": rows}));

    let frame = json!({
        "event": "chat_message_updated",
        "data": {
            "username": session.username,
            "msgid": p.msg_id,
            "room": p.room,
            "message": p.message,
            "msginfo": p.msginfo
        }
    })
    .to_string();
    if let Some(recipients) = fanout::room_recipients(&ctx.db, p.room, session.user_id)? {
        fanout::send_to_room_users(
            &ctx.db,
            &ctx.registry,
            &ctx.push,
            &recipients,
            session.organization_id,
            p.room,
            &frame,
        )?;
    }
    Ok(())
}

pub fn broadcast_message(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: MessageBroadcast,
) -> rusqlite::Result<()> {
    // Only active members may produce into a room; nothing is persisted on
    // refusal.
    let Some(recipients) = fanout::room_recipients(&ctx.db, p.room, session.user_id)? else {
        reply.send_json(&json!({
            "event": "broadcast_message_response",
            "status": false
        }));
        return Ok(());
    };

    let msg_id = ctx.db.insert_message(
        p.room,
        session.user_id,
        session.organization_id,
        &p.message,
        &p.msginfo,
    )?;

    let frame = json!({
        "event": "chat_message",
        "data": {
            "username": session.username,
            "msgid": msg_id,
            "room": p.room,
            "message": p.message,
            "msginfo": p.msginfo
        }
    })
    .to_string();
    fanout::send_to_room_users(
        &ctx.db,
        &ctx.registry,
        &ctx.push,
        &recipients,
        session.organization_id,
        p.room,
        &frame,
    )?;

    reply.send_json(&json!({
        "event": "broadcast_message_response",
        "status": true,
        "msgid": msg_id
    }));
    Ok(())
}
