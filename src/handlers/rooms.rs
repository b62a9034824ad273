use serde_json::{Value, json};

use crate::models::{RoomTarget, RoomUpsert};
use crate::registry::Outbound;
use crate::session::{EngineCtx, Registered};

pub fn get_rooms(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
) -> rusqlite::Result<()> {
    let rooms = ctx.db.list_user_rooms(session.user_id)?;
    reply.send_json(&json!({"event": "get_rooms", "data": rooms}));
    Ok(())
}

pub fn update_or_make_room(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: RoomUpsert,
) -> rusqlite::Result<()> {
    // A zero organization id would create a room outside any tenant;
    // rejected outright rather than left to the storage layer.
    let room_id = if session.organization_id == 0 {
        None
    } else {
        ctx.db.create_or_update_room(
            session.user_id,
            &p.name,
            &p.users,
            &p.description,
            session.organization_id,
        )?
    };

    match room_id {
        Some(id) => reply.send_json(&json!({
            "event": "update_or_make_room",
            "data": {
                "room": id,
                "name": p.name,
                "status": "success"
            }
        })),
        None => reply.send_json(&json!({
            "event": "update_or_make_room",
            "data": {
                "room": Value::Null,
                "status": "failed",
                "msg": "Failed to create a room"
            }
        })),
    }
    Ok(())
}

pub fn get_users_in_room(
    ctx: &EngineCtx,
    reply: &Outbound,
    p: RoomTarget,
) -> rusqlite::Result<()> {
    let owners = ctx.db.list_room_owner(p.room)?;
    let users = ctx.db.list_users_in_room(p.room)?;
    let annotate = |members: Vec<crate::models::RoomMember>| -> Vec<Value> {
        members
            .into_iter()
            .map(|m| {
                json!({
                    "id": m.id,
                    "username": m.username,
                    "online": ctx.registry.is_user_online(m.id)
                })
            })
            .collect()
    };
    reply.send_json(&json!({
        "event": "room_users",
        "room": p.room,
        "users": annotate(users),
        "owners": annotate(owners)
    }));
    Ok(())
}

pub fn leave_room(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: RoomTarget,
) -> rusqlite::Result<()> {
    let left = ctx.db.leave_room(p.room, session.user_id)?;
    let event = if left { "leave_room_success" } else { "leave_room_failed" };
    reply.send_json(&json!({"event": event}));
    Ok(())
}

pub fn set_room_silent(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: RoomTarget,
    silent: bool,
) -> rusqlite::Result<()> {
    let updated = ctx.db.set_silent(p.room, session.user_id, silent)?;
    let event = match (silent, updated) {
        (true, true) => "silent_room_success",
        (true, false) => "silent_room_failed",
        (false, true) => "unsilent_room_success",
        (false, false) => "unsilent_room_failed",
    };
    reply.send_json(&json!({"event": event}));
    Ok(())
}
