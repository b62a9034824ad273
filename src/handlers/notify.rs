use serde_json::json;

use crate::fanout;
use crate::models::NotificationRequest;
use crate::registry::Outbound;
use crate::session::{EngineCtx, Registered};

/// General (non-chat) notification to a single user, resolved by username.
/// Online targets get a live frame; offline targets get a push carrying the
/// frame, audited with the general msg_type.
pub fn notification(
    session: &Registered,
    ctx: &EngineCtx,
    reply: &Outbound,
    p: NotificationRequest,
) -> rusqlite::Result<()> {
    let Some(organization_id) = p.organization_id else {
        println!("{}: invalid organization id", ctx.client_ip);
        reply.send_json(&json!({
            "error": "invalid organization id",
            "data": "organization id is missing"
        }));
        return Ok(());
    };

    // Callers in org 0 act cross-tenant; everyone else stays inside their
    // own organization.
    if session.organization_id > 0 && session.organization_id != organization_id {
        println!(
            "{}: organization id does not match client organization id",
            ctx.client_ip
        );
        reply.send_json(&json!({
            "error": "invalid organization id",
            "data": "invalid organization id"
        }));
        return Ok(());
    }

    let target = match p.username.as_deref() {
        Some(username) => ctx.db.find_user_id(username, organization_id)?,
        None => None,
    };
    let Some(target_id) = target else {
        println!("{}: username is not found", ctx.client_ip);
        reply.send_json(&json!({
            "event": "notification_failed",
            "data": "username is not found"
        }));
        return Ok(());
    };

    let title = p.title.unwrap_or_default();
    let body = p.body.unwrap_or_default();
    let frame = json!({
        "event": "notification",
        "data": {
            "title": title,
            "body": body,
            "message": p.data.notification
        }
    })
    .to_string();

    fanout::send_to_user(
        &ctx.db,
        &ctx.registry,
        &ctx.push,
        target_id,
        organization_id,
        &title,
        &body,
        &frame,
    )?;
    reply.send_json(&json!({"event": "notification_success"}));
    Ok(())
}
