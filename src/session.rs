use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rocket::futures::{SinkExt, StreamExt};
use rocket_ws as ws;
use serde_json::{Value, json};

use crate::db::Db;
use crate::handlers;
use crate::push::PushHandle;
use crate::registry::{ConnId, ConnectionGuard, Outbound, PresenceRegistry, SessionUser};

/// Per-connection state machine. A connection is born unregistered and may
/// move to registered exactly once, on a successful handshake.
pub enum Session {
    Unregistered,
    Registered(Registered),
}

pub struct Registered {
    pub user_id: i64,
    pub username: String,
    pub organization_id: i64,
    pub session_token: String,
}

/// Everything a handler needs besides the session itself.
pub struct EngineCtx {
    pub db: Db,
    pub registry: PresenceRegistry,
    pub push: PushHandle,
    pub conn_id: ConnId,
    pub client_ip: String,
}

/// 32 random bytes, URL-safe base64 — the token shape clients already
/// expect (43 characters, no padding).
pub fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The registration handshake — the only event an unregistered session
/// accepts. Anything else gets told to register first.
pub fn handle_unregistered(
    event: &str,
    frame: &Value,
    session: &mut Session,
    ctx: &EngineCtx,
    reply: &Outbound,
) -> rusqlite::Result<()> {
    if event != "Register" {
        println!("{}: Client not registered yet", ctx.client_ip);
        reply.send_json(&json!({
            "event": "register_error",
            "data": "You must send a register event first"
        }));
        return Ok(());
    }

    let username = frame.get("username").and_then(Value::as_str).unwrap_or_default();
    let token = frame.get("token").and_then(Value::as_str).unwrap_or_default();
    let Some(user) = ctx.db.find_user(username, token)? else {
        reply.send_json(&json!({"event": "register_error", "data": "invalid user"}));
        return Ok(());
    };

    let session_token = new_session_token();
    ctx.registry.bind_user(
        ctx.conn_id,
        SessionUser {
            user_id: user.id,
            username: user.username.clone(),
            organization_id: user.organization_id,
        },
    );
    println!("{}: registered '{}' (user {})", ctx.client_ip, user.username, user.id);
    *session = Session::Registered(Registered {
        user_id: user.id,
        username: user.username,
        organization_id: user.organization_id,
        session_token: session_token.clone(),
    });
    reply.send_json(&json!({"event": "register_success", "data": session_token}));
    Ok(())
}

/// Per-connection task: drains the outbound queue into the socket and feeds
/// inbound frames through the dispatcher, strictly in arrival order. The
/// guard unregisters the connection however the loop ends.
pub async fn run(
    stream: ws::stream::DuplexStream,
    db: Db,
    registry: PresenceRegistry,
    push: PushHandle,
    client_ip: String,
) {
    let (conn_id, outbound, mut queue) = registry.attach();
    let _guard = ConnectionGuard::new(registry.clone(), conn_id);
    let ctx = EngineCtx {
        db,
        registry,
        push,
        conn_id,
        client_ip,
    };
    let mut session = Session::Unregistered;
    let (mut sink, mut source) = stream.split();

    println!("{}: New socket connection", ctx.client_ip);

    loop {
        tokio::select! {
            queued = queue.recv() => {
                // The registry holds a sender for as long as we're attached,
                // so the queue only yields None after detach.
                let Some(frame) = queued else { break };
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(ws::Message::Text(text))) => {
                        handlers::dispatch(&text, &mut session, &ctx, &outbound);
                    }
                    Some(Ok(ws::Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary / ping / pong: nothing to do
                    Some(Err(e)) => {
                        eprintln!("⚠️ {}: socket error: {e}", ctx.client_ip);
                        break;
                    }
                }
            }
        }
    }

    println!("{}: socket closed", ctx.client_ip);
}
