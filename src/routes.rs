use rocket::request::{FromRequest, Outcome, Request};
use rocket::{State, get};
use rocket_ws as ws;

use crate::db::Db;
use crate::push::PushHandle;
use crate::registry::PresenceRegistry;
use crate::session;

/// Client address for logging. Proxy headers win over the peer address
/// (leftmost X-Forwarded-For entry, then X-Real-IP); never used for
/// authorization.
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| {
                req.headers()
                    .get_one("X-Real-IP")
                    .map(|s| s.trim().to_string())
            })
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// The relay's single mount point: one WebSocket per client, one task per
/// connection, frames processed strictly in arrival order.
#[get("/")]
pub fn chat(
    ws: ws::WebSocket,
    db: &State<Db>,
    registry: &State<PresenceRegistry>,
    push: &State<PushHandle>,
    ip: ClientIp,
) -> ws::Channel<'static> {
    let db = db.inner().clone();
    let registry = registry.inner().clone();
    let push = push.inner().clone();
    ws.channel(move |stream| {
        Box::pin(async move {
            session::run(stream, db, registry, push, ip.0).await;
            Ok(())
        })
    })
}
