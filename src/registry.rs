use rocket_ws::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub type ConnId = u64;

/// What the rest of the engine may read about a registered connection.
/// Written once, by the owning connection's task, at registration.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
    pub organization_id: i64,
}

/// Handle for queueing frames onto a connection's outbound channel.
#[derive(Clone)]
pub struct Outbound {
    tx: UnboundedSender<Message>,
}

impl Outbound {
    pub fn send_json(&self, value: &serde_json::Value) {
        self.send_text(value.to_string());
    }

    pub fn send_text(&self, frame: String) {
        // A disconnecting peer drops its receiver; fan-out sends are
        // best-effort and the error carries no information.
        let _ = self.tx.send(Message::Text(frame));
    }
}

struct Connection {
    outbound: Outbound,
    user: Option<SessionUser>,
}

/// Process-wide map of live connections. Cheap to clone; all clones share
/// the same map.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<ConnId, Connection>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        PresenceRegistry {
            inner: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl PresenceRegistry {
    /// Insert a fresh, unregistered connection. Returns its id, the shared
    /// outbound handle, and the receiving end the connection task drains.
    pub fn attach(&self) -> (ConnId, Outbound, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbound = Outbound { tx };
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.write().unwrap().insert(
            conn_id,
            Connection {
                outbound: outbound.clone(),
                user: None,
            },
        );
        (conn_id, outbound, rx)
    }

    /// Mark a connection as registered to a user.
    pub fn bind_user(&self, conn_id: ConnId, user: SessionUser) {
        if let Some(conn) = self.inner.write().unwrap().get_mut(&conn_id) {
            conn.user = Some(user);
        }
    }

    /// Remove a connection. Idempotent.
    pub fn detach(&self, conn_id: ConnId) {
        self.inner.write().unwrap().remove(&conn_id);
    }

    /// True iff any registered connection belongs to the user.
    pub fn is_user_online(&self, user_id: i64) -> bool {
        self.inner
            .read()
            .unwrap()
            .values()
            .any(|c| c.user.as_ref().is_some_and(|u| u.user_id == user_id))
    }

    /// Outbound handle of the first live connection of the user, if any.
    pub fn sender_to_user(&self, user_id: i64) -> Option<Outbound> {
        self.inner
            .read()
            .unwrap()
            .values()
            .find(|c| c.user.as_ref().is_some_and(|u| u.user_id == user_id))
            .map(|c| c.outbound.clone())
    }
}

/// RAII guard that detaches the connection when its task ends, however it
/// ends (peer close, protocol error, cancellation).
pub struct ConnectionGuard {
    registry: PresenceRegistry,
    conn_id: ConnId,
}

impl ConnectionGuard {
    pub fn new(registry: PresenceRegistry, conn_id: ConnId) -> Self {
        ConnectionGuard { registry, conn_id }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.detach(self.conn_id);
    }
}
