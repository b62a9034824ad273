use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::{Arc, Mutex};

use crate::models::{ChatMessage, DeviceToken, RoomMember, RoomSummary, User};

/// Page size for every message history query.
pub const MESSAGE_PAGE: i64 = 20;

#[derive(Clone)]
pub struct Db {
    pub conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("Failed to set pragmas");
        let db = Db {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate();
        db
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL DEFAULT '',
                token TEXT NOT NULL,
                organization_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_clients_token ON clients(token);
            CREATE INDEX IF NOT EXISTS idx_clients_organization ON clients(organization_id);

            CREATE TABLE IF NOT EXISTS rooms (
                id INTEGER PRIMARY KEY,
                name TEXT,
                description TEXT,
                organization_id INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rooms_organization ON rooms(organization_id);

            CREATE TABLE IF NOT EXISTS room_participants (
                id INTEGER PRIMARY KEY,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                last_message_seen INTEGER NOT NULL DEFAULT 0,
                organization_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_participants_room ON room_participants(room_id);
            CREATE INDEX IF NOT EXISTS idx_participants_user ON room_participants(user_id);
            CREATE INDEX IF NOT EXISTS idx_participants_organization ON room_participants(organization_id);

            CREATE TABLE IF NOT EXISTS room_messages (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                room_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                message_information TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_room ON room_messages(room_id);
            CREATE INDEX IF NOT EXISTS idx_messages_user ON room_messages(user_id);
            CREATE INDEX IF NOT EXISTS idx_messages_organization ON room_messages(organization_id);

            CREATE TABLE IF NOT EXISTS client_notifications (
                id INTEGER PRIMARY KEY,
                organization_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                msg_type INTEGER,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON client_notifications(user_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_organization ON client_notifications(organization_id);",
        )
        .expect("Failed to run migrations");

        // Columns added after the initial schema (idempotent — .ok() ignores
        // "duplicate column" errors).
        conn.execute_batch("ALTER TABLE room_participants ADD COLUMN deleted_at TEXT;")
            .ok();
        conn.execute_batch(
            "ALTER TABLE room_participants ADD COLUMN silent_notifications INTEGER NOT NULL DEFAULT 0;",
        )
        .ok();
        conn.execute_batch("ALTER TABLE clients ADD COLUMN device_token TEXT;")
            .ok();
        conn.execute_batch("ALTER TABLE rooms ADD COLUMN owner_id INTEGER NOT NULL DEFAULT 0;")
            .ok();
    }

    // --- Users ---

    /// Exact credential match; used only by the registration handshake.
    pub fn find_user(&self, username: &str, token: &str) -> rusqlite::Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, username, token, organization_id, device_token
             FROM clients WHERE username = ?1 AND token = ?2 LIMIT 1",
            params![username, token],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    token: row.get(2)?,
                    organization_id: row.get(3)?,
                    device_token: row.get(4)?,
                })
            },
        )
        .optional()
    }

    /// Resolve a username inside an organization (room membership payloads).
    pub fn find_user_id(
        &self,
        username: &str,
        organization_id: i64,
    ) -> rusqlite::Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id FROM clients WHERE username = ?1 AND organization_id = ?2 LIMIT 1",
            params![username, organization_id],
            |row| row.get(0),
        )
        .optional()
    }

    // --- Rooms & membership ---

    pub fn is_room_owner(
        &self,
        room_id: i64,
        user_id: i64,
        organization_id: i64,
    ) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM rooms
             WHERE id = ?1 AND owner_id = ?2 AND organization_id = ?3",
            params![room_id, user_id, organization_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Rooms the user is an active participant of.
    pub fn list_user_rooms(&self, user_id: i64) -> rusqlite::Result<Vec<RoomSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.name, r.description, ru.last_message_seen, r.owner_id, ru.silent_notifications
             FROM rooms r
             JOIN room_participants ru ON ru.room_id = r.id
             WHERE ru.user_id = ?1
             AND ru.deleted_at IS NULL",
        )?;
        let rooms = stmt
            .query_map(params![user_id], |row| {
                Ok(RoomSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    last_message_seen: row.get(3)?,
                    owner_id: row.get(4)?,
                    silent_notifications: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rooms)
    }

    /// Active participants of a room; presence is annotated by the caller.
    pub fn list_users_in_room(&self, room_id: i64) -> rusqlite::Result<Vec<RoomMember>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username
             FROM room_participants rp
             JOIN clients u ON rp.user_id = u.id
             WHERE rp.room_id = ?1
             AND rp.deleted_at IS NULL",
        )?;
        let users = stmt
            .query_map(params![room_id], |row| {
                Ok(RoomMember {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Zero or one rows: the owner of the room, if the owner still exists.
    pub fn list_room_owner(&self, room_id: i64) -> rusqlite::Result<Vec<RoomMember>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username
             FROM rooms r
             JOIN clients u ON r.owner_id = u.id
             WHERE r.id = ?1",
        )?;
        let owners = stmt
            .query_map(params![room_id], |row| {
                Ok(RoomMember {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(owners)
    }

    /// User ids of active participants; the fan-out recipient set.
    pub fn list_active_participant_ids(&self, room_id: i64) -> rusqlite::Result<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id FROM room_participants
             WHERE room_id = ?1
             AND deleted_at IS NULL",
        )?;
        let ids = stmt
            .query_map(params![room_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Create a room, or update one the caller owns. The membership rebuild
    /// is destructive: all participant rows are deleted and reinserted with
    /// a zero watermark. Returns None when the caller does not own an
    /// existing room of that name.
    pub fn create_or_update_room(
        &self,
        owner_id: i64,
        room_name: &str,
        members: &[String],
        description: &str,
        organization_id: i64,
    ) -> rusqlite::Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM rooms WHERE name = ?1 AND organization_id = ?2",
                params![room_name, organization_id],
                |row| row.get(0),
            )
            .optional()?;

        let room_id = match existing {
            Some(room_id) => {
                let owns: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM rooms
                     WHERE id = ?1 AND owner_id = ?2 AND organization_id = ?3",
                    params![room_id, owner_id, organization_id],
                    |row| row.get(0),
                )?;
                if owns == 0 {
                    return Ok(None);
                }
                conn.execute(
                    "UPDATE rooms SET description = ?1, name = ?2, updated_at = ?3 WHERE id = ?4",
                    params![description, room_name, &now, room_id],
                )?;
                conn.execute(
                    "DELETE FROM room_participants WHERE room_id = ?1",
                    params![room_id],
                )?;
                room_id
            }
            None => {
                conn.execute(
                    "INSERT INTO rooms (name, organization_id, description, owner_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![room_name, organization_id, description, owner_id, &now],
                )?;
                conn.last_insert_rowid()
            }
        };

        let mut owner_included = false;
        for member in members {
            let user_id = if !member.is_empty() && member.bytes().all(|b| b.is_ascii_digit()) {
                member.parse::<i64>().ok()
            } else {
                conn.query_row(
                    "SELECT id FROM clients WHERE username = ?1 AND organization_id = ?2 LIMIT 1",
                    params![member, organization_id],
                    |row| row.get(0),
                )
                .optional()?
            };
            let Some(user_id) = user_id else { continue };
            if user_id == owner_id {
                owner_included = true;
            }
            conn.execute(
                "INSERT INTO room_participants (room_id, user_id, last_message_seen, organization_id, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?4, ?4)",
                params![room_id, user_id, organization_id, &now],
            )?;
        }

        // The owner is always a member, listed or not.
        if !owner_included {
            conn.execute(
                "INSERT INTO room_participants (room_id, user_id, last_message_seen, organization_id, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?4, ?4)",
                params![room_id, owner_id, organization_id, &now],
            )?;
        }

        Ok(Some(room_id))
    }

    /// Soft-leave: stamps deleted_at on every matching participant row.
    pub fn leave_room(&self, room_id: i64, user_id: i64) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE room_participants SET deleted_at = ?1
             WHERE room_id = ?2 AND user_id = ?3",
            params![&now, room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn set_silent(&self, room_id: i64, user_id: i64, silent: bool) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE room_participants SET silent_notifications = ?1
             WHERE room_id = ?2 AND user_id = ?3",
            params![silent as i64, room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Messages ---

    pub fn insert_message(
        &self,
        room_id: i64,
        user_id: i64,
        organization_id: i64,
        message: &str,
        message_information: &str,
    ) -> rusqlite::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO room_messages (room_id, user_id, organization_id, message, message_information, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![room_id, user_id, organization_id, message, message_information, &now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Authorship is enforced in the WHERE clause: editing someone else's
    /// message affects zero rows.
    pub fn edit_message(
        &self,
        msg_id: i64,
        room_id: i64,
        user_id: i64,
        organization_id: i64,
        message: &str,
        message_information: &str,
    ) -> rusqlite::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE room_messages SET message = ?1, message_information = ?2, updated_at = ?3
             WHERE id = ?4 AND user_id = ?5 AND room_id = ?6 AND organization_id = ?7",
            params![message, message_information, &now, msg_id, user_id, room_id, organization_id],
        )
    }

    /// Soft delete; same authorship rule as edit.
    pub fn delete_message(
        &self,
        msg_id: i64,
        room_id: i64,
        user_id: i64,
        organization_id: i64,
    ) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE room_messages SET is_deleted = 1
             WHERE room_id = ?1 AND organization_id = ?2 AND user_id = ?3 AND id = ?4",
            params![room_id, organization_id, user_id, msg_id],
        )?;
        Ok(rows > 0)
    }

    /// Most recent page, newest first.
    pub fn last_messages(
        &self,
        room_id: i64,
        organization_id: i64,
    ) -> rusqlite::Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id, u.username, m.room_id, m.message, m.message_information, m.created_at, m.updated_at
             FROM room_messages m
             JOIN clients u ON m.user_id = u.id
             WHERE m.room_id = ?1
               AND m.organization_id = ?2
               AND m.is_deleted = 0
             ORDER BY m.id DESC
             LIMIT ?3",
        )?;
        let msgs = stmt
            .query_map(params![room_id, organization_id, MESSAGE_PAGE], message_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(msgs)
    }

    /// Strictly newer than last_id, oldest first.
    pub fn messages_after(
        &self,
        room_id: i64,
        organization_id: i64,
        last_id: i64,
    ) -> rusqlite::Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id, u.username, m.room_id, m.message, m.message_information, m.created_at, m.updated_at
             FROM room_messages m
             JOIN clients u ON m.user_id = u.id
             WHERE m.room_id = ?1
               AND m.organization_id = ?2
               AND m.is_deleted = 0
               AND m.id > ?3
             ORDER BY m.id ASC
             LIMIT ?4",
        )?;
        let msgs = stmt
            .query_map(
                params![room_id, organization_id, last_id, MESSAGE_PAGE],
                message_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(msgs)
    }

    /// Strictly older than last_id, newest first.
    pub fn messages_before(
        &self,
        room_id: i64,
        organization_id: i64,
        last_id: i64,
    ) -> rusqlite::Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id, u.username, m.room_id, m.message, m.message_information, m.created_at, m.updated_at
             FROM room_messages m
             JOIN clients u ON m.user_id = u.id
             WHERE m.room_id = ?1
               AND m.organization_id = ?2
               AND m.is_deleted = 0
               AND m.id < ?3
             ORDER BY m.id DESC
             LIMIT ?4",
        )?;
        let msgs = stmt
            .query_map(
                params![room_id, organization_id, last_id, MESSAGE_PAGE],
                message_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(msgs)
    }

    pub fn update_last_seen(
        &self,
        room_id: i64,
        user_id: i64,
        msg_id: i64,
    ) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE room_participants SET last_message_seen = ?1
             WHERE room_id = ?2 AND user_id = ?3",
            params![msg_id, room_id, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn clear_last_seen(&self, room_id: i64, user_id: i64) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE room_participants SET last_message_seen = 0
             WHERE room_id = ?1 AND user_id = ?2
             AND deleted_at IS NULL",
            params![room_id, user_id],
        )?;
        Ok(())
    }

    // --- Notifications ---

    /// Most recent push audit timestamp for the user within the org.
    pub fn last_notification_time(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> rusqlite::Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT created_at FROM client_notifications
                 WHERE user_id = ?1 AND organization_id = ?2
                 ORDER BY id DESC LIMIT 1",
                params![user_id, organization_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.and_then(|ts| {
            DateTime::parse_from_rfc3339(&ts)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }))
    }

    /// Silent flag of the most recent active participant row.
    pub fn participant_silent(
        &self,
        room_id: i64,
        user_id: i64,
        organization_id: i64,
    ) -> rusqlite::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let silent: Option<i64> = conn
            .query_row(
                "SELECT silent_notifications FROM room_participants
                 WHERE user_id = ?1 AND organization_id = ?2 AND room_id = ?3
                 AND deleted_at IS NULL
                 ORDER BY id DESC LIMIT 1",
                params![user_id, organization_id, room_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(silent == Some(1))
    }

    /// Parse the serialized device-token list stored on the user row.
    /// Absent or malformed payloads read as no tokens.
    pub fn device_tokens(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> rusqlite::Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT device_token FROM clients WHERE id = ?1 AND organization_id = ?2",
                params![user_id, organization_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(Some(raw)) = raw else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<DeviceToken>>(&raw) {
            Ok(tokens) => Ok(tokens.into_iter().map(|t| t.token).collect()),
            Err(_) => {
                eprintln!("⚠️ Invalid device_token JSON for user {user_id}");
                Ok(Vec::new())
            }
        }
    }

    pub fn record_notification(
        &self,
        user_id: i64,
        organization_id: i64,
        title: &str,
        msg_type: i64,
    ) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO client_notifications (user_id, organization_id, message, msg_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![user_id, organization_id, title, msg_type, &now],
        )?;
        Ok(())
    }
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        room_id: row.get(3)?,
        message: row.get(4)?,
        message_information: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
